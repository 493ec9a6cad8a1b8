use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::application::error::ErrorReport;
use crate::application::indexing::{NotificationType, SubmissionResult};

use super::super::ApiError;
use super::AdminState;

const SOURCE: &str = "infra::http::admin::indexing";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct IndexingRequest {
    url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<NotificationType>,
}

#[derive(Debug, Serialize)]
pub(super) struct IndexingResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notify_time: Option<String>,
}

pub(super) async fn submit_url(
    State(state): State<AdminState>,
    Json(payload): Json<IndexingRequest>,
) -> Result<Response, ApiError> {
    let url = payload
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| is_http_url(url))
        .ok_or_else(|| ApiError::bad_request("A valid http(s) URL is required", None))?
        .to_string();
    let kind = payload.kind.unwrap_or_default();

    let response = match state.indexing.submit(&url, kind).await {
        SubmissionResult::Submitted { notify_time } => reply(
            StatusCode::OK,
            true,
            format!("{url} submitted as {}", kind.as_str()),
            notify_time,
        ),
        SubmissionResult::RateLimited => reply(
            StatusCode::TOO_MANY_REQUESTS,
            false,
            "Indexing quota exceeded; try again later".to_string(),
            None,
        ),
        SubmissionResult::NotConfigured => reply(
            StatusCode::SERVICE_UNAVAILABLE,
            false,
            "Indexing credentials are not configured".to_string(),
            None,
        ),
        SubmissionResult::InvalidUrl => {
            return Err(ApiError::bad_request(
                "A valid http(s) URL is required",
                None,
            ));
        }
        SubmissionResult::Failed { message } => {
            reply(StatusCode::BAD_GATEWAY, false, message, None)
        }
    };
    Ok(response)
}

fn reply(
    status: StatusCode,
    success: bool,
    message: String,
    notify_time: Option<String>,
) -> Response {
    let detail = message.clone();
    let mut response = (
        status,
        Json(IndexingResponse {
            success,
            message,
            notify_time,
        }),
    )
        .into_response();
    if !status.is_success() {
        ErrorReport::from_message(SOURCE, status, detail).attach(&mut response);
    }
    response
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}
