use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use super::AdminState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct InvalidateRequest {
    tags: Vec<String>,
    paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct InvalidateResponse {
    attempted: usize,
    failed: usize,
}

/// Drop the given tags and paths, or everything when both are empty.
pub(super) async fn invalidate_cache(
    State(state): State<AdminState>,
    payload: Option<Json<InvalidateRequest>>,
) -> Json<InvalidateResponse> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let report = if request.tags.is_empty() && request.paths.is_empty() {
        state.invalidation.invalidate_all().await
    } else {
        state
            .invalidation
            .invalidate(&request.tags, &request.paths)
            .await
    };

    Json(InvalidateResponse {
        attempted: report.attempted,
        failed: report.failed,
    })
}
