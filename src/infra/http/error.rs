use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::admin::categories::AdminCategoryError;
use crate::application::admin::posts::AdminPostError;
use crate::application::admin::settings::AdminSettingsError;
use crate::application::admin::users::AdminUserError;
use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const VALIDATION: &str = "validation_error";
    pub const NOT_FOUND: &str = "not_found";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const DB_UNAVAILABLE: &str = "db_unavailable";
    pub const REPO: &str = "repo_error";
    pub const UPSTREAM: &str = "upstream_error";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            hint,
        }
    }

    pub fn bad_request(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::VALIDATION, message, None)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = format!(
            "{}: {}",
            self.code,
            self.hint.as_deref().unwrap_or(&self.message)
        );
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message("infra::http::admin", self.status, detail).attach(&mut response);
        response
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { constraint } => ApiError::new(
                StatusCode::CONFLICT,
                codes::DUPLICATE,
                "Duplicate record",
                Some(constraint),
            ),
            RepoError::NotFound => ApiError::not_found("resource not found"),
            RepoError::InvalidInput { message } => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Invalid input",
                Some(message),
            ),
            RepoError::Integrity { message } => ApiError::new(
                StatusCode::CONFLICT,
                codes::INTEGRITY,
                "Integrity constraint violated",
                Some(message),
            ),
            RepoError::Timeout => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
                None,
            ),
            RepoError::Unavailable(message) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_UNAVAILABLE,
                "Database unavailable",
                Some(message),
            ),
            RepoError::Persistence(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Persistence error",
                Some(message),
            ),
        }
    }
}

impl From<AdminPostError> for ApiError {
    fn from(err: AdminPostError) -> Self {
        match err {
            AdminPostError::Validation(message) => ApiError::validation(message),
            AdminPostError::NotFound => ApiError::not_found("post not found"),
            AdminPostError::Repo(err) => err.into(),
        }
    }
}

impl From<AdminCategoryError> for ApiError {
    fn from(err: AdminCategoryError) -> Self {
        match err {
            AdminCategoryError::Validation(message) => ApiError::validation(message),
            AdminCategoryError::NotFound => ApiError::not_found("category not found"),
            AdminCategoryError::Repo(err) => err.into(),
        }
    }
}

impl From<AdminSettingsError> for ApiError {
    fn from(err: AdminSettingsError) -> Self {
        match err {
            AdminSettingsError::Validation(message) => ApiError::validation(message),
            AdminSettingsError::Repo(err) => err.into(),
        }
    }
}

impl From<AdminUserError> for ApiError {
    fn from(err: AdminUserError) -> Self {
        match err {
            AdminUserError::Validation(message) => ApiError::validation(message),
            AdminUserError::AlreadyExists => ApiError::new(
                StatusCode::CONFLICT,
                codes::DUPLICATE,
                "User already exists",
                None,
            ),
            AdminUserError::UserNotFound => ApiError::not_found("user not found"),
            err @ AdminUserError::RoleNotFound(_) => ApiError::not_found(err.to_string()),
            AdminUserError::Hash(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Failed to process credentials",
                Some(message),
            ),
            AdminUserError::Repo(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn validation_errors_carry_their_message() {
        let response = ApiError::from(AdminPostError::Validation("title is required".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], codes::VALIDATION);
        assert_eq!(body["error"]["message"], "title is required");
        assert!(body["error"].get("hint").is_none());
    }

    #[test]
    fn duplicate_rows_map_to_conflict() {
        let err = ApiError::from(AdminCategoryError::Repo(RepoError::Duplicate {
            constraint: "categories_name_key".into(),
        }));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(AdminUserError::AlreadyExists).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn missing_role_is_not_found() {
        let err = ApiError::from(AdminUserError::RoleNotFound("ghost".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
