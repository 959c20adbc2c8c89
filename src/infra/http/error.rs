use std::time::Duration;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::feed::FeedError;
use crate::application::identity::IdentityError;
use crate::application::posts::CreatePostError;
use crate::application::repos::RepoError;
use crate::domain::error::ValidationError;

pub mod codes {
    pub const VALIDATION: &str = "validation_error";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const UNAUTHENTICATED: &str = "unauthenticated";
    pub const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";
    pub const NOT_FOUND: &str = "not_found";
    pub const BAD_REQUEST: &str = "bad_request";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// JSON error with a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    hint: Option<String>,
    field: Option<&'static str>,
    retry_after: Option<u64>,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            hint: None,
            field: None,
            retry_after: None,
            detail: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Internal detail for the logs; never sent to the client.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn validation(error: &ValidationError) -> Self {
        let mut api = Self::new(StatusCode::BAD_REQUEST, codes::VALIDATION, &error.message);
        api.field = Some(error.field);
        api
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    pub fn unauthenticated() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHENTICATED,
            "Sign in required",
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    /// Seconds are rounded up so clients never retry early.
    pub fn rate_limited(retry_after: Duration) -> Self {
        let seconds = retry_after
            .as_secs()
            .saturating_add(u64::from(retry_after.subsec_nanos() > 0))
            .max(1);
        let mut api = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::RATE_LIMITED,
            "Rate limit exceeded",
        )
        .with_hint(format!("Retry after {seconds} seconds"));
        api.retry_after = Some(seconds);
        api
    }

    pub fn upstream_unavailable(error: &IdentityError) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::UPSTREAM_UNAVAILABLE,
            "Identity service temporarily unavailable",
        )
        .with_detail(error.to_string())
    }

    pub fn repo(error: &RepoError) -> Self {
        match error {
            RepoError::Timeout => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
            ),
            RepoError::Unavailable(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::UPSTREAM_UNAVAILABLE,
                "Storage temporarily unavailable",
            ),
            RepoError::Persistence(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Persistence error",
            ),
        }
        .with_detail(error.to_string())
    }
}

impl From<CreatePostError> for ApiError {
    fn from(error: CreatePostError) -> Self {
        match error {
            CreatePostError::Validation(err) => Self::validation(&err),
            CreatePostError::RateLimited { retry_after } => Self::rate_limited(retry_after),
            CreatePostError::Repo(err) => Self::repo(&err),
        }
    }
}

impl From<FeedError> for ApiError {
    fn from(error: FeedError) -> Self {
        match error {
            FeedError::Repo(err) => Self::repo(&err),
            FeedError::NotFound(id) => Self::not_found("Post not found").with_detail(format!("post {id}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self
            .detail
            .clone()
            .or_else(|| self.hint.clone())
            .unwrap_or_else(|| self.message.clone());
        let report = ErrorReport::from_message(
            "infra::http::error::ApiError",
            self.status,
            format!("{}: {detail}", self.code),
        );

        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
                hint: self.hint,
                field: self.field.map(str::to_string),
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let response = ApiError::rate_limited(Duration::from_millis(41_200)).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("42")
        );
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }

    #[test]
    fn zero_retry_after_is_at_least_one_second() {
        let response = ApiError::rate_limited(Duration::ZERO).into_response();
        assert_eq!(
            response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("1")
        );
    }

    #[test]
    fn every_create_failure_has_a_distinct_code() {
        let validation: ApiError =
            CreatePostError::Validation(ValidationError::new("content", "empty")).into();
        let limited: ApiError = CreatePostError::RateLimited {
            retry_after: Duration::from_secs(3),
        }
        .into();
        let storage: ApiError = CreatePostError::Repo(RepoError::Timeout).into();

        assert_eq!(validation.code(), codes::VALIDATION);
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(limited.code(), codes::RATE_LIMITED);
        assert_eq!(storage.code(), codes::DB_TIMEOUT);
    }

    #[test]
    fn unavailable_identity_maps_to_503() {
        let api = ApiError::upstream_unavailable(&IdentityError::Unavailable("down".into()));
        assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api.code(), codes::UPSTREAM_UNAVAILABLE);
    }
}
