use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crucible_core::error::{InvalidRequest, NotFound, RateLimited};
use crucible_storage::signed_url::Forbidden;

#[derive(Debug)]
pub(in crate::http) struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    pub(in crate::http) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    pub(in crate::http) fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code,
            message: message.into(),
        }
    }

    pub(in crate::http) fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code,
            message: message.into(),
        }
    }

    pub(in crate::http) fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code,
            message: message.into(),
        }
    }

    pub(in crate::http) fn too_many_requests(
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code,
            message: message.into(),
        }
    }
}

/// Map typed domain errors out of an anyhow chain onto their HTTP shapes.
fn classify_error(error: &anyhow::Error) -> Option<AppError> {
    for cause in error.chain() {
        if let Some(invalid) = cause.downcast_ref::<InvalidRequest>() {
            return Some(AppError::bad_request(
                "validation",
                format!("{}: {}", invalid.field, invalid.message),
            ));
        }
        if let Some(not_found) = cause.downcast_ref::<NotFound>() {
            return Some(AppError::not_found("not_found", not_found.to_string()));
        }
        if cause.downcast_ref::<RateLimited>().is_some() {
            return Some(AppError::too_many_requests(
                "too_many_requests",
                "Rate limit exceeded",
            ));
        }
        if cause.downcast_ref::<Forbidden>().is_some() {
            return Some(AppError::forbidden("forbidden", "Forbidden"));
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::NotFound
        {
            return Some(AppError::not_found("not_found", "Not found"));
        }
    }
    None
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(error: E) -> Self {
        let error: anyhow::Error = error.into();

        if let Some(classified) = classify_error(&error) {
            tracing::debug!(error = %error, code = classified.code, "request failed");
            return classified;
        }

        tracing::error!(error = %error, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            error: &'static str,
            message: String,
        }

        let body = Json(Body {
            error: self.code,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crucible_core::error::{InvalidRequest, NotFound, RateLimited};
    use crucible_storage::signed_url::Forbidden;

    use super::AppError;

    #[test]
    fn invalid_request_maps_to_400_naming_the_field() {
        let err = anyhow::Error::new(InvalidRequest::new("timeout_ms", "exceeds maximum"))
            .context("merge limits");
        let app: AppError = err.into();
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.code, "validation");
        assert!(app.message.contains("timeout_ms"));
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = anyhow::Error::new(NotFound::new("uploaded file", "file_xyz"));
        let app: AppError = err.into();
        assert_eq!(app.status, StatusCode::NOT_FOUND);
        assert_eq!(app.code, "not_found");
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let err = anyhow::Error::new(RateLimited::new("alice"));
        let app: AppError = err.into();
        assert_eq!(app.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(app.code, "too_many_requests");
    }

    #[test]
    fn forbidden_maps_to_403() {
        let err = anyhow::Error::new(Forbidden);
        let app: AppError = err.into();
        assert_eq!(app.status, StatusCode::FORBIDDEN);
        assert_eq!(app.code, "forbidden");
    }

    #[test]
    fn unclassified_errors_are_500() {
        let err = anyhow::anyhow!("sandbox runtime vanished");
        let app: AppError = err.into();
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.code, "internal_error");
        assert_eq!(app.message, "Internal server error");
    }
}
