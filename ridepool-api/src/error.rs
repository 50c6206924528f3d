use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ridepool_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Core(err) => match err {
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                CoreError::InvalidOperation(_) | CoreError::ValidationError(_) => StatusCode::BAD_REQUEST,
                CoreError::InsufficientCapacity { .. }
                | CoreError::DuplicateBooking(_)
                | CoreError::InvalidState(_) => StatusCode::CONFLICT,
                CoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CoreError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Core(err) => err.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::Core(CoreError::InternalError(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Core(CoreError::Unavailable(msg)) => {
                tracing::warn!("Store unavailable: {}", msg);
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CoreError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CoreError::InvalidOperation("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::InsufficientCapacity { requested: 2, available: 1 }, StatusCode::CONFLICT),
            (CoreError::DuplicateBooking("x".into()), StatusCode::CONFLICT),
            (CoreError::InvalidState("x".into()), StatusCode::CONFLICT),
            (CoreError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (CoreError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::InternalError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::from(CoreError::InternalError("row decode failed: secret".into()));
        assert_eq!(err.code(), "internal");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
