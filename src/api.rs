pub mod admin;
pub mod instructor;
pub mod public;
pub mod user;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{Error, Result};

/// The JSON envelope every endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data: Some(data),
            message: None,
        }),
    )
        .into_response()
}

pub fn fail(err: Error) -> Response {
    let message = match &err {
        Error::Storage(e) => {
            tracing::error!("storage error: {e}");
            "internal error".to_string()
        }
        Error::Session(e) => {
            tracing::error!("session error: {e}");
            "internal error".to_string()
        }
        e => e.to_string(),
    };
    (
        status_of(&err),
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            message: Some(message),
        }),
    )
        .into_response()
}

pub fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(data) => ok(data),
        Err(err) => fail(err),
    }
}

/// The one place typed core errors become HTTP status codes.
fn status_of(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyExists(_) | Error::AlreadyEnrolled => StatusCode::CONFLICT,
        Error::NotEnrolled | Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::InvalidRating | Error::InvalidInput(_) | Error::EmptyCart => StatusCode::BAD_REQUEST,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::Session(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_fields() {
        let ok = serde_json::to_value(ApiResponse {
            success: true,
            data: Some(1),
            message: None,
        })
        .unwrap();
        assert_eq!(ok, serde_json::json!({ "success": true, "data": 1 }));

        let err = serde_json::to_value(ApiResponse::<()> {
            success: false,
            data: None,
            message: Some("cart is empty".to_string()),
        })
        .unwrap();
        assert_eq!(
            err,
            serde_json::json!({ "success": false, "message": "cart is empty" })
        );
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(status_of(&Error::NotFound("course")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(&Error::AlreadyEnrolled), StatusCode::CONFLICT);
        assert_eq!(status_of(&Error::EmptyCart), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(&Error::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(&Error::Forbidden("not the course owner")),
            StatusCode::FORBIDDEN
        );
    }
}
