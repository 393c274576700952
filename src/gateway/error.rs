//! API Error Responses
//! Mission: Stable machine-readable error codes at every endpoint boundary

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::borrow::Cow;

use crate::security::SignatureFailure;

/// Terminal endpoint error carrying a stable error code.
///
/// Every rejection surfaces as `{"detail": "<code>"}` with an appropriate
/// status, matching the error vocabulary agents are written against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Cow<'static, str>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            code: code.into(),
        }
    }

    pub fn bad_request(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    pub fn unauthorized(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code)
    }

    pub fn forbidden(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code)
    }

    pub fn not_found(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code)
    }

    pub fn conflict(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::CONFLICT, code)
    }

    pub fn too_large(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, code)
    }

    pub fn unprocessable(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, code)
    }

    pub fn unavailable(code: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code)
    }
}

impl From<SignatureFailure> for ApiError {
    fn from(failure: SignatureFailure) -> Self {
        ApiError::unauthorized(failure.reason())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            ApiError::unauthorized("unknown_certificate").status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::conflict("payload_replay").status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::too_large("payload_too_large").status,
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_signature_failure_maps_to_401() {
        let error: ApiError = SignatureFailure::Mismatch.into();
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);
        assert_eq!(error.code, "signature_mismatch");
    }

    #[test]
    fn test_response_shape() {
        let response = ApiError::bad_request("https_required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
