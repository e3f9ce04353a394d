use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use inference::DetectionError;
use serde::Serialize;
use session::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unknown session {0}")]
    UnknownSession(String),

    #[error("Session limit of {0} reached, try again later")]
    SessionLimit(usize),

    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,

    #[error("No image available")]
    ImageNotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownSession(_) | ApiError::ImageNotFound => StatusCode::NOT_FOUND,
            ApiError::SessionLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Session(e) => match e {
                SessionError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                SessionError::Decode { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                SessionError::NoImage | SessionError::Busy => StatusCode::CONFLICT,
                SessionError::Detection(DetectionError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
                SessionError::Detection(_) | SessionError::Encode(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::UnknownSession(_) => "unknown_session",
            ApiError::SessionLimit(_) => "session_limit",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::ImageNotFound => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
            ApiError::Session(e) => e.kind(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(e.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        } else {
            tracing::warn!(error = %self, kind = self.kind(), "Request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::UnknownSession("x".into()), StatusCode::NOT_FOUND),
            (ApiError::SessionLimit(1), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::PayloadTooLarge, StatusCode::PAYLOAD_TOO_LARGE),
            (
                SessionError::UnsupportedType("a.gif".into()).into(),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                SessionError::Decode {
                    file_name: "x.png".into(),
                    reason: "bad".into(),
                }
                .into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (SessionError::NoImage.into(), StatusCode::CONFLICT),
            (
                SessionError::from(DetectionError::Timeout(30)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                SessionError::from(DetectionError::Aborted("worker panicked".to_string())).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
        }
    }

    #[test]
    fn test_kind_passes_through_session_errors() {
        assert_eq!(ApiError::from(SessionError::NoImage).kind(), "no_image");
        assert_eq!(ApiError::UnknownSession("x".into()).kind(), "unknown_session");
    }
}
