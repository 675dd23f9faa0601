use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use slotbot_core::errors::Error;
use tracing::error;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Core error carried out of a handler.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, "request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_status() {
        let cases = [
            (Error::EmptyMessage, StatusCode::BAD_REQUEST),
            (Error::InvalidReply, StatusCode::BAD_REQUEST),
            (Error::NoChoiceMade, StatusCode::BAD_REQUEST),
            (Error::InvalidMonth(13), StatusCode::BAD_REQUEST),
            (Error::Invalid("x".into()), StatusCode::BAD_REQUEST),
            (Error::OrderNotFound, StatusCode::NOT_FOUND),
            (Error::NotFound("order 1".into()), StatusCode::NOT_FOUND),
            (Error::Transport("down".into()), StatusCode::BAD_GATEWAY),
            (Error::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
