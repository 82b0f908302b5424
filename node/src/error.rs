//! Error responses in the shape remote callers recognise.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use remote_service::RemoteError;

/// Handler error rendered as a structured `RemoteError` body.
#[derive(Debug)]
pub struct NodeError(pub RemoteError);

impl From<RemoteError> for NodeError {
    fn from(err: RemoteError) -> Self {
        Self(err)
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_body())).into_response()
    }
}
