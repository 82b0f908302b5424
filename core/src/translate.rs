//! Classification of raw failures into `RemoteError` kinds.
//!
//! | failure                                   | kind                     |
//! |-------------------------------------------|--------------------------|
//! | response with status 404                  | `NotFound` (body kept)   |
//! | other response, structured error body     | that error, as-is        |
//! | other response, anything else            | `General` (status kept)  |
//! | no response, aborted/timed-out connection | `GatewayTimeout` (504)   |
//! | no response, any other cause              | `BadGateway`             |
//!
//! Whatever the branch, fields naming transport internals are removed from
//! the carried data before it is returned.

use serde_json::{json, Value};

use crate::error::{message_of, DispatchError, RemoteError};
use crate::transport::TransportFailure;

/// Keys that describe the HTTP client rather than the failure.
pub const TRANSPORT_FIELDS: [&str; 3] = ["config", "request", "response"];

pub fn translate(failure: &TransportFailure) -> RemoteError {
    let mut error = classify(failure);
    if let Some(Value::Object(map)) = error.data_mut() {
        for key in TRANSPORT_FIELDS {
            map.remove(key);
        }
    }
    error
}

/// `translate` for everything `Dispatcher::send` can fail with.
pub fn translate_dispatch(err: &DispatchError) -> RemoteError {
    match err {
        DispatchError::Config(config) => config.clone().into(),
        DispatchError::Transport(failure) => translate(failure),
    }
}

fn classify(failure: &TransportFailure) -> RemoteError {
    match failure {
        TransportFailure::Status { status: 404, body } => RemoteError::NotFound {
            message: body
                .as_ref()
                .and_then(message_of)
                .unwrap_or_else(|| "Not Found".to_string()),
            data: Some(body.clone().unwrap_or_else(|| json!({ "status": 404 }))),
        },
        TransportFailure::Status { status, body } => convert(*status, body.as_ref()),
        TransportFailure::Connection { code, message } if code.is_timeout() => {
            RemoteError::GatewayTimeout {
                message: message.clone(),
                data: Some(json!({ "code": code.to_string() })),
            }
        }
        TransportFailure::Connection { code, message } => RemoteError::BadGateway {
            message: message.clone(),
            data: Some(json!({ "code": code.to_string() })),
        },
        TransportFailure::Request(message) => RemoteError::BadGateway {
            message: message.clone(),
            data: None,
        },
    }
}

/// Catch-all: pass structured errors through, wrap the rest.
fn convert(status: u16, body: Option<&Value>) -> RemoteError {
    if let Some(error) = body.and_then(RemoteError::from_body) {
        return error;
    }
    RemoteError::General {
        status,
        message: body
            .and_then(message_of)
            .unwrap_or_else(|| format!("HTTP {status}")),
        data: body.cloned(),
    }
}
