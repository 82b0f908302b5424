//! Error types for the remote service client.
//!
//! # Design
//! Three layers, from the inside out:
//! - `ConfigError`: a target could not be resolved (bad protocol, host,
//!   port, or proxy). Raised before any I/O.
//! - `DispatchError`: what `Dispatcher::send` returns; either a
//!   `ConfigError` or a raw `TransportFailure`.
//! - `RemoteError`: the stable taxonomy callers of `RemoteService` see.
//!   Produced by `translate`, never carries transport internals.
//!
//! `RemoteError` has a JSON shape (`name`, `message`, `code`, `className`,
//! `data`) that nodes answer failures with, so a structured error body coming
//! back over the wire can be recognised and passed through unchanged.

use serde_json::{json, Value};
use thiserror::Error;

use crate::transport::TransportFailure;

/// A call target failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid protocol {0}")]
    InvalidProtocol(String),

    #[error("Missing host")]
    MissingHost,

    #[error("Invalid port {0}")]
    InvalidPort(String),

    #[error("Invalid proxy {0}")]
    InvalidProxy(String),

    #[error("Invalid timeout {0}")]
    InvalidTimeout(String),
}

/// Failure of a single `Dispatcher::send`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

/// Domain error kinds observed by callers of a remote service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// The call was rejected before reaching the network, or the remote
    /// answered with a structured `BadRequest`.
    #[error("Bad request: {message}")]
    BadRequest { message: String, data: Option<Value> },

    /// The remote answered 404.
    #[error("Not found: {message}")]
    NotFound { message: String, data: Option<Value> },

    /// The connection was aborted or timed out.
    #[error("Gateway timeout: {message}")]
    GatewayTimeout { message: String, data: Option<Value> },

    /// The remote could not be reached for any other reason.
    #[error("Bad gateway: {message}")]
    BadGateway { message: String, data: Option<Value> },

    /// A structured error from the remote that is none of the above.
    #[error("{name} ({code}): {message}")]
    Remote {
        name: String,
        code: u16,
        message: String,
        data: Option<Value>,
    },

    /// Anything else, wrapped generically.
    #[error("General error: {message}")]
    General {
        status: u16,
        message: String,
        data: Option<Value>,
    },
}

impl RemoteError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            data: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            data: None,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::GatewayTimeout { .. } => 504,
            Self::BadGateway { .. } => 502,
            Self::Remote { code, .. } => *code,
            Self::General { status, .. } => *status,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::BadRequest { .. } => "BadRequest",
            Self::NotFound { .. } => "NotFound",
            Self::GatewayTimeout { .. } => "GatewayTimeout",
            Self::BadGateway { .. } => "BadGateway",
            Self::Remote { name, .. } => name,
            Self::General { .. } => "GeneralError",
        }
    }

    /// Kebab-case form of `name`, e.g. `not-found`.
    pub fn class_name(&self) -> String {
        let mut out = String::new();
        for (i, c) in self.name().chars().enumerate() {
            if c.is_ascii_uppercase() {
                if i > 0 {
                    out.push('-');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::GatewayTimeout { message, .. }
            | Self::BadGateway { message, .. }
            | Self::Remote { message, .. }
            | Self::General { message, .. } => message,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::BadRequest { data, .. }
            | Self::NotFound { data, .. }
            | Self::GatewayTimeout { data, .. }
            | Self::BadGateway { data, .. }
            | Self::Remote { data, .. }
            | Self::General { data, .. } => data.as_ref(),
        }
    }

    pub(crate) fn data_mut(&mut self) -> &mut Option<Value> {
        match self {
            Self::BadRequest { data, .. }
            | Self::NotFound { data, .. }
            | Self::GatewayTimeout { data, .. }
            | Self::BadGateway { data, .. }
            | Self::Remote { data, .. }
            | Self::General { data, .. } => data,
        }
    }

    /// JSON body a node answers this error with.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "name": self.name(),
            "message": self.message(),
            "code": self.status(),
            "className": self.class_name(),
        });
        if let (Some(data), Value::Object(map)) = (self.data(), &mut body) {
            map.insert("data".to_string(), data.clone());
        }
        body
    }

    /// Recognises a structured error body (`name` and numeric `code`).
    pub fn from_body(body: &Value) -> Option<Self> {
        let map = body.as_object()?;
        let name = map.get("name")?.as_str()?;
        let code = map
            .get("code")?
            .as_u64()
            .and_then(|c| u16::try_from(c).ok())?;
        let message = map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string();
        let data = map.get("data").filter(|d| !d.is_null()).cloned();

        Some(match name {
            "BadRequest" => Self::BadRequest { message, data },
            "NotFound" => Self::NotFound { message, data },
            "GatewayTimeout" => Self::GatewayTimeout { message, data },
            "BadGateway" => Self::BadGateway { message, data },
            "GeneralError" => Self::General {
                status: code,
                message,
                data,
            },
            _ => Self::Remote {
                name: name.to_string(),
                code,
                message,
                data,
            },
        })
    }
}

impl From<ConfigError> for RemoteError {
    fn from(err: ConfigError) -> Self {
        Self::bad_request(err.to_string())
    }
}

pub(crate) fn message_of(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
