//! Target URL resolution.
//!
//! Each of protocol, host, port and DNS suffix comes from the call's
//! parameter bag when present, else from the configuration, else from a
//! default. Validation order is protocol, host, port; the first failure wins.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::ConfigError;
use crate::params::ParameterBag;

pub const PROTOCOL: &str = "protocol";
pub const HOST: &str = "host";
pub const PORT: &str = "port";
pub const DNS_SUFFIX: &str = "dnsSuffix";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(ConfigError::InvalidProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a single resource, rendered as the last path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    /// Any value with a string form, e.g. a composite key type.
    pub fn display(id: impl fmt::Display) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

macro_rules! resource_id_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for ResourceId {
            fn from(id: $t) -> Self {
                Self(id.to_string())
            }
        })*
    };
}

resource_id_from_int!(u32, u64, i32, i64, usize);

impl From<uuid::Uuid> for ResourceId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id.to_string())
    }
}

/// Validated protocol, host (suffix included) and port of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl Target {
    /// `{protocol}://{host}[:{port}]/{path}[/{id}]`; the port is omitted
    /// when it is the protocol's default.
    pub fn url(&self, path: &str, id: Option<&ResourceId>) -> String {
        let mut url = format!("{}://{}", self.protocol, self.host);
        if self.port != self.protocol.default_port() {
            url.push(':');
            url.push_str(&self.port.to_string());
        }
        url.push('/');
        url.push_str(path);
        if let Some(id) = id {
            url.push('/');
            url.push_str(id.as_str());
        }
        url
    }
}

/// Resolves and validates the target of a call without building a URL.
pub fn resolve_target(
    config: &RemoteConfig,
    params: &ParameterBag,
    path: &str,
) -> Result<Target, ConfigError> {
    let protocol: Protocol = match params.get_present(PROTOCOL) {
        Some(Value::String(s)) => s.parse()?,
        Some(other) => return Err(ConfigError::InvalidProtocol(render(other))),
        None => config.protocol.parse()?,
    };

    let prefix = match params.get_present(HOST) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => Some(render(value)),
        Some(_) => None,
        None => config
            .host
            .clone()
            .or_else(|| config.path_to_host.derive(path)),
    };
    let prefix = prefix.filter(|h| !h.is_empty()).ok_or(ConfigError::MissingHost)?;

    let port = match params.get_present(PORT) {
        Some(value) => port_from_value(value)?,
        None => match config.port {
            Some(0) => return Err(ConfigError::InvalidPort("0".to_string())),
            Some(port) => port,
            None => protocol.default_port(),
        },
    };

    let suffix = match params.get(DNS_SUFFIX) {
        Some(Value::String(s)) => s.as_str(),
        Some(Value::Null) | None => config.dns_suffix.as_str(),
        Some(_) => "",
    };

    Ok(Target {
        protocol,
        host: format!("{prefix}{suffix}"),
        port,
    })
}

/// Full URL of a call: `resolve_target` followed by `Target::url`.
pub fn resolve(
    config: &RemoteConfig,
    params: &ParameterBag,
    path: &str,
    id: Option<&ResourceId>,
) -> Result<String, ConfigError> {
    Ok(resolve_target(config, params, path)?.url(path, id))
}

/// Ports may arrive as numbers or numeric strings; anything outside
/// 1..=65535 is rejected.
fn port_from_value(value: &Value) -> Result<u16, ConfigError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .filter(|p| (1..=65535).contains(p))
        .map(|p| p as u16)
        .ok_or_else(|| ConfigError::InvalidPort(render(value)))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
