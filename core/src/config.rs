//! Transport configuration for one remote upstream.
//!
//! # Design
//! `RemoteConfig` is built once and shared read-only by every call made
//! through a `Dispatcher`. Per-call overrides live in the `ParameterBag` and
//! are layered on top at resolve time; nothing here is mutated per call.
//!
//! The serialized form uses camelCase keys (`dnsSuffix`, `pathToHost`,
//! `excludeParams`, ...) and every field is optional.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::INTERNAL_REQUEST_HEADER;
use crate::params::ExcludedKeys;

/// Complete configuration surface of a remote service client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    pub protocol: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dns_suffix: String,
    pub path_to_host: PathToHost,
    /// `None` means no timeout is enforced by this layer.
    #[serde(deserialize_with = "millis::deserialize_opt")]
    pub timeout: Option<Duration>,
    pub proxy: Option<ProxyConfig>,
    pub exclude_params: ExcludedKeys,
    pub max_redirects: Option<usize>,
    pub keep_alive: bool,
    pub internal_request_header: String,
    pub response_type: ResponseType,
    pub retry: Option<RetryPolicy>,
    pub dns_cache: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: None,
            port: None,
            dns_suffix: String::new(),
            path_to_host: PathToHost::Disabled,
            timeout: None,
            proxy: None,
            exclude_params: ExcludedKeys::default(),
            max_redirects: None,
            keep_alive: false,
            internal_request_header: INTERNAL_REQUEST_HEADER.to_string(),
            response_type: ResponseType::Json,
            retry: None,
            dns_cache: false,
        }
    }
}

impl RemoteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_dns_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.dns_suffix = suffix.into();
        self
    }

    pub fn with_path_to_host(mut self, path_to_host: PathToHost) -> Self {
        self.path_to_host = path_to_host;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_exclude_params(mut self, keys: ExcludedKeys) -> Self {
        self.exclude_params = keys;
        self
    }

    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = Some(max);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_internal_request_header(mut self, name: impl Into<String>) -> Self {
        self.internal_request_header = name.into();
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_dns_cache(mut self, dns_cache: bool) -> Self {
        self.dns_cache = dns_cache;
        self
    }
}

/// How a host is derived from the resource path when neither the call nor
/// the configuration names one.
#[derive(Clone, Default)]
pub enum PathToHost {
    #[default]
    Disabled,
    /// Every character outside `[A-Za-z0-9]` becomes `-`.
    Default,
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl PathToHost {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn derive(&self, path: &str) -> Option<String> {
        match self {
            Self::Disabled => None,
            Self::Default => Some(host_from_path(path)),
            Self::Custom(f) => Some(f(path)),
        }
    }
}

impl fmt::Debug for PathToHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::Default => write!(f, "Default"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl From<bool> for PathToHost {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Default
        } else {
            Self::Disabled
        }
    }
}

impl<'de> Deserialize<'de> for PathToHost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bool::deserialize(deserializer).map(Self::from)
    }
}

/// Default path-to-host derivation: `"api/users"` becomes `"api-users"`.
pub fn host_from_path(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Forward proxy settings. Instance and per-call values merge field by
/// field; a merge with no fields set means "no proxy".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<ProxyAuth>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl ProxyConfig {
    pub fn is_empty(&self) -> bool {
        self.protocol.is_none() && self.host.is_none() && self.port.is_none() && self.auth.is_none()
    }

    /// Fields set on `other` win over fields set on `self`.
    pub fn merged(&self, other: &ProxyConfig) -> ProxyConfig {
        ProxyConfig {
            protocol: other.protocol.clone().or_else(|| self.protocol.clone()),
            host: other.host.clone().or_else(|| self.host.clone()),
            port: other.port.or(self.port),
            auth: other.auth.clone().or_else(|| self.auth.clone()),
        }
    }

    /// `scheme://host:port`, or `None` when no host is set.
    pub fn url(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        let protocol = self.protocol.as_deref().unwrap_or("http");
        let port = self.port.unwrap_or(if protocol == "https" { 443 } else { 80 });
        Some(format!("{protocol}://{host}:{port}"))
    }
}

/// How the response body is handed back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Json,
    Text,
    Bytes,
}

/// Retry behaviour handed to the transport with every request.
///
/// The dispatcher never retries on its own; a transport that honours this
/// policy retries connection failures and 5xx answers on idempotent verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub retries: u32,
    #[serde(with = "millis")]
    pub delay: Duration,
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_millis(100),
            retry_on_timeout: false,
        }
    }
}

impl RetryPolicy {
    /// Back-off before attempt `attempt` (1-based retry number).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }
}

/// Durations are written as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    /// `0` and `null` both mean "no timeout".
    pub fn deserialize_opt<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RemoteConfig::default();
        assert_eq!(config.protocol, "http");
        assert_eq!(config.internal_request_header, "X-Internal-Request");
        assert_eq!(config.exclude_params, ExcludedKeys::default());
        assert!(config.timeout.is_none());
        assert!(config.proxy.is_none());
        assert!(!config.keep_alive);
        assert!(!config.dns_cache);
        assert!(config.path_to_host.derive("users").is_none());
    }

    #[test]
    fn deserializes_camel_case_surface() {
        let config: RemoteConfig = serde_json::from_str(
            r#"{
                "protocol": "https",
                "host": "svc",
                "port": 8443,
                "dnsSuffix": ".internal",
                "pathToHost": true,
                "timeout": 2500,
                "proxy": { "host": "proxy.local", "port": 3128 },
                "excludeParams": ["secret"],
                "maxRedirects": 2,
                "keepAlive": true,
                "internalRequestHeader": "X-Ctx",
                "responseType": "text",
                "retry": { "retries": 2, "delay": 50 },
                "dnsCache": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.protocol, "https");
        assert_eq!(config.host.as_deref(), Some("svc"));
        assert_eq!(config.port, Some(8443));
        assert_eq!(config.dns_suffix, ".internal");
        assert_eq!(config.path_to_host.derive("a/b").as_deref(), Some("a-b"));
        assert_eq!(config.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.proxy.unwrap().port, Some(3128));
        assert!(config.exclude_params.contains("secret"));
        assert!(!config.exclude_params.contains("headers"));
        assert_eq!(config.max_redirects, Some(2));
        assert!(config.keep_alive);
        assert_eq!(config.internal_request_header, "X-Ctx");
        assert_eq!(config.response_type, ResponseType::Text);
        let retry = config.retry.unwrap();
        assert_eq!(retry.retries, 2);
        assert_eq!(retry.delay, Duration::from_millis(50));
        assert!(!retry.retry_on_timeout);
        assert!(config.dns_cache);
    }

    #[test]
    fn zero_timeout_means_none() {
        let config: RemoteConfig = serde_json::from_str(r#"{"timeout":0}"#).unwrap();
        assert!(config.timeout.is_none());
    }

    #[test]
    fn host_from_path_replaces_non_alphanumerics() {
        assert_eq!(host_from_path("api/users"), "api-users");
        assert_eq!(host_from_path("Orders_v2.x"), "Orders-v2-x");
        assert_eq!(host_from_path("plain"), "plain");
    }

    #[test]
    fn custom_path_to_host() {
        let p = PathToHost::custom(|path| format!("{path}-svc"));
        assert_eq!(p.derive("users").as_deref(), Some("users-svc"));
    }

    #[test]
    fn proxy_merge_prefers_other() {
        let base = ProxyConfig {
            host: Some("base".into()),
            port: Some(8080),
            ..Default::default()
        };
        let call = ProxyConfig {
            host: Some("call".into()),
            ..Default::default()
        };
        let merged = base.merged(&call);
        assert_eq!(merged.host.as_deref(), Some("call"));
        assert_eq!(merged.port, Some(8080));
        assert!(ProxyConfig::default().merged(&ProxyConfig::default()).is_empty());
    }

    #[test]
    fn proxy_url_defaults() {
        let proxy = ProxyConfig {
            host: Some("proxy".into()),
            ..Default::default()
        };
        assert_eq!(proxy.url().as_deref(), Some("http://proxy:80"));
        assert!(ProxyConfig::default().url().is_none());
    }

    #[test]
    fn retry_delay_grows_linearly() {
        let policy = RetryPolicy {
            delay: Duration::from_millis(10),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(3), Duration::from_millis(30));
    }
}
