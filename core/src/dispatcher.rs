//! Turns one logical service call into one HTTP request.
//!
//! # Design
//! `Dispatcher` owns an immutable `RemoteConfig` and a `Transport`. Each
//! call is split into `build_request` (pure: resolve, validate, assemble
//! headers and body) and `parse_response` (pure: status check and body
//! shaping), with a single awaited `Transport::execute` in between. Failures
//! leave the dispatcher untranslated; `RemoteService` owns translation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::codec;
use crate::config::{ProxyConfig, RemoteConfig, ResponseType};
use crate::error::{ConfigError, DispatchError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, ResponseBody};
use crate::multipart::MultipartForm;
use crate::params::ParameterBag;
use crate::transport::{ClientOptions, ReqwestTransport, Transport, TransportFailure};
use crate::url::{self, ResourceId};

pub const TIMEOUT: &str = "timeout";
pub const PROXY: &str = "proxy";

/// The six service verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Remove,
}

impl Operation {
    pub fn method(self) -> HttpMethod {
        match self {
            Operation::Find | Operation::Get => HttpMethod::Get,
            Operation::Create => HttpMethod::Post,
            Operation::Update => HttpMethod::Put,
            Operation::Patch => HttpMethod::Patch,
            Operation::Remove => HttpMethod::Delete,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Patch => "patch",
            Operation::Remove => "remove",
        }
    }

    fn carries_body(self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Patch)
    }
}

/// Request body of a create, update or patch.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Multipart(MultipartForm),
}

impl Payload {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Payload::Json)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<MultipartForm> for Payload {
    fn from(form: MultipartForm) -> Self {
        Payload::Multipart(form)
    }
}

/// Everything one invocation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    pub operation: Operation,
    pub path: String,
    pub id: Option<ResourceId>,
    pub payload: Option<Payload>,
    pub params: ParameterBag,
}

impl CallDescriptor {
    pub fn new(operation: Operation, path: impl Into<String>, params: ParameterBag) -> Self {
        Self {
            operation,
            path: path.into(),
            id: None,
            payload: None,
            params,
        }
    }

    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Sends call descriptors to a remote node.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<RemoteConfig>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    /// Dispatcher over a reqwest client configured from `config`: the DNS
    /// cache, keep-alive, redirect and proxy choices are made here, once.
    pub fn new(config: RemoteConfig) -> Result<Self, TransportFailure> {
        let transport = ReqwestTransport::new(ClientOptions {
            proxy: config.proxy.clone().filter(|p| !p.is_empty()),
            max_redirects: config.max_redirects,
            keep_alive: config.keep_alive,
            dns_cache: config.dns_cache,
        })?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: RemoteConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// The bag as it would be put on the wire.
    pub fn filter_params(&self, params: &ParameterBag) -> Map<String, Value> {
        self.config.exclude_params.filter(params.as_map())
    }

    /// Resolves the target and assembles the request without sending it.
    pub fn build_request(&self, call: &CallDescriptor) -> Result<HttpRequest, ConfigError> {
        let target = url::resolve_target(&self.config, &call.params, &call.path)?;
        let mut request = HttpRequest::new(
            call.operation.method(),
            target.url(&call.path, call.id.as_ref()),
        );

        request.proxy = self.proxy_for(&call.params)?;
        request.timeout = self.timeout_for(&call.params)?;
        request.max_redirects = self.config.max_redirects;
        request.keep_alive = self.config.keep_alive;
        request.retry = self.config.retry.clone();

        let payload = call
            .payload
            .as_ref()
            .filter(|_| call.operation.carries_body());
        match payload {
            Some(Payload::Multipart(form)) => {
                request.headers = form.headers();
                request.body = Some(form.to_bytes());
            }
            Some(Payload::Json(value)) => {
                request.headers = self.context_headers(&call.params);
                set_header(&mut request.headers, "content-type", "application/json");
                request.body = Some(value.to_string().into_bytes());
            }
            None => {
                request.headers = self.context_headers(&call.params);
            }
        }

        Ok(request)
    }

    /// Returns the body of a 2xx response; any other status is a failure.
    pub fn parse_response(&self, response: HttpResponse) -> Result<ResponseBody, TransportFailure> {
        if !response.is_success() {
            return Err(TransportFailure::Status {
                status: response.status,
                body: response.body_value(),
            });
        }
        Ok(match self.config.response_type {
            ResponseType::Json => ResponseBody::Json(response.body_value().unwrap_or(Value::Null)),
            ResponseType::Text => {
                ResponseBody::Text(String::from_utf8_lossy(&response.body).into_owned())
            }
            ResponseType::Bytes => ResponseBody::Bytes(response.body),
        })
    }

    /// Performs exactly one transport call for `call`.
    pub async fn send(&self, call: CallDescriptor) -> Result<ResponseBody, DispatchError> {
        let request = self.build_request(&call)?;
        tracing::debug!(
            operation = call.operation.as_str(),
            method = request.method.as_str(),
            url = %request.url,
            "dispatching remote call"
        );
        let response = self.transport.execute(request).await?;
        Ok(self.parse_response(response)?)
    }

    /// Caller headers minus excluded keys, plus the context envelope.
    fn context_headers(&self, params: &ParameterBag) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = params
            .headers()
            .map(|h| self.config.exclude_params.filter(h))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, value)| header_value(&value).map(|v| (name, v)))
            .collect();
        let envelope = codec::encode(params, &self.config.exclude_params);
        set_header(&mut headers, &self.config.internal_request_header, &envelope);
        headers
    }

    fn proxy_for(&self, params: &ParameterBag) -> Result<Option<ProxyConfig>, ConfigError> {
        let call: ProxyConfig = match params.get_present(PROXY) {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|_| ConfigError::InvalidProxy(value.to_string()))?,
            None => ProxyConfig::default(),
        };
        let merged = self.config.proxy.clone().unwrap_or_default().merged(&call);
        if merged.is_empty() {
            return Ok(None);
        }
        if merged.host.is_none() {
            return Err(ConfigError::InvalidProxy("proxy without host".to_string()));
        }
        Ok(Some(merged))
    }

    /// A present `timeout` (milliseconds) wins even when it is `0`.
    fn timeout_for(&self, params: &ParameterBag) -> Result<Option<Duration>, ConfigError> {
        match params.get_present(TIMEOUT) {
            Some(value) => value
                .as_u64()
                .map(|ms| Some(Duration::from_millis(ms)).filter(|d| !d.is_zero()))
                .ok_or_else(|| ConfigError::InvalidTimeout(value.to_string())),
            None => Ok(self.config.timeout),
        }
    }
}

/// Replaces any header with the same name (case-insensitive) then appends.
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.to_string()));
}

fn header_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(header_value)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}
