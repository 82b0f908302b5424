//! The transport seam and its reqwest implementation.
//!
//! # Design
//! `Transport::execute` performs one logical request and answers with the
//! response for any status; only failures to obtain a response are errors.
//! Retry, proxying, redirect limits, keep-alive and DNS caching are transport
//! concerns: the dispatcher only decides which of them a request asks for.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client, Method};
use serde_json::Value;
use thiserror::Error;

use crate::config::{ProxyConfig, RetryPolicy};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Sends `HttpRequest`s over the network.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure>;
}

/// Low-level reason a connection produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCode {
    Aborted,
    TimedOut,
    Refused,
    Reset,
    Unreachable,
    Other(String),
}

impl ConnectionCode {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectionCode::Aborted | ConnectionCode::TimedOut)
    }

    fn from_io(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::ConnectionAborted => ConnectionCode::Aborted,
            io::ErrorKind::TimedOut => ConnectionCode::TimedOut,
            io::ErrorKind::ConnectionRefused => ConnectionCode::Refused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => ConnectionCode::Reset,
            io::ErrorKind::NotFound | io::ErrorKind::AddrNotAvailable => ConnectionCode::Unreachable,
            other => ConnectionCode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ConnectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionCode::Aborted => write!(f, "connection-aborted"),
            ConnectionCode::TimedOut => write!(f, "timed-out"),
            ConnectionCode::Refused => write!(f, "connection-refused"),
            ConnectionCode::Reset => write!(f, "connection-reset"),
            ConnectionCode::Unreachable => write!(f, "host-unreachable"),
            ConnectionCode::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Raw outcome of a failed call, before translation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportFailure {
    /// A response arrived with a non-2xx status.
    #[error("HTTP {status}")]
    Status { status: u16, body: Option<Value> },

    /// No response: the connection failed with a known low-level code.
    #[error("connection failed ({code}): {message}")]
    Connection { code: ConnectionCode, message: String },

    /// No response and no code, e.g. the request could not be built.
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportFailure {
    pub fn timed_out(message: impl Into<String>) -> Self {
        TransportFailure::Connection {
            code: ConnectionCode::TimedOut,
            message: message.into(),
        }
    }

    fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self {
            TransportFailure::Status { status, .. } => *status >= 500,
            TransportFailure::Connection { code, .. } => {
                !code.is_timeout() || policy.retry_on_timeout
            }
            TransportFailure::Request(_) => false,
        }
    }
}

/// Client-wide options; requests that ask for different ones get a
/// dedicated client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOptions {
    pub proxy: Option<ProxyConfig>,
    pub max_redirects: Option<usize>,
    pub keep_alive: bool,
    pub dns_cache: bool,
}

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    options: ClientOptions,
}

impl ReqwestTransport {
    pub fn new(options: ClientOptions) -> Result<Self, TransportFailure> {
        let client = build_client(&options)?;
        Ok(Self { client, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn client_for(&self, request: &HttpRequest) -> Result<Client, TransportFailure> {
        let wanted = ClientOptions {
            proxy: request.proxy.clone(),
            max_redirects: request.max_redirects,
            keep_alive: request.keep_alive,
            dns_cache: self.options.dns_cache,
        };
        if wanted == self.options {
            Ok(self.client.clone())
        } else {
            build_client(&wanted)
        }
    }

    async fn attempt(&self, client: &Client, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let mut builder = client.request(method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await.map_err(map_error)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let client = self.client_for(&request)?;
        let policy = request
            .retry
            .clone()
            .filter(|_| request.method.is_idempotent());

        let mut retry = 0;
        loop {
            let outcome = self.attempt(&client, &request).await;
            let failure = match &outcome {
                Ok(response) if response.status >= 500 => Some(TransportFailure::Status {
                    status: response.status,
                    body: None,
                }),
                Ok(_) => None,
                Err(failure) => Some(failure.clone()),
            };

            match (failure, &policy) {
                (Some(failure), Some(p)) if retry < p.retries && failure.is_retryable(p) => {
                    retry += 1;
                    tracing::warn!(
                        url = %request.url,
                        attempt = retry,
                        error = %failure,
                        "retrying remote request"
                    );
                    tokio::time::sleep(p.delay_for(retry)).await;
                }
                _ => return outcome,
            }
        }
    }
}

fn build_client(options: &ClientOptions) -> Result<Client, TransportFailure> {
    let mut builder = Client::builder();

    builder = match &options.proxy {
        Some(proxy) => {
            let url = proxy
                .url()
                .ok_or_else(|| TransportFailure::Request("proxy without host".to_string()))?;
            let mut p = reqwest::Proxy::all(&url).map_err(|e| TransportFailure::Request(e.to_string()))?;
            if let Some(auth) = &proxy.auth {
                p = p.basic_auth(&auth.username, &auth.password);
            }
            builder.proxy(p)
        }
        None => builder.no_proxy(),
    };

    if let Some(max) = options.max_redirects {
        builder = builder.redirect(if max == 0 {
            redirect::Policy::none()
        } else {
            redirect::Policy::limited(max)
        });
    }

    builder = if options.keep_alive {
        builder.tcp_keepalive(Duration::from_secs(60))
    } else {
        builder.pool_max_idle_per_host(0)
    };

    if options.dns_cache {
        builder = builder.hickory_dns(true);
    }

    builder
        .build()
        .map_err(|e| TransportFailure::Request(e.to_string()))
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn map_error(err: reqwest::Error) -> TransportFailure {
    let message = err.to_string();
    if err.is_timeout() {
        return TransportFailure::Connection {
            code: ConnectionCode::TimedOut,
            message,
        };
    }
    if let Some(kind) = io_kind(&err) {
        return TransportFailure::Connection {
            code: ConnectionCode::from_io(kind),
            message,
        };
    }
    if err.is_connect() {
        return TransportFailure::Connection {
            code: ConnectionCode::Other("connect".to_string()),
            message,
        };
    }
    TransportFailure::Request(message)
}

/// Walks the source chain looking for the underlying socket error.
fn io_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            return Some(io.kind());
        }
        source = e.source();
    }
    None
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportFailure> + Send + Sync>;

    /// Records every request and answers from a closure.
    pub struct StubTransport {
        pub requests: Mutex<Vec<HttpRequest>>,
        responder: Responder,
    }

    impl StubTransport {
        pub fn new<F>(responder: F) -> Self
        where
            F: Fn(&HttpRequest) -> Result<HttpResponse, TransportFailure> + Send + Sync + 'static,
        {
            Self {
                requests: Mutex::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        pub fn ok(body: &'static str) -> Self {
            Self::new(move |_| Ok(HttpResponse::new(200, body)))
        }

        pub fn recorded(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl fmt::Debug for StubTransport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("StubTransport").finish_non_exhaustive()
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
            let outcome = (self.responder)(&request);
            self.requests.lock().unwrap().push(request);
            outcome
        }
    }
}
