//! Inbound half of the context envelope.
//!
//! `ContextLayer` runs before any handler. It builds the request's
//! `CallContext` (query string, `provider = "rest"`, request headers) and,
//! when the envelope header is present and decodes, replaces the query with
//! the envelope's and merges the envelope's other fields over the context.
//! `provider` and `headers` are then dropped, which is how a handler tells an
//! internal call from an external one. A header that fails to decode is
//! ignored.
//!
//! The restored query lives only in `CallContext::query`. When an envelope
//! is applied the outer query string is cut from the request URI, so axum's
//! `Query` extractor no longer sees the parameters the envelope replaced.

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, Query};
use axum::http::header::InvalidHeaderName;
use axum::http::request::Parts;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, HeaderName, Request, Uri};
use remote_service::codec;
use serde::Serialize;
use serde_json::{Map, Value};
use tower::{Layer, Service};

pub const REST_PROVIDER: &str = "rest";

/// Per-call context visible to handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallContext {
    pub query: Option<Value>,
    pub fields: Map<String, Value>,
}

impl CallContext {
    /// Context of a request as it arrived, before any envelope is applied.
    pub fn external(uri: &Uri, headers: &HeaderMap) -> Self {
        let query = Query::<Map<String, Value>>::try_from_uri(uri)
            .ok()
            .map(|Query(map)| map)
            .filter(|map| !map.is_empty())
            .map(Value::Object);

        let headers: Map<String, Value> = headers
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_string(), Value::String(value.to_string())))
            })
            .collect();

        let mut fields = Map::new();
        fields.insert("provider".to_string(), Value::from(REST_PROVIDER));
        fields.insert("headers".to_string(), Value::Object(headers));
        Self { query, fields }
    }

    /// True when the call arrived through another node's dispatcher.
    pub fn is_internal(&self) -> bool {
        !self.fields.contains_key("provider")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn query_map(&self) -> Option<&Map<String, Value>> {
        self.query.as_ref().and_then(Value::as_object)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CallContext>()
            .cloned()
            .unwrap_or_else(|| CallContext::external(&parts.uri, &parts.headers)))
    }
}

/// Builds the request's `CallContext` and stores it in its extensions.
pub fn restore_context<B>(req: &mut Request<B>, header: &HeaderName) {
    let mut context = CallContext::external(req.uri(), req.headers());

    if let Some(value) = req.headers().get(header) {
        match value.to_str().ok().and_then(codec::decode) {
            Some(decoded) => {
                context.query = decoded.apply(&mut context.fields);
                if let Some(uri) = without_query(req.uri()) {
                    *req.uri_mut() = uri;
                }
                tracing::debug!(
                    uri = %req.uri(),
                    fields = context.fields.len(),
                    "restored call context"
                );
            }
            None => {
                tracing::warn!(uri = %req.uri(), header = %header, "ignoring undecodable context header");
            }
        }
    }

    req.extensions_mut().insert(context);
}

fn without_query(uri: &Uri) -> Option<Uri> {
    uri.query()?;
    let mut parts = uri.clone().into_parts();
    let path = PathAndQuery::try_from(parts.path_and_query.as_ref()?.path()).ok()?;
    parts.path_and_query = Some(path);
    Uri::from_parts(parts).ok()
}

/// Tower layer applying `restore_context` to every request.
#[derive(Debug, Clone)]
pub struct ContextLayer {
    header: HeaderName,
}

impl ContextLayer {
    pub fn new() -> Self {
        Self {
            header: HeaderName::from_static("x-internal-request"),
        }
    }

    /// Reads the envelope from `name` instead; matching ignores case.
    pub fn with_header(name: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::try_from(name)?,
        })
    }
}

impl Default for ContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for ContextLayer {
    type Service = ContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ContextService {
            inner,
            header: self.header.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextService<S> {
    inner: S,
    header: HeaderName,
}

impl<S, B> Service<Request<B>> for ContextService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        restore_context(&mut req, &self.header);
        self.inner.call(req)
    }
}
