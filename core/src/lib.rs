//! Call services that live on other nodes as if they were local.
//!
//! # Overview
//! A `RemoteService` exposes the six service verbs (find, get, create,
//! update, patch, remove) for one resource path. Each call becomes one HTTP
//! request. The caller's parameter bag, minus a fixed set of excluded keys,
//! travels in a single header (`X-Internal-Request` by default) so the
//! receiving node can restore the call context before routing.
//!
//! # Design
//! - `url` resolves protocol/host/port/suffix from per-call overrides,
//!   configuration and defaults. Pure.
//! - `codec` encodes and decodes the header envelope. Pure.
//! - `Dispatcher` builds an `HttpRequest` as plain data, hands it to a
//!   `Transport` and shapes the response. Failures stay raw.
//! - `translate` maps raw failures onto the `RemoteError` taxonomy.
//! - `RemoteService` ties them together and is what callers hold.

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod multipart;
pub mod params;
pub mod service;
pub mod translate;
pub mod transport;
pub mod url;

pub use codec::{decode, encode, DecodedContext, INTERNAL_REQUEST_HEADER};
pub use config::{PathToHost, ProxyAuth, ProxyConfig, RemoteConfig, ResponseType, RetryPolicy};
pub use dispatcher::{CallDescriptor, Dispatcher, Operation, Payload};
pub use error::{ConfigError, DispatchError, RemoteError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, ResponseBody};
pub use multipart::MultipartForm;
pub use params::{ExcludedKeys, ParameterBag};
pub use service::RemoteService;
pub use translate::translate;
pub use transport::{ClientOptions, ConnectionCode, ReqwestTransport, Transport, TransportFailure};
pub use url::{resolve, Protocol, ResourceId, Target};
