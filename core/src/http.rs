//! HTTP request and response described as plain data.
//!
//! # Design
//! The dispatcher builds an `HttpRequest` value and hands it to a
//! `Transport`; the transport answers with an `HttpResponse` for any status
//! it received. Keeping both sides as data means request construction and
//! response interpretation are testable without a socket.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{ProxyConfig, RetryPolicy};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether repeating the request cannot change the outcome.
    pub fn is_idempotent(self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Put | HttpMethod::Delete)
    }
}

/// An outbound HTTP request plus the transport options that apply to it.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// `None` means no timeout.
    pub timeout: Option<Duration>,
    pub proxy: Option<ProxyConfig>,
    pub max_redirects: Option<usize>,
    pub keep_alive: bool,
    pub retry: Option<RetryPolicy>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            proxy: None,
            max_redirects: None,
            keep_alive: false,
            retry: None,
        }
    }

    /// First header value whose name matches case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response as received, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON when it parses, as a JSON string otherwise, `None` when
    /// empty.
    pub fn body_value(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        Some(
            serde_json::from_slice(&self.body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned())),
        )
    }
}

/// Successful response body, shaped by the configured `ResponseType`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseBody {
    /// Converts whatever was received into JSON.
    pub fn into_json(self) -> Value {
        match self {
            ResponseBody::Json(value) => value,
            ResponseBody::Text(text) => Value::String(text),
            ResponseBody::Bytes(bytes) => {
                serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                })
            }
        }
    }

    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.into_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_lookup_ignores_case() {
        let mut req = HttpRequest::new(HttpMethod::Get, "http://svc/users");
        req.headers.push(("X-Internal-Request".into(), "%7B%7D".into()));
        assert_eq!(req.header("x-internal-request"), Some("%7B%7D"));
        assert!(req.header("content-type").is_none());
    }

    #[test]
    fn body_value_falls_back_to_string() {
        assert_eq!(HttpResponse::new(200, r#"{"a":1}"#).body_value(), Some(json!({ "a": 1 })));
        assert_eq!(HttpResponse::new(502, "upstream down").body_value(), Some(json!("upstream down")));
        assert_eq!(HttpResponse::new(204, Vec::new()).body_value(), None);
    }

    #[test]
    fn idempotent_methods() {
        assert!(HttpMethod::Get.is_idempotent());
        assert!(HttpMethod::Delete.is_idempotent());
        assert!(!HttpMethod::Post.is_idempotent());
        assert!(!HttpMethod::Patch.is_idempotent());
    }

    #[test]
    fn response_body_deserializes() {
        #[derive(serde::Deserialize)]
        struct User {
            id: u64,
        }
        let user: User = ResponseBody::Json(json!({ "id": 3 })).deserialize().unwrap();
        assert_eq!(user.id, 3);
        let bytes = ResponseBody::Bytes(br#"{"id":4}"#.to_vec()).into_json();
        assert_eq!(bytes["id"], 4);
    }
}
