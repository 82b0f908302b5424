//! The header envelope that carries call context between nodes.
//!
//! # Wire format
//! The envelope is the filtered `ParameterBag` serialized as a JSON object,
//! then percent-escaped so it fits in a single header value. Characters that
//! are legal in a URI (`/ ? : @ & = + $ , ; # ! ~ * ' ( )` and
//! alphanumerics) are left as-is; everything else, including non-ASCII, is
//! escaped as UTF-8 octets.
//!
//! Decoding is lenient: a header that does not unescape to a JSON object is
//! treated as absent. Fields a receiver does not know are kept.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value};

use crate::params::{ExcludedKeys, ParameterBag, HEADERS, PROVIDER, QUERY};

pub const INTERNAL_REQUEST_HEADER: &str = "X-Internal-Request";

/// Fields a receiver always owns; never taken from the envelope.
pub const RECEIVER_ONLY_FIELDS: [&str; 2] = [PROVIDER, HEADERS];

const ENVELOPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Serializes `bag` minus `excluded` into a header value.
pub fn encode(bag: &ParameterBag, excluded: &ExcludedKeys) -> String {
    let json = Value::Object(excluded.filter(bag.as_map())).to_string();
    utf8_percent_encode(&json, ENVELOPE).to_string()
}

/// Context recovered from an envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedContext {
    pub query: Option<Value>,
    pub fields: Map<String, Value>,
}

impl DecodedContext {
    /// Merges the decoded fields into `context`, overwriting same-named
    /// entries, then drops the receiver-only fields. Returns the query.
    pub fn apply(self, context: &mut Map<String, Value>) -> Option<Value> {
        context.extend(self.fields);
        for key in RECEIVER_ONLY_FIELDS {
            context.remove(key);
        }
        self.query
    }
}

/// Parses a header value produced by `encode`. `None` if it is not one.
pub fn decode(header: &str) -> Option<DecodedContext> {
    let json = percent_decode_str(header).decode_utf8().ok()?;
    let mut fields = match serde_json::from_str::<Value>(&json).ok()? {
        Value::Object(map) => map,
        _ => return None,
    };
    let query = fields.remove(QUERY).filter(|q| !q.is_null());
    Some(DecodedContext { query, fields })
}
