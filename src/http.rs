//! Gateway-level message types.
//!
//! The pipeline operates on its own request/response representation rather
//! than a specific server framework's types, so the library can sit behind
//! any HTTP front (the bundled binary uses axum, see [`crate::server`]).

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

/// A case-insensitive header map.
///
/// Keys are matched ignoring ASCII case; the casing of the first insertion is
/// preserved for emission.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    // lowercase key -> (original name, value)
    entries: HashMap<String, (String, String)>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing value for the same name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .insert(name.to_ascii_lowercase(), (name.to_string(), value.into()));
    }

    /// Get a header value by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    /// Whether a header is present, ignoring case.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterate over `(name, value)` pairs in original casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, S)> for Headers {
    fn from_iter<T: IntoIterator<Item = (S, S)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            let name = name.into();
            headers.insert(&name, value.into());
        }
        headers
    }
}

/// Message body carried through the pipeline.
///
/// JSON bodies are kept parsed so transformations (notably the error
/// envelope) can inspect them; anything else passes through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Raw(Vec<u8>),
}

impl Body {
    /// The body as JSON, if it is JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Build a body from raw bytes, parsing JSON when possible.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            return Body::Empty;
        }
        match serde_json::from_slice(&bytes) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Raw(bytes),
        }
    }

    /// Serialize the body to bytes for emission.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Body::Empty => Vec::new(),
            Body::Json(value) => serde_json::to_vec(value).unwrap_or_default(),
            Body::Raw(bytes) => bytes.clone(),
        }
    }
}

/// Pre-authenticated identity attached by an external auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable identifier for the authenticated principal.
    pub id: String,
}

/// An inbound request as seen by the gateway pipeline.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// HTTP method (uppercase).
    pub method: String,
    /// Request path, without query string.
    pub path: String,
    /// Request headers.
    pub headers: Headers,
    /// Parsed query parameters.
    pub query: HashMap<String, String>,
    /// Source address of the client connection.
    pub client_addr: String,
    /// Identity supplied by the external auth layer, when present.
    pub identity: Option<Identity>,
    /// Request body.
    pub body: Body,
}

impl GatewayRequest {
    /// Create a request with the given method and path and empty everything
    /// else.
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            headers: Headers::new(),
            query: HashMap::new(),
            client_addr: String::new(),
            identity: None,
            body: Body::Empty,
        }
    }

    /// The key used to attribute this request to a client for admission
    /// control: the authenticated identity when present, otherwise the
    /// source address.
    pub fn client_id(&self) -> &str {
        match &self.identity {
            Some(identity) => &identity.id,
            None => &self.client_addr,
        }
    }
}

/// A response flowing back through the gateway pipeline.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: Body,
}

impl GatewayResponse {
    /// Create a response with the given status and an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    /// Create a JSON response.
    pub fn json(status: u16, body: Value) -> Self {
        let mut response = Self::new(status);
        response.headers.insert("Content-Type", "application/json");
        response.body = Body::Json(body);
        response
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Display for GatewayResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("X-API-Version", "2");

        assert_eq!(headers.get("x-api-version"), Some("2"));
        assert_eq!(headers.get("X-Api-Version"), Some("2"));
        assert!(headers.contains("X-API-VERSION"));
    }

    #[test]
    fn test_headers_insert_replaces() {
        let mut headers = Headers::new();
        headers.insert("Accept", "application/json");
        headers.insert("accept", "text/plain");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Accept"), Some("text/plain"));
    }

    #[test]
    fn test_body_from_bytes_parses_json() {
        let body = Body::from_bytes(b"{\"detail\":\"nope\"}".to_vec());
        assert_eq!(body.as_json().unwrap()["detail"], "nope");

        let body = Body::from_bytes(b"not json".to_vec());
        assert_eq!(body, Body::Raw(b"not json".to_vec()));

        assert_eq!(Body::from_bytes(Vec::new()), Body::Empty);
    }

    #[test]
    fn test_client_id_prefers_identity() {
        let mut request = GatewayRequest::new("GET", "/api/users");
        request.client_addr = "10.0.0.1".to_string();
        assert_eq!(request.client_id(), "10.0.0.1");

        request.identity = Some(Identity {
            id: "user-42".to_string(),
        });
        assert_eq!(request.client_id(), "user-42");
    }
}
