//! Connection scope: the per-connection descriptor handed to applications.

use std::net::SocketAddr;

use axum::http::{HeaderMap, Method};
use uuid::Uuid;

use crate::protocol::state::SharedState;

/// Kind of inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Process startup/shutdown signaling.
    Lifespan,
    /// A single request/response exchange.
    Http,
    /// A full-duplex message stream.
    WebSocket,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Lifespan => "lifespan",
            ScopeKind::Http => "http",
            ScopeKind::WebSocket => "websocket",
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header list with case-insensitive lookup.
///
/// Duplicates are kept in arrival order; `set-cookie` in particular may
/// legitimately appear several times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header, keeping any existing entries with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.get_all(name).next()
    }

    /// All values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect())
    }
}

/// Header values are stored as text. Bytes that are not valid UTF-8 are
/// replaced with U+FFFD, so opaque values (some cookies) do not survive a
/// round trip through [`Headers`] byte for byte.
impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

/// Immutable descriptor of one inbound connection.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Connection identifier for log correlation.
    pub id: Uuid,
    pub kind: ScopeKind,
    /// Request method; `GET` for websocket and lifespan scopes.
    pub method: Method,
    /// Inbound scheme (`http`, `https`, `ws`, `wss`).
    pub scheme: String,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query_string: String,
    pub headers: Headers,
    /// Peer address of the inbound connection, when the host knows it.
    pub client: Option<SocketAddr>,
    /// Process-wide state, when the host provides one.
    pub state: Option<SharedState>,
}

impl Scope {
    fn new(kind: ScopeKind, scheme: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            method: Method::GET,
            scheme: scheme.to_string(),
            path: String::new(),
            query_string: String::new(),
            headers: Headers::new(),
            client: None,
            state: None,
        }
    }

    pub fn lifespan() -> Self {
        Self::new(ScopeKind::Lifespan, "")
    }

    pub fn http(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::new(ScopeKind::Http, "http")
        }
    }

    pub fn websocket(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::new(ScopeKind::WebSocket, "ws")
        }
    }

    pub fn with_query(mut self, query_string: impl Into<String>) -> Self {
        self.query_string = query_string.into();
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_client(mut self, client: SocketAddr) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_state(mut self, state: SharedState) -> Self {
        self.state = Some(state);
        self
    }
}
