use crate::common::data::Error::{InvalidMethod, RequestConversionError};
use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};
use std::{collections::HashMap, fmt, str::FromStr};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid HTTP method {0}")]
    InvalidMethod(String),
    #[error("invalid content kind {0}")]
    InvalidContentKind(String),
    #[error("cannot convert request to internal structure: {0}")]
    RequestConversionError(String),
}

/// The identifier of a stored mock. It is assigned by the mock store and never reused.
pub type MockId = u64;

/// Represents an HTTP method a mock can be registered for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl PartialEq<Method> for http::method::Method {
    fn eq(&self, other: &Method) -> bool {
        self.as_str().eq_ignore_ascii_case(&other.to_string())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "CONNECT" => Ok(Method::CONNECT),
            "OPTIONS" => Ok(Method::OPTIONS),
            "TRACE" => Ok(Method::TRACE),
            "PATCH" => Ok(Method::PATCH),
            _ => Err(InvalidMethod(input.to_string())),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = Error;

    fn try_from(value: &http::Method) -> Result<Self, Self::Error> {
        value.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the content of a body or script is turned into output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// The content is used verbatim.
    Static,
    /// The content is a template that is rendered against the incoming request.
    EmbeddedScript,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Static => "static",
            ContentKind::EmbeddedScript => "embedded_script",
        }
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "static" => Ok(ContentKind::Static),
            "embedded_script" => Ok(ContentKind::EmbeddedScript),
            _ => Err(Error::InvalidContentKind(input.to_string())),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A body or script together with the way it is rendered. Both halves always exist together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub kind: ContentKind,
    pub value: String,
}

impl Content {
    pub fn new<V: Into<String>>(kind: ContentKind, value: V) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// A response header configured on a mock.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl Header {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// A header without name and value carries no information and is never stored.
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.value.trim().is_empty()
    }
}

/// The attributes of a mock as they are submitted to create or update it. Nothing is
/// validated yet, every field may be missing.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MockParams {
    pub name: Option<String>,
    pub request_method: Option<String>,
    pub route_path: Option<String>,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub body_type: Option<String>,
    pub body_content: Option<String>,
    pub script_type: Option<String>,
    pub script: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl MockParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn request_method<T: Into<String>>(mut self, method: T) -> Self {
        self.request_method = Some(method.into());
        self
    }

    pub fn route_path<T: Into<String>>(mut self, path: T) -> Self {
        self.route_path = Some(path.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn content_type<T: Into<String>>(mut self, content_type: T) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn body<K: Into<String>, T: Into<String>>(mut self, body_type: K, content: T) -> Self {
        self.body_type = Some(body_type.into());
        self.body_content = Some(content.into());
        self
    }

    pub fn script<K: Into<String>, T: Into<String>>(mut self, script_type: K, script: T) -> Self {
        self.script_type = Some(script_type.into());
        self.script = Some(script.into());
        self
    }

    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }
}

impl From<&MockDefinition> for MockParams {
    fn from(definition: &MockDefinition) -> Self {
        Self {
            name: Some(definition.name.clone()),
            request_method: Some(definition.request_method.to_string()),
            route_path: Some(definition.route_path.clone()),
            status: Some(definition.status),
            content_type: Some(definition.content_type.clone()),
            body_type: definition.body.as_ref().map(|c| c.kind.to_string()),
            body_content: definition.body.as_ref().map(|c| c.value.clone()),
            script_type: definition.script.as_ref().map(|c| c.kind.to_string()),
            script: definition.script.as_ref().map(|c| c.value.clone()),
            headers: definition.headers.clone(),
        }
    }
}

/// A validated mock. Only values of this type are ever persisted or registered for routing.
#[derive(Debug, Clone, PartialEq)]
pub struct MockDefinition {
    pub name: String,
    pub request_method: Method,
    /// The normalized route path.
    pub route_path: String,
    pub status: u16,
    pub content_type: String,
    pub body: Option<Content>,
    pub script: Option<Content>,
    pub headers: Vec<Header>,
}

impl MockDefinition {
    /// Returns true if the body is rendered as a template for every request.
    pub fn is_dynamic(&self) -> bool {
        self.body
            .as_ref()
            .map_or(false, |body| body.kind == ContentKind::EmbeddedScript)
    }
}

/// A mock as it is held by the mock store.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveMock {
    pub id: MockId,
    pub definition: MockDefinition,
}

impl ActiveMock {
    pub fn new(id: MockId, definition: MockDefinition) -> Self {
        ActiveMock { id, definition }
    }
}

impl Serialize for ActiveMock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Flat {
            id: MockId,
            #[serde(flatten)]
            params: MockParams,
        }

        Flat {
            id: self.id,
            params: MockParams::from(&self.definition),
        }
        .serialize(serializer)
    }
}

/// An entry of the route registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub request_method: Method,
    pub route_path: String,
    pub mock_id: MockId,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new<T>(message: &T) -> ErrorResponse
    where
        T: ToString,
    {
        ErrorResponse {
            message: message.to_string(),
        }
    }
}

/// The parts of an incoming request that response templates can read.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub query_params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl MockRequest {
    pub fn query_params(&self) -> HashMap<String, String> {
        self.query_params.iter().cloned().collect()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

impl TryFrom<&http::Request<Bytes>> for MockRequest {
    type Error = Error;

    fn try_from(value: &http::Request<Bytes>) -> Result<Self, Self::Error> {
        Ok(MockRequest {
            method: value.method().to_string(),
            path: value.uri().path().to_string(),
            query_params: extract_query_params(value.uri())?,
            headers: http_headers_to_vec(value),
            // Since Bytes shares data, clone does not copy the body.
            body: value.body().clone(),
        })
    }
}

fn extract_query_params(uri: &http::Uri) -> Result<Vec<(String, String)>, Error> {
    // There doesn't seem to be a way to just parse a query string with the `url` crate, so
    // we're prefixing a dummy URL for parsing.
    let url = format!("http://dummy?{}", uri.query().unwrap_or(""));
    let url = Url::parse(&url).map_err(|e| RequestConversionError(e.to_string()))?;

    Ok(url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

// Header values may carry obs-text bytes, which are replaced rather than rejected.
fn http_headers_to_vec<T>(req: &http::Request<T>) -> Vec<(String, String)> {
    req.headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
