use crate::common::data::{ActiveMock, Content, ContentKind, Header, MockId, MockRequest};
use bytes::Bytes;
use handlebars::{handlebars_helper, no_escape, Handlebars, RenderError as TemplateError};
use http::{header::CONTENT_TYPE, Response, StatusCode};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("cannot run script of mock with id={id}: {source}")]
    ScriptError {
        id: MockId,
        #[source]
        source: TemplateError,
    },
    #[error("cannot render body of mock with id={id}: {source}")]
    BodyError {
        id: MockId,
        #[source]
        source: TemplateError,
    },
    #[error("cannot build response: {0}")]
    ResponseConstructionError(#[from] http::Error),
    #[error("invalid status code: {0}")]
    InvalidStatusCode(#[from] http::status::InvalidStatusCode),
}

/// The response of a mock before it is handed to the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<Header>,
    pub body: String,
}

impl MockResponse {
    /// The content type goes first, configured headers follow in their stored order.
    pub fn to_http(&self) -> Result<Response<Bytes>, RenderError> {
        let mut builder = Response::builder()
            .status(StatusCode::from_u16(self.status)?)
            .header(CONTENT_TYPE, self.content_type.as_str());

        for header in &self.headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }

        Ok(builder.body(Bytes::from(self.body.clone()))?)
    }
}

handlebars_helper!(json: |value: Json| serde_json::to_string(value).unwrap_or_default());
handlebars_helper!(default: |value: Json, fallback: Json| {
    if value.is_null() {
        fallback.clone()
    } else {
        value.clone()
    }
});

/// Produces the response of a matched mock.
///
/// Bodies and scripts of kind `embedded_script` are Handlebars templates. They can read the
/// incoming request under `request` (`method`, `path`, `query`, `query_params`, `headers`,
/// `body` and `json`). The body template can also read the script output under `script`,
/// parsed as JSON whenever the output is valid JSON.
///
/// The template registry is shared by all requests but never modified after construction.
pub struct ResponseResolver {
    templates: Handlebars<'static>,
}

impl ResponseResolver {
    pub fn new() -> Self {
        let mut templates = Handlebars::new();

        templates.set_strict_mode(false);
        templates.register_escape_fn(no_escape);
        templates.register_helper("json", Box::new(json));
        templates.register_helper("default", Box::new(default));

        Self { templates }
    }

    pub fn resolve(&self, mock: &ActiveMock, req: &MockRequest) -> Result<MockResponse, RenderError> {
        let definition = &mock.definition;
        let mut context = request_context(req);

        if let Some(script) = &definition.script {
            let output = self
                .render(script, &context)
                .map_err(|source| RenderError::ScriptError { id: mock.id, source })?;
            context["script"] = script_value(output);
        }

        let body = match &definition.body {
            Some(body) => self
                .render(body, &context)
                .map_err(|source| RenderError::BodyError { id: mock.id, source })?,
            None => String::new(),
        };

        Ok(MockResponse {
            status: definition.status,
            content_type: definition.content_type.clone(),
            headers: definition.headers.clone(),
            body,
        })
    }

    fn render(&self, content: &Content, context: &Value) -> Result<String, TemplateError> {
        match content.kind {
            ContentKind::Static => Ok(content.value.clone()),
            ContentKind::EmbeddedScript => self.templates.render_template(&content.value, context),
        }
    }
}

impl Default for ResponseResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn request_context(req: &MockRequest) -> Value {
    let headers: Map<String, Value> = req
        .headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), Value::String(value.clone())))
        .collect();

    json!({
        "request": {
            "method": req.method,
            "path": req.path,
            "query": req.query_params(),
            "query_params": req.query_params,
            "headers": headers,
            "body": req.body_string(),
            "json": serde_json::from_slice::<Value>(&req.body).unwrap_or(Value::Null),
        },
        "script": Value::Null,
    })
}

fn script_value(output: String) -> Value {
    serde_json::from_str(output.trim()).unwrap_or(Value::String(output))
}
