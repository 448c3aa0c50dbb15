use crate::{
    common::data::{Content, ContentKind, Header, Method, MockDefinition, MockId, MockParams},
    server::{
        registry::RouteTable,
        routes::{RouteError, RouteValidator},
    },
};
use http::{header::CONTENT_TYPE, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use std::fmt;

pub const BLANK: &str = "can't be blank";
pub const NOT_INCLUDED: &str = "is not included in the list";
pub const TAKEN: &str = "has already been taken";
pub const INVALID: &str = "is invalid";
pub const INVALID_STATUS: &str = "is not a valid status code";
pub const CONTENT_TYPE_HEADER: &str = "can't set Content-Type, use the content type attribute";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    RequestMethod,
    RoutePath,
    Status,
    ContentType,
    BodyType,
    BodyContent,
    ScriptType,
    Script,
    Headers,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::RequestMethod => "Request method",
            Field::RoutePath => "Route path",
            Field::Status => "Status",
            Field::ContentType => "Content type",
            Field::BodyType => "Body type",
            Field::BodyContent => "Body content",
            Field::ScriptType => "Script type",
            Field::Script => "Script",
            Field::Headers => "Headers",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

impl FieldError {
    pub fn full_message(&self) -> String {
        format!("{} {}", self.field.label(), self.message)
    }
}

/// Every problem found with a submitted mock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn add<M: Into<String>>(&mut self, field: Field, message: M) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn on(&self, field: Field) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.errors.iter().map(FieldError::full_message).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

/// The state of the world a submitted mock is checked against.
pub(crate) struct ValidationContext<'a> {
    /// Set when an existing mock is being updated.
    pub id: Option<MockId>,
    pub name_taken: bool,
    pub routes: &'a RouteTable,
    pub validator: &'a RouteValidator,
}

/// Returns the value unless it is missing or only whitespace.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Checks all attributes and returns the typed definition, or every error that was found.
pub(crate) fn validate_mock(
    params: &MockParams,
    ctx: &ValidationContext,
) -> Result<MockDefinition, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let name = present(&params.name);
    if name.is_none() {
        errors.add(Field::Name, BLANK);
    } else if ctx.name_taken {
        errors.add(Field::Name, TAKEN);
    }

    let method = match present(&params.request_method) {
        None => {
            errors.add(Field::RequestMethod, BLANK);
            None
        }
        Some(m) => match m.parse::<Method>() {
            Ok(method) => Some(method),
            Err(_) => {
                errors.add(Field::RequestMethod, NOT_INCLUDED);
                None
            }
        },
    };

    let route_path = present(&params.route_path);
    if route_path.is_none() {
        errors.add(Field::RoutePath, BLANK);
    }

    let route_path = match (method, route_path) {
        (Some(method), Some(path)) => {
            match ctx.validator.validate(method, path, ctx.id, ctx.routes) {
                Ok(normalized) => Some(normalized),
                Err(err) => {
                    if let RouteError::MockCollision(owner) = err {
                        tracing::debug!("Route {} {} is owned by mock id={}", method, path, owner);
                    }
                    errors.add(Field::RoutePath, err.to_string());
                    None
                }
            }
        }
        (None, Some(path)) => {
            // Without a method only the syntax can be checked.
            if let Err(err) = RouteValidator::check_syntax(path) {
                errors.add(Field::RoutePath, err.to_string());
            }
            None
        }
        _ => None,
    };

    let status = match params.status {
        None => {
            errors.add(Field::Status, BLANK);
            None
        }
        Some(code) if StatusCode::from_u16(code).is_err() => {
            errors.add(Field::Status, INVALID_STATUS);
            None
        }
        Some(code) => Some(code),
    };

    let content_type = present(&params.content_type);
    match content_type {
        None => errors.add(Field::ContentType, BLANK),
        Some(ct) if HeaderValue::from_str(ct).is_err() => errors.add(Field::ContentType, INVALID),
        Some(_) => {}
    }

    let body = validate_content_pair(
        &mut errors,
        (Field::BodyType, &params.body_type),
        (Field::BodyContent, &params.body_content),
    );
    let script = validate_content_pair(
        &mut errors,
        (Field::ScriptType, &params.script_type),
        (Field::Script, &params.script),
    );

    let headers: Vec<Header> = params
        .headers
        .iter()
        .filter(|h| !h.is_blank())
        .map(|h| Header::new(h.name.trim(), h.value.as_str()))
        .collect();
    if headers.iter().any(|h| !is_valid_header(h)) {
        errors.add(Field::Headers, INVALID);
    }
    if headers
        .iter()
        .any(|h| h.name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
    {
        errors.add(Field::Headers, CONTENT_TYPE_HEADER);
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    match (name, method, route_path, status, content_type) {
        (Some(name), Some(request_method), Some(route_path), Some(status), Some(content_type)) => {
            Ok(MockDefinition {
                name: name.trim().to_string(),
                request_method,
                route_path,
                status,
                content_type: content_type.trim().to_string(),
                body,
                script,
                headers,
            })
        }
        // All required values have been checked above.
        _ => Err(errors),
    }
}

/// A kind and its content must either both be present or both be absent. A present kind must
/// be one of the known content kinds.
fn validate_content_pair(
    errors: &mut ValidationErrors,
    kind: (Field, &Option<String>),
    content: (Field, &Option<String>),
) -> Option<Content> {
    let (kind_field, kind_value) = kind;
    let (content_field, content_value) = content;

    let parsed_kind = match present(kind_value) {
        Some(k) => match k.parse::<ContentKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                errors.add(kind_field, NOT_INCLUDED);
                None
            }
        },
        None => None,
    };

    match (present(kind_value), present(content_value)) {
        (Some(_), None) => errors.add(content_field, BLANK),
        (None, Some(_)) => errors.add(kind_field, BLANK),
        _ => {}
    }

    match (parsed_kind, present(content_value)) {
        (Some(kind), Some(_)) => content_value
            .as_ref()
            .map(|value| Content::new(kind, value.as_str())),
        _ => None,
    }
}

fn is_valid_header(header: &Header) -> bool {
    HeaderName::from_bytes(header.name.as_bytes()).is_ok()
        && HeaderValue::from_str(&header.value).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::server::routes::ReservedRoutes;
    use std::sync::Arc;

    fn valid_params() -> MockParams {
        MockParams::new()
            .name("Users")
            .request_method("GET")
            .route_path("/users")
            .status(200)
            .content_type("application/json")
    }

    fn check(params: &MockParams) -> Result<MockDefinition, ValidationErrors> {
        check_with(params, None, false, &RouteTable::default())
    }

    fn check_with(
        params: &MockParams,
        id: Option<MockId>,
        name_taken: bool,
        routes: &RouteTable,
    ) -> Result<MockDefinition, ValidationErrors> {
        let validator = RouteValidator::new(Arc::new(ReservedRoutes::new()));
        validate_mock(
            params,
            &ValidationContext {
                id,
                name_taken,
                routes,
                validator: &validator,
            },
        )
    }

    #[test]
    fn minimal_mock_is_valid() {
        let definition = check(&valid_params()).unwrap();

        assert_eq!(definition.request_method, Method::GET);
        assert_eq!(definition.route_path, "/users");
        assert!(definition.body.is_none());
        assert!(definition.script.is_none());
        assert!(!definition.is_dynamic());
    }

    #[test]
    fn required_attributes_must_be_present() {
        let params = MockParams::new().name("  ").route_path("");

        let errors = check(&params).unwrap_err();

        for field in [
            Field::Name,
            Field::RequestMethod,
            Field::RoutePath,
            Field::Status,
            Field::ContentType,
        ] {
            assert_eq!(errors.on(field), vec![BLANK], "{:?}", field);
        }
        assert!(errors.full_messages().contains(&"Name can't be blank".to_string()));
    }

    #[test]
    fn content_pairs_require_both_sides() {
        let mut params = valid_params();
        params.body_type = Some("static".to_string());
        params.script = Some("{{request.path}}".to_string());

        let errors = check(&params).unwrap_err();

        assert_eq!(errors.on(Field::BodyContent), vec![BLANK]);
        assert_eq!(errors.on(Field::ScriptType), vec![BLANK]);
        assert!(errors.on(Field::BodyType).is_empty());
        assert!(errors.on(Field::Script).is_empty());
    }

    #[test]
    fn content_pairs_are_stored_together() {
        let params = valid_params()
            .body("embedded_script", "{{request.method}}")
            .script("static", "{\"a\":1}");

        let definition = check(&params).unwrap();

        assert_eq!(
            definition.body,
            Some(Content::new(ContentKind::EmbeddedScript, "{{request.method}}"))
        );
        assert_eq!(
            definition.script,
            Some(Content::new(ContentKind::Static, "{\"a\":1}"))
        );
        assert!(definition.is_dynamic());
    }

    #[test]
    fn content_kinds_must_be_known() {
        let params = valid_params().body("erb", "x").script("lua", "y");

        let errors = check(&params).unwrap_err();

        assert_eq!(errors.on(Field::BodyType), vec![NOT_INCLUDED]);
        assert_eq!(errors.on(Field::ScriptType), vec![NOT_INCLUDED]);
    }

    #[test]
    fn method_must_be_known() {
        let errors = check(&valid_params().request_method("FETCH")).unwrap_err();
        assert_eq!(errors.on(Field::RequestMethod), vec![NOT_INCLUDED]);
    }

    #[test]
    fn route_syntax_is_checked_without_a_method() {
        let params = valid_params()
            .request_method("FETCH")
            .route_path("httpgih[]com");

        let errors = check(&params).unwrap_err();

        assert_eq!(
            errors.full_messages(),
            vec![
                "Request method is not included in the list",
                "Route path is not a valid route"
            ]
        );

        let mut params = valid_params().route_path("/fine");
        params.request_method = None;
        let errors = check(&params).unwrap_err();
        assert!(errors.on(Field::RoutePath).is_empty());
    }

    #[test]
    fn content_type_header_is_rejected() {
        let errors = check(&valid_params().header("Content-Type", "text/html")).unwrap_err();

        assert_eq!(errors.on(Field::Headers), vec![CONTENT_TYPE_HEADER]);
        assert!(check(&valid_params().header("x-content-kind", "html")).is_ok());
    }

    #[test]
    fn taken_name_is_reported() {
        let errors = check_with(&valid_params(), None, true, &RouteTable::default()).unwrap_err();
        assert_eq!(errors.full_messages(), vec!["Name has already been taken"]);
    }

    #[test]
    fn route_errors_use_their_own_messages() {
        let mut routes = RouteTable::default();
        routes.insert(Method::GET, "/users".to_string(), 4);

        let malformed = check(&valid_params().route_path("httpgih[]com")).unwrap_err();
        let reserved = check(&valid_params().route_path("/__routemock__/mocks")).unwrap_err();
        let taken = check_with(&valid_params(), None, false, &routes).unwrap_err();

        assert_eq!(malformed.on(Field::RoutePath), vec!["is not a valid route"]);
        assert_eq!(reserved.on(Field::RoutePath), vec!["already in use"]);
        assert_eq!(taken.on(Field::RoutePath), vec!["has already been taken"]);
        assert!(check_with(&valid_params(), Some(4), false, &routes).is_ok());
    }

    #[test]
    fn blank_headers_are_dropped_and_invalid_ones_rejected() {
        let params = valid_params()
            .header("", "")
            .header("x-request-id", "abc")
            .header("  ", " ");

        let definition = check(&params).unwrap();
        assert_eq!(definition.headers, vec![Header::new("x-request-id", "abc")]);

        let errors = check(&valid_params().header("bad header", "v")).unwrap_err();
        assert_eq!(errors.on(Field::Headers), vec![INVALID]);
    }

    #[test]
    fn status_must_be_a_status_code() {
        let errors = check(&valid_params().status(42)).unwrap_err();
        assert_eq!(errors.on(Field::Status), vec![INVALID_STATUS]);
    }
}
