use crate::{
    common::data::{Error as DataError, ErrorResponse, Method, MockId, MockParams, MockRequest},
    server::{
        handler::Error::{
            ParamError, ParamFormatError, RequestBodyDeserializeError, RequestBodyError,
            RequestConversionError, ResponseBodyConversionError, ResponseBodySerializeError,
        },
        resolver::ResponseResolver,
        routes::{normalize_path, AdminRoute, ReservedRoutes},
        state,
        state::StateManager,
        validation::{Field, ValidationErrors},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use path_tree::Path;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    fmt::{Debug, Display},
    str::FromStr,
    sync::Arc,
    time::Instant,
};
use thiserror::Error;

const NO_MATCH: &str = "Request did not match any route or mock";

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot deserialize request body: {0}")]
    RequestBodyDeserializeError(serde_json::Error),
    #[error("cannot process request body: {0}")]
    RequestBodyError(String),
    #[error("cannot serialize response body: {0}")]
    ResponseBodySerializeError(serde_json::Error),
    #[error("cannot convert response body: {0}")]
    ResponseBodyConversionError(http::Error),
    #[error("expected URL parameters not found")]
    ParamError,
    #[error("URL parameter format is invalid: {0}")]
    ParamFormatError(String),
    #[error("cannot modify state: {0}")]
    StateManagerError(#[from] state::Error),
    #[error("cannot convert request to internal data structure: {0}")]
    RequestConversionError(String),
}

#[async_trait]
pub(crate) trait Handler {
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

#[derive(Serialize)]
struct FieldErrorResponse {
    field: Field,
    message: String,
    full_message: String,
}

#[derive(Serialize)]
struct ValidationErrorResponse {
    errors: Vec<FieldErrorResponse>,
}

impl From<&ValidationErrors> for ValidationErrorResponse {
    fn from(value: &ValidationErrors) -> Self {
        Self {
            errors: value
                .errors()
                .iter()
                .map(|e| FieldErrorResponse {
                    field: e.field,
                    message: e.message.clone(),
                    full_message: e.full_message(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct RebuildResponse {
    routes: usize,
}

/// Answers the admin API below the reserved prefix and dispatches every other request to the
/// mock registered for its (method, path) pair.
pub struct MockServerHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    reserved: Arc<ReservedRoutes>,
    state: Arc<S>,
    resolver: ResponseResolver,
    print_access_log: bool,
}

#[async_trait]
impl<S> Handler for MockServerHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        tracing::trace!("Routing incoming request: {:?}", req);

        let start = Instant::now();
        let method = req.method().clone();
        let uri = req.uri().clone();

        let result = self.dispatch(req);

        if self.print_access_log {
            match &result {
                Ok(res) => tracing::info!(
                    "{} {} {} {:?}",
                    method,
                    uri,
                    res.status().as_u16(),
                    start.elapsed()
                ),
                Err(err) => tracing::info!("{} {} failed: {}", method, uri, err),
            }
        }

        result
    }
}

impl<S> MockServerHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    pub(crate) fn new(reserved: Arc<ReservedRoutes>, state: Arc<S>, print_access_log: bool) -> Self {
        Self {
            reserved,
            state,
            resolver: ResponseResolver::new(),
            print_access_log,
        }
    }

    fn dispatch(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let path = normalize_path(req.uri().path());

        let method = match Method::try_from(req.method()) {
            Ok(method) => method,
            Err(_) => return response(StatusCode::NOT_FOUND, Some(ErrorResponse::new(&NO_MATCH))),
        };

        if let Some((route, params)) = self.reserved.find(&method, &path) {
            let result = match (route, method) {
                (AdminRoute::Ping, _) => self.handle_ping(),
                (AdminRoute::MockCollection, Method::POST) => self.handle_create_mock(req),
                (AdminRoute::MockCollection, _) => self.handle_list_mocks(),
                (AdminRoute::SingleMock, Method::PUT) => self.handle_update_mock(params, req, false),
                (AdminRoute::SingleMock, Method::PATCH) => self.handle_update_mock(params, req, true),
                (AdminRoute::SingleMock, Method::DELETE) => self.handle_delete_mock(params),
                (AdminRoute::SingleMock, _) => self.handle_read_mock(params),
                (AdminRoute::RouteCollection, _) => self.handle_list_routes(),
                (AdminRoute::RouteRebuild, _) => self.handle_rebuild_routes(),
            };

            return result.or_else(admin_error_response);
        }

        self.serve_mock(method, &path, &req)
    }

    fn handle_ping(&self) -> Result<Response<Bytes>, Error> {
        response::<()>(StatusCode::OK, None)
    }

    fn handle_list_mocks(&self) -> Result<Response<Bytes>, Error> {
        let mocks = self.state.list_mocks()?;
        response(StatusCode::OK, Some(mocks))
    }

    fn handle_create_mock(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let params: MockParams = parse_json_body(req)?;
        let active_mock = self.state.create_mock(params)?;
        response(StatusCode::CREATED, Some(active_mock))
    }

    fn handle_read_mock(&self, params: Path) -> Result<Response<Bytes>, Error> {
        let id: MockId = param("id", params)?;
        let active_mock = self
            .state
            .read_mock(id)?
            .ok_or(state::Error::MockNotFound(id))?;
        response(StatusCode::OK, Some(active_mock))
    }

    /// PUT replaces all attributes. PATCH applies the submitted attributes on top of the
    /// stored ones and validates the result as a whole.
    fn handle_update_mock(
        &self,
        params: Path,
        req: Request<Bytes>,
        merge: bool,
    ) -> Result<Response<Bytes>, Error> {
        let id: MockId = param("id", params)?;

        let update: MockParams = if merge {
            let existing = self
                .state
                .read_mock(id)?
                .ok_or(state::Error::MockNotFound(id))?;
            let mut merged = serde_json::to_value(MockParams::from(&existing.definition))
                .map_err(ResponseBodySerializeError)?;
            merge_attributes(&mut merged, parse_json_body(req)?)?;
            serde_json::from_value(merged).map_err(RequestBodyDeserializeError)?
        } else {
            parse_json_body(req)?
        };

        let active_mock = self.state.update_mock(id, update)?;
        response(StatusCode::OK, Some(active_mock))
    }

    fn handle_delete_mock(&self, params: Path) -> Result<Response<Bytes>, Error> {
        let id: MockId = param("id", params)?;
        if !self.state.delete_mock(id)? {
            return Err(state::Error::MockNotFound(id).into());
        }
        response::<()>(StatusCode::NO_CONTENT, None)
    }

    fn handle_list_routes(&self) -> Result<Response<Bytes>, Error> {
        response(StatusCode::OK, Some(self.state.routes()))
    }

    fn handle_rebuild_routes(&self) -> Result<Response<Bytes>, Error> {
        let routes = self.state.rebuild_registry()?;
        response(StatusCode::OK, Some(RebuildResponse { routes }))
    }

    fn serve_mock(
        &self,
        method: Method,
        path: &str,
        req: &Request<Bytes>,
    ) -> Result<Response<Bytes>, Error> {
        let mock = match self.state.resolve(&method, path)? {
            Some(mock) => mock,
            None => return response(StatusCode::NOT_FOUND, Some(ErrorResponse::new(&NO_MATCH))),
        };

        let mock_request = MockRequest::try_from(req)
            .map_err(|err: DataError| RequestConversionError(err.to_string()))?;

        match self
            .resolver
            .resolve(&mock, &mock_request)
            .and_then(|mock_response| mock_response.to_http())
        {
            Ok(res) => Ok(res),
            Err(err) => {
                tracing::error!("{}", err);
                response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some(ErrorResponse::new(&err)),
                )
            }
        }
    }
}

/// Turns the errors an admin client can cause into their status codes. Everything else is a
/// server error and is passed on.
fn admin_error_response(err: Error) -> Result<Response<Bytes>, Error> {
    match err {
        Error::StateManagerError(state::Error::ValidationError(errors)) => response(
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(ValidationErrorResponse::from(&errors)),
        ),
        Error::StateManagerError(state::Error::MockNotFound(id)) => response(
            StatusCode::NOT_FOUND,
            Some(ErrorResponse::new(&format!("No mock with id {} found", id))),
        ),
        ParamFormatError(_) => response(
            StatusCode::NOT_FOUND,
            Some(ErrorResponse::new(&"No mock with this id found")),
        ),
        err @ (RequestBodyDeserializeError(_) | RequestBodyError(_)) => {
            response(StatusCode::BAD_REQUEST, Some(ErrorResponse::new(&err)))
        }
        other => Err(other),
    }
}

fn merge_attributes(target: &mut Value, changes: Value) -> Result<(), Error> {
    let changes = match changes {
        Value::Object(changes) => changes,
        other => {
            return Err(RequestBodyError(format!(
                "expected a JSON object, got {}",
                other
            )))
        }
    };

    if let Value::Object(target) = target {
        for (key, value) in changes {
            target.insert(key, value);
        }
    }

    Ok(())
}

fn param<T>(name: &str, tree_path: Path) -> Result<T, Error>
where
    T: FromStr,
    T::Err: Debug + Display,
{
    for (n, v) in tree_path.params() {
        if n.eq(name) {
            let parse_result: Result<T, T::Err> = v.parse::<T>();
            let parsed_value = parse_result.map_err(|e| ParamFormatError(format!("{:?}", e)))?;
            return Ok(parsed_value);
        }
    }

    Err(ParamError)
}

fn response<T>(status: StatusCode, body: Option<T>) -> Result<Response<Bytes>, Error>
where
    T: Serialize,
{
    let mut builder = Response::builder().status(status);

    if let Some(body_obj) = body {
        builder = builder.header("content-type", "application/json");

        let body_bytes = serde_json::to_vec(&body_obj).map_err(ResponseBodySerializeError)?;

        return builder
            .body(Bytes::from(body_bytes))
            .map_err(ResponseBodyConversionError);
    }

    builder
        .body(Bytes::new())
        .map_err(ResponseBodyConversionError)
}

fn parse_json_body<T>(req: Request<Bytes>) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(req.body().as_ref()).map_err(RequestBodyDeserializeError)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::server::{state::MockStateManager, store::InMemoryMockStore};
    use serde_json::json;

    fn handler() -> MockServerHandler<MockStateManager<InMemoryMockStore>> {
        let reserved = Arc::new(ReservedRoutes::new());
        let state = MockStateManager::with_reserved_routes(InMemoryMockStore::new(), reserved.clone())
            .unwrap();
        MockServerHandler::new(reserved, Arc::new(state), false)
    }

    fn request(method: &str, uri: &str, body: Value) -> Request<Bytes> {
        let body = if body.is_null() {
            Bytes::new()
        } else {
            Bytes::from(body.to_string())
        };
        Request::builder().method(method).uri(uri).body(body).unwrap()
    }

    fn json_body(res: &Response<Bytes>) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    fn users_mock() -> Value {
        json!({
            "name": "Users",
            "request_method": "GET",
            "route_path": "/users",
            "status": 200,
            "content_type": "application/json",
            "body_type": "static",
            "body_content": "[]"
        })
    }

    #[tokio::test]
    async fn create_then_serve() {
        let h = handler();

        let created = h
            .handle(request("POST", "/__routemock__/mocks", users_mock()))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert_eq!(json_body(&created)["route_path"], "/users");

        let served = h.handle(request("GET", "/users/", Value::Null)).await.unwrap();
        assert_eq!(served.status(), StatusCode::OK);
        assert_eq!(served.body().as_ref(), b"[]");
        assert_eq!(served.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let res = handler()
            .handle(request("GET", "/nothing", Value::Null))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(&res)["message"], NO_MATCH);
    }

    #[tokio::test]
    async fn validation_errors_are_unprocessable() {
        let h = handler();
        let mut mock = users_mock();
        mock["route_path"] = json!("/__routemock__/mocks");

        let res = h
            .handle(request("POST", "/__routemock__/mocks", mock))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(&res);
        assert_eq!(body["errors"][0]["field"], "route_path");
        assert_eq!(body["errors"][0]["message"], "already in use");
        assert_eq!(body["errors"][0]["full_message"], "Route path already in use");
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let req = Request::builder()
            .method("POST")
            .uri("/__routemock__/mocks")
            .body(Bytes::from_static(b"{not json"))
            .unwrap();

        let res = handler().handle(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_or_malformed_ids_are_not_found() {
        let h = handler();

        for (method, uri) in [
            ("GET", "/__routemock__/mocks/77"),
            ("DELETE", "/__routemock__/mocks/77"),
            ("GET", "/__routemock__/mocks/abc"),
        ] {
            let res = h.handle(request(method, uri, Value::Null)).await.unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn patch_keeps_attributes_that_are_not_submitted() {
        let h = handler();
        let created = h
            .handle(request("POST", "/__routemock__/mocks", users_mock()))
            .await
            .unwrap();
        let id = json_body(&created)["id"].as_u64().unwrap();

        let patched = h
            .handle(request(
                "PATCH",
                &format!("/__routemock__/mocks/{}", id),
                json!({"status": 202}),
            ))
            .await
            .unwrap();

        assert_eq!(patched.status(), StatusCode::OK);
        let body = json_body(&patched);
        assert_eq!(body["status"], 202);
        assert_eq!(body["name"], "Users");
        assert_eq!(body["body_content"], "[]");

        let replaced = h
            .handle(request(
                "PUT",
                &format!("/__routemock__/mocks/{}", id),
                json!({"status": 202}),
            ))
            .await
            .unwrap();
        assert_eq!(replaced.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn render_errors_are_server_errors() {
        let h = handler();
        let mut mock = users_mock();
        mock["body_type"] = json!("embedded_script");
        mock["body_content"] = json!("{{#if request.method}}");
        h.handle(request("POST", "/__routemock__/mocks", mock))
            .await
            .unwrap();

        let res = h.handle(request("GET", "/users", Value::Null)).await.unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(&res)["message"].as_str().unwrap().contains("id=0"));
    }

    #[tokio::test]
    async fn rebuild_reports_route_count() {
        let h = handler();
        h.handle(request("POST", "/__routemock__/mocks", users_mock()))
            .await
            .unwrap();

        let res = h
            .handle(request("POST", "/__routemock__/routes/rebuild", Value::Null))
            .await
            .unwrap();
        assert_eq!(json_body(&res), json!({"routes": 1}));

        let routes = h
            .handle(request("GET", "/__routemock__/routes", Value::Null))
            .await
            .unwrap();
        assert_eq!(
            json_body(&routes),
            json!([{"request_method": "GET", "route_path": "/users", "mock_id": 0}])
        );
    }
}
