use crate::{
    common::data::{Method, MockId},
    server::registry::RouteTable,
};
use path_tree::{Path, PathTree};
use regex::Regex;
use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};
use thiserror::Error;

/// All routes of the admin API live below this prefix.
pub const ADMIN_PREFIX: &str = "/__routemock__";

/// Matches a path built from RFC 3986 `pchar` segments. Query and fragment are not allowed.
static VALID_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/$|^(/([A-Za-z0-9\-._~!$&'()*+,;=:@]|%[0-9A-Fa-f]{2})+)+$")
        .expect("route path pattern must compile")
});

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    #[error("is not a valid route")]
    Malformed,
    #[error("already in use")]
    ReservedCollision,
    #[error("has already been taken")]
    MockCollision(MockId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdminRoute {
    Ping,
    MockCollection,
    SingleMock,
    RouteCollection,
    RouteRebuild,
}

/// Every route the admin API answers. A mock can never claim one of these. Requests that do
/// not hit one of them are dispatched to mocks.
const ADMIN_ROUTES: &[(Method, &str, AdminRoute)] = &[
    (Method::GET, "/__routemock__/ping", AdminRoute::Ping),
    (Method::GET, "/__routemock__/mocks", AdminRoute::MockCollection),
    (Method::POST, "/__routemock__/mocks", AdminRoute::MockCollection),
    (Method::GET, "/__routemock__/mocks/:id", AdminRoute::SingleMock),
    (Method::PUT, "/__routemock__/mocks/:id", AdminRoute::SingleMock),
    (Method::PATCH, "/__routemock__/mocks/:id", AdminRoute::SingleMock),
    (Method::DELETE, "/__routemock__/mocks/:id", AdminRoute::SingleMock),
    (Method::GET, "/__routemock__/routes", AdminRoute::RouteCollection),
    (Method::POST, "/__routemock__/routes/rebuild", AdminRoute::RouteRebuild),
];

/// The reserved (method, path) table. Lookups use one path tree per method, so parameterized
/// admin routes such as `/__routemock__/mocks/:id` reserve every path they would match.
pub(crate) struct ReservedRoutes {
    trees: HashMap<Method, PathTree<AdminRoute>>,
}

impl ReservedRoutes {
    pub fn new() -> Self {
        let mut trees: HashMap<Method, PathTree<AdminRoute>> = HashMap::new();

        for (method, path, route) in ADMIN_ROUTES {
            let _ = trees
                .entry(*method)
                .or_insert_with(PathTree::new)
                .insert(path, *route);
        }

        Self { trees }
    }

    pub fn find<'a, 'b>(
        &'a self,
        method: &Method,
        path: &'b str,
    ) -> Option<(AdminRoute, Path<'a, 'b>)> {
        self.trees
            .get(method)
            .and_then(|tree| tree.find(path))
            .map(|(route, params)| (*route, params))
    }

    pub fn is_reserved(&self, method: &Method, path: &str) -> bool {
        self.find(method, path).is_some()
    }
}

impl Default for ReservedRoutes {
    fn default() -> Self {
        Self::new()
    }
}

/// Brings a route path into the form it is registered and looked up with: surrounding
/// whitespace removed, a leading slash added and trailing slashes stripped. Case is kept.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().trim_end_matches('/');

    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Decides whether a (method, path) pair may be registered for a mock.
pub(crate) struct RouteValidator {
    reserved: Arc<ReservedRoutes>,
}

impl RouteValidator {
    pub fn new(reserved: Arc<ReservedRoutes>) -> Self {
        Self { reserved }
    }

    /// The syntax check alone, which needs no method. Returns the normalized path.
    pub fn check_syntax(path: &str) -> Result<String, RouteError> {
        let path = normalize_path(path);

        if !VALID_PATH.is_match(&path) {
            return Err(RouteError::Malformed);
        }

        Ok(path)
    }

    /// Checks syntax, then the reserved admin routes, then the routes of other mocks. The
    /// first failing check wins. A mock never collides with its own registration, so `id`
    /// must be set when an existing mock is validated for an update.
    ///
    /// Returns the normalized path on success.
    pub fn validate(
        &self,
        method: Method,
        path: &str,
        id: Option<MockId>,
        routes: &RouteTable,
    ) -> Result<String, RouteError> {
        let path = Self::check_syntax(path)?;

        if self.reserved.is_reserved(&method, &path) {
            return Err(RouteError::ReservedCollision);
        }

        match routes.get(&method, &path) {
            Some(owner) if Some(owner) != id => Err(RouteError::MockCollision(owner)),
            _ => Ok(path),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn validator() -> RouteValidator {
        RouteValidator::new(Arc::new(ReservedRoutes::new()))
    }

    #[test]
    fn normalize_path_test() {
        assert_eq!(normalize_path("/users/"), "/users");
        assert_eq!(normalize_path("users"), "/users");
        assert_eq!(normalize_path("  /Users//  "), "/Users");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let routes = RouteTable::default();
        let v = validator();

        for path in ["httpgih[]com", "/a b", "/users?id=1", "/x#top", "/a//b", "/bad%zz"] {
            assert_eq!(
                v.validate(Method::GET, path, None, &routes),
                Err(RouteError::Malformed),
                "{}",
                path
            );
        }
    }

    #[test]
    fn valid_paths_are_normalized() {
        let routes = RouteTable::default();
        let v = validator();

        assert_eq!(
            v.validate(Method::GET, "api/v1/users/", None, &routes),
            Ok("/api/v1/users".to_string())
        );
        assert_eq!(
            v.validate(Method::GET, "/files/%7Bid%7D;v=1", None, &routes),
            Ok("/files/%7Bid%7D;v=1".to_string())
        );
        assert_eq!(
            v.validate(Method::GET, "/", None, &routes),
            Ok("/".to_string())
        );
    }

    #[test]
    fn reserved_admin_routes_are_rejected() {
        let routes = RouteTable::default();
        let v = validator();

        assert_eq!(
            v.validate(Method::GET, "/__routemock__/mocks", None, &routes),
            Err(RouteError::ReservedCollision)
        );
        assert_eq!(
            v.validate(Method::DELETE, "/__routemock__/mocks/42/", None, &routes),
            Err(RouteError::ReservedCollision)
        );
        assert_eq!(
            v.validate(Method::POST, "/__routemock__/routes/rebuild", None, &routes),
            Err(RouteError::ReservedCollision)
        );
    }

    #[test]
    fn admin_paths_with_unreserved_methods_are_free() {
        let routes = RouteTable::default();
        let v = validator();

        assert!(v
            .validate(Method::POST, "/__routemock__/mocks/42", None, &routes)
            .is_ok());
        assert!(v
            .validate(Method::DELETE, "/__routemock__/ping", None, &routes)
            .is_ok());
        assert!(v
            .validate(Method::GET, "/__routemock__/mocks/42/headers", None, &routes)
            .is_ok());
    }

    #[test]
    fn registered_routes_collide_except_with_themselves() {
        let mut routes = RouteTable::default();
        routes.insert(Method::GET, "/users".to_string(), 1);
        let v = validator();

        assert_eq!(
            v.validate(Method::GET, "/users/", None, &routes),
            Err(RouteError::MockCollision(1))
        );
        assert_eq!(
            v.validate(Method::GET, "/users", Some(2), &routes),
            Err(RouteError::MockCollision(1))
        );
        assert_eq!(
            v.validate(Method::GET, "/users", Some(1), &routes),
            Ok("/users".to_string())
        );
        assert!(v.validate(Method::POST, "/users", None, &routes).is_ok());
        assert!(v.validate(Method::GET, "/Users", None, &routes).is_ok());
    }

    #[test]
    fn syntax_is_checked_before_reservation() {
        let routes = RouteTable::default();

        assert_eq!(
            validator().validate(Method::GET, "/__routemock__/mocks/[1]", None, &routes),
            Err(RouteError::Malformed)
        );
    }
}
