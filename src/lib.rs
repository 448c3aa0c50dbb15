//! `routemock` is an HTTP mock server whose mocks are managed at runtime.
//!
//! A mock binds one (HTTP method, route path) pair to a canned response: status code, content
//! type, headers and a body. Bodies are either returned verbatim (`static`) or rendered as a
//! [Handlebars](https://handlebarsjs.com/) template against the incoming request
//! (`embedded_script`). An optional script is evaluated before the body and its output is
//! available to the body template as `script`.
//!
//! Mocks are created, changed and removed through a JSON admin API below `/__routemock__`.
//! Every mutation is validated first. Names are unique ignoring case, route paths must be valid
//! URL paths, and a (method, path) pair can neither be claimed by two mocks nor by a mock and
//! the admin API at the same time. An accepted change is routable before the admin request
//! returns.
//!
//! # Admin API
//! | Method               | Path                             | Purpose                         |
//! |----------------------|----------------------------------|---------------------------------|
//! | `GET`                | `/__routemock__/ping`            | Health check                    |
//! | `GET`                | `/__routemock__/mocks`           | List all mocks                  |
//! | `POST`               | `/__routemock__/mocks`           | Create a mock                   |
//! | `GET`                | `/__routemock__/mocks/:id`       | Read a mock                     |
//! | `PUT`                | `/__routemock__/mocks/:id`       | Replace a mock                  |
//! | `PATCH`              | `/__routemock__/mocks/:id`       | Change some attributes          |
//! | `DELETE`             | `/__routemock__/mocks/:id`       | Delete a mock and its headers   |
//! | `GET`                | `/__routemock__/routes`          | List the live route registry    |
//! | `POST`               | `/__routemock__/routes/rebuild`  | Rebuild the registry from store |
//!
//! Rejected mocks are answered with `422 Unprocessable Entity` and a list of field errors.
//!
//! # Example
//! ```rust,no_run
//! use routemock::MockServerBuilder;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = MockServerBuilder::new()
//!         .port(5050)
//!         .print_access_log(true)
//!         .build()
//!         .expect("cannot build mock server");
//!
//!     server.start().await.expect("mock server failed");
//! }
//! ```
//!
//! Mocks can also be managed in-process through [StateManager](trait.StateManager.html):
//! ```rust
//! use routemock::{InMemoryMockStore, Method, MockParams, MockStateManager, StateManager};
//!
//! let state = MockStateManager::new(InMemoryMockStore::new()).unwrap();
//! let mock = state
//!     .create_mock(
//!         MockParams::new()
//!             .name("Users")
//!             .request_method("GET")
//!             .route_path("/users/")
//!             .status(200)
//!             .content_type("application/json")
//!             .body("static", "[]"),
//!     )
//!     .unwrap();
//!
//! assert_eq!(mock.definition.route_path, "/users");
//! assert!(state.resolve(&Method::GET, "/users").unwrap().is_some());
//! ```
mod common;
mod server;

pub use common::data::{
    ActiveMock, Content, ContentKind, Error as DataError, ErrorResponse, Header, Method, MockDefinition,
    MockId, MockParams, MockRequest, RouteEntry,
};
pub use server::*;
