mod builder;
mod handler;
#[cfg(feature = "static-mock")]
mod persistence;
mod registry;
mod resolver;
mod routes;
mod server;
mod state;
mod store;
mod validation;

pub use builder::MockServerBuilder;
pub use handler::{Error as HandlerError, MockServerHandler};
#[cfg(feature = "static-mock")]
pub use persistence::{
    deserialize_mock_params_from_yaml, read_static_mock_definitions, Error as PersistenceError,
};
pub use registry::{RouteRegistry, RouteTable};
pub use resolver::{MockResponse, RenderError, ResponseResolver};
pub use routes::{normalize_path, RouteError, ADMIN_PREFIX};
pub use server::{Error as ServerError, MockServer, MockServerConfig};
pub use state::{Error as StateError, MockStateManager, StateManager};
pub use store::{Error as StoreError, InMemoryMockStore, MockStore};
pub use validation::{Field, FieldError, ValidationErrors};

/// A mock server that keeps its mocks in memory.
pub type RouteMockServer = MockServer<MockServerHandler<MockStateManager<InMemoryMockStore>>>;
