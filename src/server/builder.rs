#[cfg(feature = "static-mock")]
use crate::server::persistence::read_static_mock_definitions;
use crate::server::{
    handler::MockServerHandler,
    routes::ReservedRoutes,
    server::{MockServer, MockServerConfig},
    state::MockStateManager,
    store::{InMemoryMockStore, MockStore},
    RouteMockServer,
};
#[cfg(feature = "static-mock")]
use std::path::PathBuf;
use std::{error::Error, sync::Arc};

/// Configures and assembles a mock server: the mock store, the state manager with its route
/// registry, the request handler and the HTTP server itself.
#[derive(Default)]
pub struct MockServerBuilder {
    port: Option<u16>,
    expose: Option<bool>,
    print_access_log: Option<bool>,
    #[cfg(feature = "static-mock")]
    static_mock_dir: Option<PathBuf>,
}

impl MockServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the port to listen on. Without a port, a free one is picked by the OS.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn port_option(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Listens on all interfaces instead of localhost only.
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = Some(expose);
        self
    }

    pub fn expose_option(mut self, expose: Option<bool>) -> Self {
        self.expose = expose;
        self
    }

    /// Logs one line per handled request.
    pub fn print_access_log(mut self, enabled: bool) -> Self {
        self.print_access_log = Some(enabled);
        self
    }

    pub fn print_access_log_option(mut self, enabled: Option<bool>) -> Self {
        self.print_access_log = enabled;
        self
    }

    /// Sets a directory of YAML files whose mocks are created at startup.
    #[cfg(feature = "static-mock")]
    pub fn static_mock_dir(mut self, path: PathBuf) -> Self {
        self.static_mock_dir = Some(path);
        self
    }

    #[cfg(feature = "static-mock")]
    pub fn static_mock_dir_option(mut self, path: Option<PathBuf>) -> Self {
        self.static_mock_dir = path;
        self
    }

    /// Builds a server that keeps its mocks in memory.
    pub fn build(self) -> Result<RouteMockServer, Box<dyn Error>> {
        self.build_with_store(InMemoryMockStore::new())
    }

    /// Builds a server on top of the given store. Mocks the store already holds are routable
    /// as soon as the server starts.
    pub fn build_with_store<S>(
        self,
        store: S,
    ) -> Result<MockServer<MockServerHandler<MockStateManager<S>>>, Box<dyn Error>>
    where
        S: MockStore + Send + Sync + 'static,
    {
        let reserved = Arc::new(ReservedRoutes::new());
        let state = Arc::new(MockStateManager::with_reserved_routes(
            store,
            reserved.clone(),
        )?);

        #[cfg(feature = "static-mock")]
        if let Some(dir) = self.static_mock_dir {
            let count = read_static_mock_definitions(dir, state.as_ref())?;
            tracing::info!("Loaded {} static mocks", count);
        }

        let handler = MockServerHandler::new(
            reserved,
            state,
            self.print_access_log.unwrap_or(false),
        );

        Ok(MockServer::new(
            Box::new(handler),
            MockServerConfig {
                static_port: self.port,
                expose: self.expose.unwrap_or(false),
            },
        ))
    }
}
