use crate::{
    common::data::{ActiveMock, Method, MockDefinition, MockId, MockParams, RouteEntry},
    server::{
        registry::RouteRegistry,
        routes::{ReservedRoutes, RouteValidator},
        state::Error::{MockNotFound, StoreError},
        store,
        store::MockStore,
        validation::{present, validate_mock, ValidationContext, ValidationErrors},
    },
};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("mock with id {0} not found")]
    MockNotFound(MockId),
    #[error("cannot access mock store: {0}")]
    StoreError(#[from] store::Error),
}

/// The administrative and request-time operations on mocks.
///
/// Every successful create, update or delete has updated the route registry before it
/// returns. A mock that fails validation is neither stored nor registered.
pub trait StateManager {
    fn create_mock(&self, params: MockParams) -> Result<ActiveMock, Error>;
    fn read_mock(&self, id: MockId) -> Result<Option<ActiveMock>, Error>;
    fn list_mocks(&self) -> Result<Vec<ActiveMock>, Error>;
    fn update_mock(&self, id: MockId, params: MockParams) -> Result<ActiveMock, Error>;
    fn delete_mock(&self, id: MockId) -> Result<bool, Error>;

    /// Finds the mock registered for the (method, normalized path) pair.
    fn resolve(&self, method: &Method, path: &str) -> Result<Option<ActiveMock>, Error>;
    fn routes(&self) -> Vec<RouteEntry>;

    /// Throws away the route registry and fills it from the mock store again.
    fn rebuild_registry(&self) -> Result<usize, Error>;
}

pub struct MockStateManager<S>
where
    S: MockStore + Send + Sync + 'static,
{
    store: S,
    registry: RouteRegistry,
    validator: RouteValidator,
    // Serializes validate, persist and register of concurrent admin operations.
    admin_lock: Mutex<()>,
}

impl<S> MockStateManager<S>
where
    S: MockStore + Send + Sync + 'static,
{
    /// Creates a state manager on top of a store that may already hold mocks. The route
    /// registry is built from the store contents.
    pub fn new(store: S) -> Result<Self, Error> {
        Self::with_reserved_routes(store, Arc::new(ReservedRoutes::new()))
    }

    pub(crate) fn with_reserved_routes(
        store: S,
        reserved: Arc<ReservedRoutes>,
    ) -> Result<Self, Error> {
        let manager = Self {
            store,
            registry: RouteRegistry::new(),
            validator: RouteValidator::new(reserved),
            admin_lock: Mutex::new(()),
        };

        manager.rebuild_registry()?;

        Ok(manager)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    fn validate(&self, params: &MockParams, id: Option<MockId>) -> Result<MockDefinition, Error> {
        let name_taken = match present(&params.name) {
            Some(name) => self.store.name_taken(name.trim(), id)?,
            None => false,
        };

        let routes = self.registry.snapshot();
        let ctx = ValidationContext {
            id,
            name_taken,
            routes: &*routes,
            validator: &self.validator,
        };

        Ok(validate_mock(params, &ctx)?)
    }
}

impl<S> StateManager for MockStateManager<S>
where
    S: MockStore + Send + Sync + 'static,
{
    fn create_mock(&self, params: MockParams) -> Result<ActiveMock, Error> {
        let _guard = self.admin_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let definition = self.validate(&params, None)?;
        let mock = self.store.create(definition)?;

        self.registry.register(
            mock.definition.request_method,
            &mock.definition.route_path,
            mock.id,
        );

        tracing::debug!("Created mock '{}' with id={}", mock.definition.name, mock.id);

        Ok(mock)
    }

    fn read_mock(&self, id: MockId) -> Result<Option<ActiveMock>, Error> {
        Ok(self.store.find(id)?)
    }

    fn list_mocks(&self) -> Result<Vec<ActiveMock>, Error> {
        Ok(self.store.all()?)
    }

    fn update_mock(&self, id: MockId, params: MockParams) -> Result<ActiveMock, Error> {
        let _guard = self.admin_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = self.store.find(id)?.ok_or(MockNotFound(id))?;
        let definition = self.validate(&params, Some(id))?;
        let mock = self.store.update(id, definition)?;

        let old = &existing.definition;
        let new = &mock.definition;
        if old.request_method == new.request_method && old.route_path == new.route_path {
            self.registry
                .register(new.request_method, &new.route_path, id);
        } else {
            self.registry.reroute(
                (old.request_method, &old.route_path),
                (new.request_method, &new.route_path),
                id,
            );
        }

        tracing::debug!("Updated mock with id={}", id);

        Ok(mock)
    }

    fn delete_mock(&self, id: MockId) -> Result<bool, Error> {
        let _guard = self.admin_lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self.store.delete(id)? {
            Some(mock) => {
                self.registry
                    .unregister(mock.definition.request_method, &mock.definition.route_path);
                tracing::debug!("Deleted mock with id={}", id);
                Ok(true)
            }
            None => {
                tracing::warn!(
                    "Could not delete mock with id={} (no mock with that id found)",
                    id
                );
                Ok(false)
            }
        }
    }

    fn resolve(&self, method: &Method, path: &str) -> Result<Option<ActiveMock>, Error> {
        let id = match self.registry.resolve(method, path) {
            Some(id) => id,
            None => return Ok(None),
        };

        let mock = self.store.find(id)?;
        if mock.is_none() {
            tracing::warn!(
                "Route {} {} points to mock id={} which is not stored anymore",
                method,
                path,
                id
            );
        }

        Ok(mock)
    }

    fn routes(&self) -> Vec<RouteEntry> {
        self.registry.routes()
    }

    fn rebuild_registry(&self) -> Result<usize, Error> {
        // A mock created between reading the store and swapping the table would be lost.
        let _guard = self.admin_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mocks = self.store.all().map_err(StoreError)?;
        let count = self.registry.rebuild(mocks.into_iter().map(|mock| {
            (
                mock.definition.request_method,
                mock.definition.route_path,
                mock.id,
            )
        }));

        tracing::info!("Route registry contains {} mock routes", count);

        Ok(count)
    }
}
