use crate::common::data::{Method, MockId, RouteEntry};
use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard},
};

/// The plain (method, path) to mock lookup table. Paths are stored normalized.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<Method, HashMap<String, MockId>>,
}

impl RouteTable {
    pub fn get(&self, method: &Method, path: &str) -> Option<MockId> {
        self.routes.get(method)?.get(path).copied()
    }

    pub fn insert(&mut self, method: Method, path: String, id: MockId) -> Option<MockId> {
        self.routes.entry(method).or_default().insert(path, id)
    }

    pub fn remove(&mut self, method: &Method, path: &str) -> Option<MockId> {
        let paths = self.routes.get_mut(method)?;
        let removed = paths.remove(path);

        if paths.is_empty() {
            self.routes.remove(method);
        }

        removed
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<RouteEntry> {
        let mut entries: Vec<RouteEntry> = self
            .routes
            .iter()
            .flat_map(|(method, paths)| {
                paths.iter().map(move |(path, id)| RouteEntry {
                    request_method: *method,
                    route_path: path.clone(),
                    mock_id: *id,
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            (&a.route_path, a.request_method).cmp(&(&b.route_path, b.request_method))
        });

        entries
    }
}

/// The live routing table consulted for every inbound request.
///
/// Readers take a shared lock for the duration of a single lookup. Every mutation, including
/// moving a mock from one key to another, happens inside one exclusive critical section, so a
/// reader never observes a half applied change.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    table: RwLock<RouteTable>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps the key to the mock, overwriting any previous mapping of the same key.
    pub fn register(&self, method: Method, path: &str, id: MockId) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.insert(method, path.to_string(), id);
        tracing::debug!("Registered route {} {} for mock with id={}", method, path, id);
    }

    /// Removes the mapping. Removing a key that is not registered is not an error.
    pub fn unregister(&self, method: Method, path: &str) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        match table.remove(&method, path) {
            Some(id) => tracing::debug!("Unregistered route {} {} (mock id={})", method, path, id),
            None => tracing::trace!("Route {} {} was not registered", method, path),
        }
    }

    /// Moves a mock from its old key to a new one as a single step.
    pub fn reroute(&self, old: (Method, &str), new: (Method, &str), id: MockId) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.remove(&old.0, old.1);
        table.insert(new.0, new.1.to_string(), id);
        tracing::debug!(
            "Rerouted mock with id={} from {} {} to {} {}",
            id,
            old.0,
            old.1,
            new.0,
            new.1
        );
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Option<MockId> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method, path)
    }

    /// Replaces the whole table at once.
    pub fn rebuild<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (Method, String, MockId)>,
    {
        let mut fresh = RouteTable::default();
        for (method, path, id) in entries {
            fresh.insert(method, path, id);
        }

        let count = fresh.len();
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        tracing::debug!("Rebuilt route registry with {} routes", count);

        count
    }

    /// A read-locked view of the current table. Hold it only briefly.
    pub fn snapshot(&self) -> RwLockReadGuard<'_, RouteTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn routes(&self) -> Vec<RouteEntry> {
        self.snapshot().entries()
    }
}
