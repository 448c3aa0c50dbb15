use crate::common::data::{ActiveMock, Header, MockDefinition, MockId};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("mock with id {0} not found")]
    NotFound(MockId),
}

/// The durable home of mock definitions. The route registry is rebuilt from `all` at startup,
/// so everything a store returns from there must have passed validation before.
pub trait MockStore {
    fn create(&self, definition: MockDefinition) -> Result<ActiveMock, Error>;
    fn find(&self, id: MockId) -> Result<Option<ActiveMock>, Error>;
    fn all(&self) -> Result<Vec<ActiveMock>, Error>;
    fn update(&self, id: MockId, definition: MockDefinition) -> Result<ActiveMock, Error>;
    /// Deletes the mock together with all of its headers.
    fn delete(&self, id: MockId) -> Result<Option<ActiveMock>, Error>;
    /// Returns true if a mock other than `except` already uses this name, ignoring case.
    fn name_taken(&self, name: &str, except: Option<MockId>) -> Result<bool, Error>;
    fn header_count(&self, id: MockId) -> Result<usize, Error>;
}

struct MockRow {
    definition: MockDefinition,
    normalized_name: String,
}

struct HeaderRow {
    mock_id: MockId,
    header: Header,
}

#[derive(Default)]
struct Tables {
    next_mock_id: MockId,
    next_header_id: u64,
    mocks: BTreeMap<MockId, MockRow>,
    headers: BTreeMap<u64, HeaderRow>,
}

impl Tables {
    fn insert_headers(&mut self, mock_id: MockId, headers: Vec<Header>) {
        for header in headers {
            let header_id = self.next_header_id;
            self.next_header_id += 1;
            self.headers.insert(header_id, HeaderRow { mock_id, header });
        }
    }

    fn delete_headers(&mut self, mock_id: MockId) -> Vec<Header> {
        let ids: Vec<u64> = self
            .headers
            .iter()
            .filter(|(_, row)| row.mock_id == mock_id)
            .map(|(id, _)| *id)
            .collect();

        ids.iter()
            .filter_map(|id| self.headers.remove(id))
            .map(|row| row.header)
            .collect()
    }

    fn headers_of(&self, mock_id: MockId) -> Vec<Header> {
        self.headers
            .values()
            .filter(|row| row.mock_id == mock_id)
            .map(|row| row.header.clone())
            .collect()
    }

    fn load(&self, id: MockId) -> Option<ActiveMock> {
        self.mocks.get(&id).map(|row| {
            let mut definition = row.definition.clone();
            definition.headers = self.headers_of(id);
            ActiveMock::new(id, definition)
        })
    }
}

fn split_headers(mut definition: MockDefinition) -> (MockRow, Vec<Header>) {
    let headers = std::mem::take(&mut definition.headers);
    let row = MockRow {
        normalized_name: definition.name.to_lowercase(),
        definition,
    };
    (row, headers)
}

/// A mock store that keeps mocks and their headers in two in-memory tables, related by the
/// owning mock id. Headers are kept in insertion order.
#[derive(Default)]
pub struct InMemoryMockStore {
    tables: Mutex<Tables>,
}

impl InMemoryMockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of header rows over all mocks.
    pub fn total_header_count(&self) -> usize {
        self.lock().headers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // Every mutation leaves the tables consistent before it can panic.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MockStore for InMemoryMockStore {
    fn create(&self, definition: MockDefinition) -> Result<ActiveMock, Error> {
        let mut tables = self.lock();

        let id = tables.next_mock_id;
        tables.next_mock_id += 1;

        let (row, headers) = split_headers(definition);
        tables.mocks.insert(id, row);
        tables.insert_headers(id, headers);

        tables.load(id).ok_or(Error::NotFound(id))
    }

    fn find(&self, id: MockId) -> Result<Option<ActiveMock>, Error> {
        Ok(self.lock().load(id))
    }

    fn all(&self) -> Result<Vec<ActiveMock>, Error> {
        let tables = self.lock();
        Ok(tables.mocks.keys().filter_map(|id| tables.load(*id)).collect())
    }

    fn update(&self, id: MockId, definition: MockDefinition) -> Result<ActiveMock, Error> {
        let mut tables = self.lock();

        if !tables.mocks.contains_key(&id) {
            return Err(Error::NotFound(id));
        }

        let (row, headers) = split_headers(definition);
        tables.mocks.insert(id, row);
        tables.delete_headers(id);
        tables.insert_headers(id, headers);

        tables.load(id).ok_or(Error::NotFound(id))
    }

    fn delete(&self, id: MockId) -> Result<Option<ActiveMock>, Error> {
        let mut tables = self.lock();

        let row = match tables.mocks.remove(&id) {
            Some(row) => row,
            None => return Ok(None),
        };

        let mut definition = row.definition;
        definition.headers = tables.delete_headers(id);

        Ok(Some(ActiveMock::new(id, definition)))
    }

    fn name_taken(&self, name: &str, except: Option<MockId>) -> Result<bool, Error> {
        let normalized = name.to_lowercase();
        Ok(self
            .lock()
            .mocks
            .iter()
            .any(|(id, row)| Some(*id) != except && row.normalized_name == normalized))
    }

    fn header_count(&self, id: MockId) -> Result<usize, Error> {
        Ok(self
            .lock()
            .headers
            .values()
            .filter(|row| row.mock_id == id)
            .count())
    }
}
