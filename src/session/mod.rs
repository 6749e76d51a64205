//! Transaction boundary around a graph handle
//!
//! A `GraphSession` is one unit of work: begin, a batch of mutations and
//! traversals, then commit or rollback. The model is flat; a session never
//! nests transactions. Sessions take `&mut self` everywhere so one session
//! cannot serve two operations at the same time.

mod identity_map;

pub use identity_map::IdentityMap;

use crate::errors::{OgmResult, TransactionError};
use crate::store::{GraphHandle, GraphStore, StoreError};
use tracing::{debug, warn};
use uuid::Uuid;

/// One unit of work against the graph
pub struct GraphSession {
    id: Uuid,
    handle: Box<dyn GraphHandle>,
    active: bool,
    identity_map: IdentityMap,
}

impl GraphSession {
    /// Open a session on a fresh handle from `store`
    pub fn open(store: &dyn GraphStore) -> Result<Self, TransactionError> {
        let handle = store.open().map_err(|source| TransactionError::Store {
            operation: "open",
            source,
        })?;
        Ok(Self::with_handle(handle))
    }

    /// Wrap an already opened handle
    pub fn with_handle(handle: Box<dyn GraphHandle>) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "graph session opened");
        Self {
            id,
            handle,
            active: false,
            identity_map: IdentityMap::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn begin(&mut self) -> Result<(), TransactionError> {
        if self.active {
            return Err(TransactionError::TransactionAlreadyActive);
        }
        self.handle.begin().map_err(|source| store_failure("begin", source))?;
        self.active = true;
        self.identity_map.clear();
        debug!(session = %self.id, "transaction started");
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), TransactionError> {
        if !self.active {
            return Err(TransactionError::NoActiveTransaction);
        }
        // the transaction is over whether or not the store accepted it
        self.active = false;
        self.identity_map.clear();
        self.handle.commit().map_err(|source| store_failure("commit", source))?;
        debug!(session = %self.id, "transaction committed");
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), TransactionError> {
        if !self.active {
            return Err(TransactionError::NoActiveTransaction);
        }
        self.active = false;
        self.identity_map.clear();
        self.handle.rollback().map_err(|source| store_failure("rollback", source))?;
        debug!(session = %self.id, "transaction rolled back");
        Ok(())
    }

    /// Run `work` inside a transaction: commit on success, roll back on error
    pub fn transaction<T>(&mut self, work: impl FnOnce(&mut GraphSession) -> OgmResult<T>) -> OgmResult<T> {
        self.begin()?;
        match work(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(error) => {
                if self.active {
                    if let Err(rollback_error) = self.rollback() {
                        warn!(session = %self.id, %rollback_error, "rollback after failed unit of work also failed");
                    }
                }
                Err(error)
            }
        }
    }

    /// Read access to the graph; requires an open transaction
    pub fn graph(&self) -> Result<&dyn GraphHandle, TransactionError> {
        if !self.active {
            return Err(TransactionError::NoActiveTransaction);
        }
        Ok(&*self.handle)
    }

    /// Write access to the graph; requires an open transaction
    pub fn graph_mut(&mut self) -> Result<&mut dyn GraphHandle, TransactionError> {
        if !self.active {
            return Err(TransactionError::NoActiveTransaction);
        }
        Ok(&mut *self.handle)
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity_map
    }

    pub fn identity_map_mut(&mut self) -> &mut IdentityMap {
        &mut self.identity_map
    }
}

impl Drop for GraphSession {
    fn drop(&mut self) {
        if self.active {
            warn!(session = %self.id, "session dropped with an open transaction, rolling back");
            if let Err(error) = self.handle.rollback() {
                warn!(session = %self.id, %error, "implicit rollback failed");
            }
        }
    }
}

fn store_failure(operation: &'static str, source: StoreError) -> TransactionError {
    TransactionError::Store { operation, source }
}
