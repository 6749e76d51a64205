//! Graph storage boundary
//!
//! The mapper never talks to a concrete database. It drives a `GraphHandle`
//! obtained from a `GraphStore`, which exposes the usual property-graph
//! primitives plus begin/commit/rollback. `InMemoryGraphStore` is the reference
//! implementation used by tests and embedded deployments.

mod memory;

pub use memory::{InMemoryGraphHandle, InMemoryGraphStore};

use crate::value_objects::{Direction, ElementId, PropertyValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for storage primitives
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a storage backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Vertex not found: {0}")]
    VertexNotFound(ElementId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(ElementId),

    #[error("Write attempted outside a transaction")]
    NoTransaction,

    #[error("Transaction already open on this handle")]
    TransactionActive,

    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Reference to a graph element together with its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementRef {
    Vertex(ElementId),
    Edge(ElementId),
}

impl ElementRef {
    pub fn id(&self) -> ElementId {
        match self {
            ElementRef::Vertex(id) | ElementRef::Edge(id) => *id,
        }
    }

    pub fn is_vertex(&self) -> bool {
        matches!(self, ElementRef::Vertex(_))
    }
}

/// Snapshot of a vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: ElementId,
    pub label: String,
    pub properties: IndexMap<String, PropertyValue>,
}

/// Snapshot of an edge; `out_vertex` is the tail, `in_vertex` the head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: ElementId,
    pub label: String,
    pub out_vertex: ElementId,
    pub in_vertex: ElementId,
    pub properties: IndexMap<String, PropertyValue>,
}

impl Edge {
    /// The endpoint opposite to `vertex`
    pub fn other_end(&self, vertex: ElementId) -> ElementId {
        if self.out_vertex == vertex {
            self.in_vertex
        } else {
            self.out_vertex
        }
    }
}

/// Factory for graph handles
pub trait GraphStore: Send + Sync {
    /// Open a new handle on the graph
    fn open(&self) -> StoreResult<Box<dyn GraphHandle>>;
}

/// A connection to the graph with transaction control
///
/// Reads outside a transaction see committed state. Writes require an open
/// transaction.
pub trait GraphHandle: Send {
    /// Open a transaction
    fn begin(&mut self) -> StoreResult<()>;

    /// Publish all writes made since `begin`
    fn commit(&mut self) -> StoreResult<()>;

    /// Discard all writes made since `begin`
    fn rollback(&mut self) -> StoreResult<()>;

    /// Create a vertex carrying `label`
    fn add_vertex(&mut self, label: &str) -> StoreResult<ElementId>;

    /// Create an edge from `out_vertex` to `in_vertex`
    fn add_edge(&mut self, label: &str, out_vertex: ElementId, in_vertex: ElementId) -> StoreResult<ElementId>;

    /// Remove a vertex and every incident edge
    fn remove_vertex(&mut self, id: ElementId) -> StoreResult<()>;

    fn remove_edge(&mut self, id: ElementId) -> StoreResult<()>;

    fn vertex(&self, id: ElementId) -> StoreResult<Option<Vertex>>;

    fn edge(&self, id: ElementId) -> StoreResult<Option<Edge>>;

    fn set_property(&mut self, element: ElementRef, key: &str, value: PropertyValue) -> StoreResult<()>;

    fn remove_property(&mut self, element: ElementRef, key: &str) -> StoreResult<()>;

    /// All vertex ids in insertion order, optionally restricted to a label
    fn vertices(&self, label: Option<&str>) -> StoreResult<Vec<ElementId>>;

    /// All edge ids in insertion order, optionally restricted to a label
    fn edges(&self, label: Option<&str>) -> StoreResult<Vec<ElementId>>;

    /// Indexed lookup of vertices whose `key` equals `value`
    fn vertices_by_property(&self, key: &str, value: &PropertyValue) -> StoreResult<Vec<ElementId>>;

    /// Indexed lookup of edges whose `key` equals `value`
    fn edges_by_property(&self, key: &str, value: &PropertyValue) -> StoreResult<Vec<ElementId>>;

    /// Edges touching `vertex` in `direction`, optionally restricted to a label
    fn incident_edges(&self, vertex: ElementId, direction: Direction, label: Option<&str>) -> StoreResult<Vec<ElementId>>;

    /// Property lookup on either element kind
    fn property(&self, element: ElementRef, key: &str) -> StoreResult<Option<PropertyValue>> {
        let properties = match element {
            ElementRef::Vertex(id) => self.vertex(id)?.map(|v| v.properties),
            ElementRef::Edge(id) => self.edge(id)?.map(|e| e.properties),
        };
        Ok(properties.and_then(|mut p| p.swap_remove(key)))
    }

    /// Label lookup on either element kind
    fn label(&self, element: ElementRef) -> StoreResult<Option<String>> {
        Ok(match element {
            ElementRef::Vertex(id) => self.vertex(id)?.map(|v| v.label),
            ElementRef::Edge(id) => self.edge(id)?.map(|e| e.label),
        })
    }
}
