//! In-memory property graph backed by petgraph
//!
//! Committed state lives behind a shared lock. Each handle copies it on
//! `begin`, works on the private copy and publishes it on `commit`.

use super::{Edge, ElementRef, GraphHandle, GraphStore, StoreError, StoreResult, Vertex};
use crate::value_objects::{Direction, ElementId, PropertyValue};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct VertexData {
    id: ElementId,
    label: String,
    properties: IndexMap<String, PropertyValue>,
}

#[derive(Debug, Clone)]
struct EdgeData {
    id: ElementId,
    label: String,
    properties: IndexMap<String, PropertyValue>,
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    graph: StableDiGraph<VertexData, EdgeData>,
    vertices: IndexMap<ElementId, NodeIndex>,
    edges: IndexMap<ElementId, EdgeIndex>,
    /// Property key -> elements carrying it
    key_index: HashMap<String, IndexSet<ElementId>>,
}

impl GraphState {
    fn node(&self, id: ElementId) -> StoreResult<NodeIndex> {
        self.vertices.get(&id).copied().ok_or(StoreError::VertexNotFound(id))
    }

    fn edge_index(&self, id: ElementId) -> StoreResult<EdgeIndex> {
        self.edges.get(&id).copied().ok_or(StoreError::EdgeNotFound(id))
    }

    fn unindex(&mut self, id: ElementId, keys: impl IntoIterator<Item = String>) {
        for key in keys {
            if let Some(ids) = self.key_index.get_mut(&key) {
                ids.shift_remove(&id);
            }
        }
    }

    fn vertex_snapshot(&self, id: ElementId) -> Option<Vertex> {
        let index = self.vertices.get(&id)?;
        let data = self.graph.node_weight(*index)?;
        Some(Vertex {
            id: data.id,
            label: data.label.clone(),
            properties: data.properties.clone(),
        })
    }

    fn edge_snapshot(&self, id: ElementId) -> Option<Edge> {
        let index = self.edges.get(&id)?;
        let data = self.graph.edge_weight(*index)?;
        let (tail, head) = self.graph.edge_endpoints(*index)?;
        Some(Edge {
            id: data.id,
            label: data.label.clone(),
            out_vertex: self.graph.node_weight(tail)?.id,
            in_vertex: self.graph.node_weight(head)?.id,
            properties: data.properties.clone(),
        })
    }

    fn properties_mut(&mut self, element: ElementRef) -> StoreResult<&mut IndexMap<String, PropertyValue>> {
        match element {
            ElementRef::Vertex(id) => {
                let index = self.node(id)?;
                self.graph
                    .node_weight_mut(index)
                    .map(|v| &mut v.properties)
                    .ok_or(StoreError::VertexNotFound(id))
            }
            ElementRef::Edge(id) => {
                let index = self.edge_index(id)?;
                self.graph
                    .edge_weight_mut(index)
                    .map(|e| &mut e.properties)
                    .ok_or(StoreError::EdgeNotFound(id))
            }
        }
    }

    fn lookup(&self, key: &str, value: &PropertyValue, vertices: bool) -> Vec<ElementId> {
        let Some(ids) = self.key_index.get(key) else {
            return Vec::new();
        };
        ids.iter()
            .copied()
            .filter(|id| {
                let found = if vertices {
                    self.vertices
                        .get(id)
                        .and_then(|i| self.graph.node_weight(*i))
                        .and_then(|v| v.properties.get(key))
                } else {
                    self.edges
                        .get(id)
                        .and_then(|i| self.graph.edge_weight(*i))
                        .and_then(|e| e.properties.get(key))
                };
                found.is_some_and(|v| v.loosely_equals(value))
            })
            .collect()
    }
}

/// Shared in-memory graph; cheap to clone
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphStore {
    committed: Arc<RwLock<GraphState>>,
}

impl InMemoryGraphStore {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed vertices
    pub fn vertex_count(&self) -> usize {
        self.committed.read().vertices.len()
    }

    /// Number of committed edges
    pub fn edge_count(&self) -> usize {
        self.committed.read().edges.len()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn open(&self) -> StoreResult<Box<dyn GraphHandle>> {
        Ok(Box::new(InMemoryGraphHandle {
            committed: Arc::clone(&self.committed),
            working: None,
        }))
    }
}

/// Handle on an `InMemoryGraphStore`
pub struct InMemoryGraphHandle {
    committed: Arc<RwLock<GraphState>>,
    working: Option<GraphState>,
}

impl InMemoryGraphHandle {
    fn read<R>(&self, f: impl FnOnce(&GraphState) -> R) -> R {
        match &self.working {
            Some(state) => f(state),
            None => f(&self.committed.read()),
        }
    }

    fn write(&mut self) -> StoreResult<&mut GraphState> {
        self.working.as_mut().ok_or(StoreError::NoTransaction)
    }
}

impl GraphHandle for InMemoryGraphHandle {
    fn begin(&mut self) -> StoreResult<()> {
        if self.working.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.working = Some(self.committed.read().clone());
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        let state = self.working.take().ok_or(StoreError::NoTransaction)?;
        *self.committed.write() = state;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.working.take().map(|_| ()).ok_or(StoreError::NoTransaction)
    }

    fn add_vertex(&mut self, label: &str) -> StoreResult<ElementId> {
        let state = self.write()?;
        let id = ElementId::new();
        let index = state.graph.add_node(VertexData {
            id,
            label: label.to_string(),
            properties: IndexMap::new(),
        });
        state.vertices.insert(id, index);
        Ok(id)
    }

    fn add_edge(&mut self, label: &str, out_vertex: ElementId, in_vertex: ElementId) -> StoreResult<ElementId> {
        let state = self.write()?;
        let tail = state.node(out_vertex)?;
        let head = state.node(in_vertex)?;
        let id = ElementId::new();
        let index = state.graph.add_edge(
            tail,
            head,
            EdgeData {
                id,
                label: label.to_string(),
                properties: IndexMap::new(),
            },
        );
        state.edges.insert(id, index);
        Ok(id)
    }

    fn remove_vertex(&mut self, id: ElementId) -> StoreResult<()> {
        let state = self.write()?;
        let index = state.node(id)?;

        let incident: Vec<(ElementId, Vec<String>)> = state
            .graph
            .edges_directed(index, petgraph::Direction::Outgoing)
            .chain(state.graph.edges_directed(index, petgraph::Direction::Incoming))
            .map(|e| (e.weight().id, e.weight().properties.keys().cloned().collect()))
            .collect();
        for (edge_id, keys) in incident {
            state.edges.shift_remove(&edge_id);
            state.unindex(edge_id, keys);
        }

        if let Some(data) = state.graph.remove_node(index) {
            state.unindex(id, data.properties.into_keys());
        }
        state.vertices.shift_remove(&id);
        Ok(())
    }

    fn remove_edge(&mut self, id: ElementId) -> StoreResult<()> {
        let state = self.write()?;
        let index = state.edge_index(id)?;
        if let Some(data) = state.graph.remove_edge(index) {
            state.unindex(id, data.properties.into_keys());
        }
        state.edges.shift_remove(&id);
        Ok(())
    }

    fn vertex(&self, id: ElementId) -> StoreResult<Option<Vertex>> {
        Ok(self.read(|state| state.vertex_snapshot(id)))
    }

    fn edge(&self, id: ElementId) -> StoreResult<Option<Edge>> {
        Ok(self.read(|state| state.edge_snapshot(id)))
    }

    fn set_property(&mut self, element: ElementRef, key: &str, value: PropertyValue) -> StoreResult<()> {
        let state = self.write()?;
        state.properties_mut(element)?.insert(key.to_string(), value);
        state
            .key_index
            .entry(key.to_string())
            .or_default()
            .insert(element.id());
        Ok(())
    }

    fn remove_property(&mut self, element: ElementRef, key: &str) -> StoreResult<()> {
        let state = self.write()?;
        state.properties_mut(element)?.shift_remove(key);
        state.unindex(element.id(), [key.to_string()]);
        Ok(())
    }

    fn vertices(&self, label: Option<&str>) -> StoreResult<Vec<ElementId>> {
        Ok(self.read(|state| {
            state
                .vertices
                .iter()
                .filter(|(_, index)| {
                    label.map_or(true, |l| state.graph.node_weight(**index).is_some_and(|v| v.label == l))
                })
                .map(|(id, _)| *id)
                .collect()
        }))
    }

    fn edges(&self, label: Option<&str>) -> StoreResult<Vec<ElementId>> {
        Ok(self.read(|state| {
            state
                .edges
                .iter()
                .filter(|(_, index)| {
                    label.map_or(true, |l| state.graph.edge_weight(**index).is_some_and(|e| e.label == l))
                })
                .map(|(id, _)| *id)
                .collect()
        }))
    }

    fn vertices_by_property(&self, key: &str, value: &PropertyValue) -> StoreResult<Vec<ElementId>> {
        Ok(self.read(|state| state.lookup(key, value, true)))
    }

    fn edges_by_property(&self, key: &str, value: &PropertyValue) -> StoreResult<Vec<ElementId>> {
        Ok(self.read(|state| state.lookup(key, value, false)))
    }

    fn incident_edges(&self, vertex: ElementId, direction: Direction, label: Option<&str>) -> StoreResult<Vec<ElementId>> {
        self.read(|state| {
            let index = state.node(vertex)?;
            let directions: &[petgraph::Direction] = match direction {
                Direction::Out => &[petgraph::Direction::Outgoing],
                Direction::In => &[petgraph::Direction::Incoming],
                Direction::Both => &[petgraph::Direction::Outgoing, petgraph::Direction::Incoming],
            };

            let mut found: Vec<(usize, ElementId)> = Vec::new();
            for dir in directions {
                for edge in state.graph.edges_directed(index, *dir) {
                    let data = edge.weight();
                    if label.map_or(true, |l| data.label == l) {
                        let position = state.edges.get_index_of(&data.id).unwrap_or(usize::MAX);
                        found.push((position, data.id));
                    }
                }
            }
            // petgraph yields newest first; report insertion order instead
            found.sort_by_key(|(position, _)| *position);
            found.dedup_by_key(|(_, id)| *id);
            Ok(found.into_iter().map(|(_, id)| id).collect())
        })
    }
}
