//! Planned graph writes for one entity

use crate::value_objects::{Direction, ElementId, PropertyValue};

/// A single property write on the entity's element
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyOperation {
    Set { key: String, value: PropertyValue },
    Remove { key: String },
}

impl PropertyOperation {
    pub fn key(&self) -> &str {
        match self {
            PropertyOperation::Set { key, .. } | PropertyOperation::Remove { key } => key,
        }
    }
}

/// Where a referenced element comes from when the mutation is applied
#[derive(Debug, Clone, PartialEq)]
pub enum TargetRef {
    /// The vertex of the entity that owns the relationship
    Owner,
    /// An element that already exists
    Persisted(ElementId),
    /// A transient entity saved first, as part of the same mutation
    Cascade(Box<ElementMutation>),
}

/// The element an entity maps to
#[derive(Debug, Clone, PartialEq)]
pub enum ElementTarget {
    Vertex {
        id: Option<ElementId>,
        label: String,
    },
    Edge {
        id: Option<ElementId>,
        label: String,
        source: Box<TargetRef>,
        target: Box<TargetRef>,
    },
}

impl ElementTarget {
    pub fn id(&self) -> Option<ElementId> {
        match self {
            ElementTarget::Vertex { id, .. } | ElementTarget::Edge { id, .. } => *id,
        }
    }
}

/// Edges to write for one relationship field
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipMutation {
    pub field: String,
    pub targets: Vec<TargetRef>,
}

/// Ordered writes that persist one entity
#[derive(Debug, Clone, PartialEq)]
pub struct ElementMutation {
    pub entity: String,
    pub element: ElementTarget,
    /// Property writes, embedded fields already flattened
    pub operations: Vec<PropertyOperation>,
    pub relationships: Vec<RelationshipMutation>,
}

impl ElementMutation {
    pub fn is_new(&self) -> bool {
        self.element.id().is_none()
    }

    /// Value written for `key`, if any
    pub fn value_of(&self, key: &str) -> Option<&PropertyValue> {
        self.operations.iter().find_map(|op| match op {
            PropertyOperation::Set { key: k, value } if k == key => Some(value),
            _ => None,
        })
    }

    /// For an edge with one owner-filled endpoint: the owner's side and the other endpoint
    pub fn owner_side(&self) -> Option<(Direction, &TargetRef)> {
        match &self.element {
            ElementTarget::Edge { source, target, .. } => match (source.as_ref(), target.as_ref()) {
                (TargetRef::Owner, far) => Some((Direction::Out, far)),
                (far, TargetRef::Owner) => Some((Direction::In, far)),
                _ => None,
            },
            ElementTarget::Vertex { .. } => None,
        }
    }

    /// The same writes aimed at the existing element `id`
    pub fn targeting(&self, id: ElementId) -> Self {
        let mut mutation = self.clone();
        match &mut mutation.element {
            ElementTarget::Vertex { id: slot, .. } | ElementTarget::Edge { id: slot, .. } => *slot = Some(id),
        }
        mutation
    }
}
