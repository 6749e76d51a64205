//! Static mapping metadata
//!
//! Descriptors describe how a domain type lands in the graph: which element
//! backs it, which fields are plain properties, which are embedded value
//! objects flattened onto the owner, and which are relationships to other
//! entities. They are declared explicitly and collected once into a
//! read-only `DescriptorRegistry`.

mod registry;

pub use registry::{global, install_global, DescriptorRegistry, RegistryBuilder};

use crate::value_objects::{Cardinality, CascadePolicy, Direction, FetchMode, PropertyValue};
use serde::{Deserialize, Serialize};

/// Declared type of a simple property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    /// Enum stored by variant name
    Enum,
    /// Collection of enum variant names
    EnumSet,
}

impl PropertyKind {
    /// Value a declared property takes when the element does not carry it
    pub fn zero_value(self) -> PropertyValue {
        match self {
            PropertyKind::String => PropertyValue::String(String::new()),
            PropertyKind::Integer => PropertyValue::Integer(0),
            PropertyKind::Float => PropertyValue::Float(0.0),
            PropertyKind::Boolean => PropertyValue::Boolean(false),
            PropertyKind::Date | PropertyKind::Enum => PropertyValue::Null,
            PropertyKind::EnumSet => PropertyValue::List(Vec::new()),
        }
    }

    /// Whether `value` may be stored under this kind; null is always accepted
    pub fn accepts(self, value: &PropertyValue) -> bool {
        match (self, value) {
            (_, PropertyValue::Null) => true,
            (PropertyKind::String | PropertyKind::Enum, PropertyValue::String(_)) => true,
            (PropertyKind::Integer, PropertyValue::Integer(_)) => true,
            (PropertyKind::Float, PropertyValue::Float(_) | PropertyValue::Integer(_)) => true,
            (PropertyKind::Boolean, PropertyValue::Boolean(_)) => true,
            (PropertyKind::Date, PropertyValue::Date(_)) => true,
            (PropertyKind::EnumSet, PropertyValue::List(items)) => {
                items.iter().all(|item| matches!(item, PropertyValue::String(_)))
            }
            _ => false,
        }
    }
}

/// A simple property field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    pub required: bool,
}

/// An embedded value object flattened onto the owner's element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedDescriptor {
    pub field: String,
    pub descriptor: Box<EntityDescriptor>,
}

/// A relationship field pointing at other entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub field: String,
    /// Edge label
    pub label: String,
    /// Direction of the edge seen from the owner
    pub direction: Direction,
    pub cardinality: Cardinality,
    /// Name of the target entity; may be an edge entity carrying properties
    pub target: String,
    pub fetch: Option<FetchMode>,
    pub on_delete: Option<CascadePolicy>,
    /// Save transient targets together with the owner
    pub cascade_save: bool,
}

impl RelationshipDescriptor {
    /// Outgoing relationship with default fetch and delete behaviour
    pub fn new(field: &str, label: &str, target: &str, cardinality: Cardinality) -> Self {
        Self {
            field: field.to_string(),
            label: label.to_string(),
            direction: Direction::Out,
            cardinality,
            target: target.to_string(),
            fetch: None,
            on_delete: None,
            cascade_save: false,
        }
    }

    pub fn single(field: &str, label: &str, target: &str) -> Self {
        Self::new(field, label, target, Cardinality::Single)
    }

    pub fn set(field: &str, label: &str, target: &str) -> Self {
        Self::new(field, label, target, Cardinality::Set)
    }

    pub fn list(field: &str, label: &str, target: &str) -> Self {
        Self::new(field, label, target, Cardinality::List)
    }

    pub fn incoming(mut self) -> Self {
        self.direction = Direction::In;
        self
    }

    pub fn both_ways(mut self) -> Self {
        self.direction = Direction::Both;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.fetch = Some(FetchMode::Lazy);
        self
    }

    pub fn cascade_save(mut self) -> Self {
        self.cascade_save = true;
        self
    }

    pub fn on_delete(mut self, policy: CascadePolicy) -> Self {
        self.on_delete = Some(policy);
        self
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch.unwrap_or_default()
    }

    pub fn delete_policy(&self) -> CascadePolicy {
        self.on_delete.unwrap_or_default()
    }
}

/// One endpoint of an edge entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub field: String,
    /// Vertex entity expected at this endpoint
    pub entity: String,
    pub cascade_save: bool,
}

impl EndpointDescriptor {
    pub fn new(field: &str, entity: &str) -> Self {
        Self {
            field: field.to_string(),
            entity: entity.to_string(),
            cascade_save: false,
        }
    }

    pub fn cascade_save(mut self) -> Self {
        self.cascade_save = true;
        self
    }
}

/// Which graph element backs an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    /// One vertex per entity
    Vertex { label: String },
    /// One edge per entity; `source` is the out-vertex
    Edge {
        label: String,
        source: EndpointDescriptor,
        target: EndpointDescriptor,
    },
    /// Value object without an element of its own
    Embedded,
}

/// Resolution of a field name against a descriptor
#[derive(Debug, Clone, Copy)]
pub enum FieldDescriptor<'a> {
    Property(&'a PropertyDescriptor),
    Embedded(&'a EmbeddedDescriptor),
    Relationship(&'a RelationshipDescriptor),
    /// Endpoint of an edge entity; `Out` for the source, `In` for the target
    Endpoint(&'a EndpointDescriptor, Direction),
}

/// Complete mapping description of one domain type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub kind: EntityKind,
    pub id_field: String,
    pub properties: Vec<PropertyDescriptor>,
    pub embedded: Vec<EmbeddedDescriptor>,
    pub relationships: Vec<RelationshipDescriptor>,
}

impl EntityDescriptor {
    fn with_kind(name: &str, kind: EntityKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            id_field: "id".to_string(),
            properties: Vec::new(),
            embedded: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Vertex-backed entity labelled with its own name
    pub fn vertex(name: &str) -> Self {
        Self::with_kind(
            name,
            EntityKind::Vertex {
                label: name.to_string(),
            },
        )
    }

    /// Edge-backed entity labelled with its own name
    pub fn edge(name: &str, source: EndpointDescriptor, target: EndpointDescriptor) -> Self {
        Self::with_kind(
            name,
            EntityKind::Edge {
                label: name.to_string(),
                source,
                target,
            },
        )
    }

    /// Embedded value object
    pub fn embedded(name: &str) -> Self {
        Self::with_kind(name, EntityKind::Embedded)
    }

    /// Override the graph label
    pub fn with_label(mut self, new_label: &str) -> Self {
        match &mut self.kind {
            EntityKind::Vertex { label } | EntityKind::Edge { label, .. } => *label = new_label.to_string(),
            EntityKind::Embedded => {}
        }
        self
    }

    pub fn with_id_field(mut self, field: &str) -> Self {
        self.id_field = field.to_string();
        self
    }

    pub fn property(mut self, name: &str, kind: PropertyKind) -> Self {
        self.properties.push(PropertyDescriptor {
            name: name.to_string(),
            kind,
            required: false,
        });
        self
    }

    pub fn required_property(mut self, name: &str, kind: PropertyKind) -> Self {
        self.properties.push(PropertyDescriptor {
            name: name.to_string(),
            kind,
            required: true,
        });
        self
    }

    pub fn embed(mut self, field: &str, descriptor: EntityDescriptor) -> Self {
        self.embedded.push(EmbeddedDescriptor {
            field: field.to_string(),
            descriptor: Box::new(descriptor),
        });
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDescriptor) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn label(&self) -> Option<&str> {
        match &self.kind {
            EntityKind::Vertex { label } | EntityKind::Edge { label, .. } => Some(label),
            EntityKind::Embedded => None,
        }
    }

    pub fn is_vertex(&self) -> bool {
        matches!(self.kind, EntityKind::Vertex { .. })
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, EntityKind::Edge { .. })
    }

    /// Source and target endpoints of an edge entity
    pub fn endpoints(&self) -> Option<(&EndpointDescriptor, &EndpointDescriptor)> {
        match &self.kind {
            EntityKind::Edge { source, target, .. } => Some((source, target)),
            _ => None,
        }
    }

    pub fn relationship_named(&self, field: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.field == field)
    }

    /// Whether another relationship writes edges `relationship` cannot tell apart from its own
    ///
    /// That is the same label and target with overlapping directions. Edges of
    /// such fields are told apart by the field names stored on them.
    pub fn shares_edges(&self, relationship: &RelationshipDescriptor) -> bool {
        self.relationships.iter().any(|other| {
            other.field != relationship.field
                && other.label == relationship.label
                && other.target == relationship.target
                && (other.direction == relationship.direction
                    || other.direction == Direction::Both
                    || relationship.direction == Direction::Both)
        })
    }

    /// Resolve a field by exact name
    pub fn field(&self, name: &str) -> Option<FieldDescriptor<'_>> {
        if let Some(p) = self.properties.iter().find(|p| p.name == name) {
            return Some(FieldDescriptor::Property(p));
        }
        if let Some(e) = self.embedded.iter().find(|e| e.field == name) {
            return Some(FieldDescriptor::Embedded(e));
        }
        if let Some(r) = self.relationship_named(name) {
            return Some(FieldDescriptor::Relationship(r));
        }
        if let Some((source, target)) = self.endpoints() {
            if source.field == name {
                return Some(FieldDescriptor::Endpoint(source, Direction::Out));
            }
            if target.field == name {
                return Some(FieldDescriptor::Endpoint(target, Direction::In));
            }
        }
        None
    }

    /// Resolve a capitalised segment from a method name (`Person1` → `person1`)
    pub fn resolve_segment(&self, segment: &str) -> Option<FieldDescriptor<'_>> {
        self.field(segment)
            .or_else(|| self.field(&decapitalize(segment)))
            .or_else(|| {
                self.field_names()
                    .into_iter()
                    .find(|name| name.eq_ignore_ascii_case(segment))
                    .and_then(|name| self.field(&name))
            })
    }

    /// Every declared field name, in declaration order
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.properties.iter().map(|p| p.name.clone()).collect();
        names.extend(self.embedded.iter().map(|e| e.field.clone()));
        names.extend(self.relationships.iter().map(|r| r.field.clone()));
        if let Some((source, target)) = self.endpoints() {
            names.push(source.field.clone());
            names.push(target.field.clone());
        }
        names
    }
}

fn decapitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
