//! Descriptor-shaped entity values
//!
//! An `EntityRecord` is what the mapper reads and writes. Typed domain structs
//! convert to and from records through the `Entity` trait.

use crate::descriptor::EntityDescriptor;
use crate::errors::MappingError;
use crate::value_objects::{ElementId, PropertyValue};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::str::FromStr;
use std::sync::Arc;

/// Value held by one field of a record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Simple property
    Property(PropertyValue),
    /// Embedded value object, `None` when absent
    Embedded(Option<EntityRecord>),
    /// Single relationship target or edge endpoint
    One(Option<Arc<EntityRecord>>),
    /// Collection relationship targets
    Many(Vec<Arc<EntityRecord>>),
    /// Relationship that was not fetched; saving leaves its edges alone
    Unloaded,
}

/// An entity instance in descriptor form
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityRecord {
    /// Registered entity name
    pub entity: String,
    /// Graph element id once persisted
    pub id: Option<ElementId>,
    pub fields: IndexMap<String, FieldValue>,
}

impl EntityRecord {
    /// Transient record without fields
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            id: None,
            fields: IndexMap::new(),
        }
    }

    /// Id-only reference to a persisted entity
    pub fn reference(entity: &str, id: ElementId) -> Self {
        Self {
            entity: entity.to_string(),
            id: Some(id),
            fields: IndexMap::new(),
        }
    }

    pub fn with_id(mut self, id: Option<ElementId>) -> Self {
        self.id = id;
        self
    }

    pub fn set(mut self, field: &str, value: impl Into<PropertyValue>) -> Self {
        self.fields.insert(field.to_string(), FieldValue::Property(value.into()));
        self
    }

    pub fn embed(mut self, field: &str, value: Option<EntityRecord>) -> Self {
        self.fields.insert(field.to_string(), FieldValue::Embedded(value));
        self
    }

    pub fn one(mut self, field: &str, target: Option<EntityRecord>) -> Self {
        self.fields.insert(field.to_string(), FieldValue::One(target.map(Arc::new)));
        self
    }

    pub fn many(mut self, field: &str, targets: impl IntoIterator<Item = EntityRecord>) -> Self {
        self.fields.insert(
            field.to_string(),
            FieldValue::Many(targets.into_iter().map(Arc::new).collect()),
        );
        self
    }

    pub fn unloaded(mut self, field: &str) -> Self {
        self.fields.insert(field.to_string(), FieldValue::Unloaded);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.id.is_none()
    }

    pub fn field(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn property(&self, field: &str) -> Option<&PropertyValue> {
        match self.fields.get(field) {
            Some(FieldValue::Property(value)) => Some(value),
            _ => None,
        }
    }

    pub fn string(&self, field: &str) -> String {
        self.property(field)
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    pub fn integer(&self, field: &str) -> i64 {
        self.property(field).and_then(PropertyValue::as_i64).unwrap_or_default()
    }

    pub fn float(&self, field: &str) -> f64 {
        self.property(field).and_then(PropertyValue::as_f64).unwrap_or_default()
    }

    pub fn boolean(&self, field: &str) -> bool {
        self.property(field).and_then(PropertyValue::as_bool).unwrap_or_default()
    }

    pub fn date(&self, field: &str) -> Option<DateTime<Utc>> {
        self.property(field).and_then(PropertyValue::as_date)
    }

    /// Enum stored by name; unknown names read as `None`
    pub fn enum_value<E: FromStr>(&self, field: &str) -> Option<E> {
        self.property(field)
            .and_then(PropertyValue::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// Enum collection stored as a list of names; unknown names are skipped
    pub fn enum_values<E: FromStr>(&self, field: &str) -> Vec<E> {
        self.property(field)
            .and_then(PropertyValue::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(PropertyValue::as_str)
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn embedded(&self, field: &str) -> Option<&EntityRecord> {
        match self.fields.get(field) {
            Some(FieldValue::Embedded(value)) => value.as_ref(),
            _ => None,
        }
    }

    pub fn target(&self, field: &str) -> Option<&Arc<EntityRecord>> {
        match self.fields.get(field) {
            Some(FieldValue::One(target)) => target.as_ref(),
            _ => None,
        }
    }

    pub fn targets(&self, field: &str) -> &[Arc<EntityRecord>] {
        match self.fields.get(field) {
            Some(FieldValue::Many(targets)) => targets,
            _ => &[],
        }
    }

    /// Typed view of a single relationship target
    pub fn target_as<T: Entity>(&self, field: &str) -> Result<Option<T>, MappingError> {
        self.target(field).map(|r| T::from_record(r)).transpose()
    }

    /// Typed view of collection relationship targets
    pub fn targets_as<T: Entity>(&self, field: &str) -> Result<Vec<T>, MappingError> {
        self.targets(field).iter().map(|r| T::from_record(r)).collect()
    }

    pub fn is_loaded(&self, field: &str) -> bool {
        !matches!(self.fields.get(field), Some(FieldValue::Unloaded))
    }

    /// Fails when the record belongs to another entity type
    pub fn expect_entity(&self, name: &str) -> Result<(), MappingError> {
        if self.entity == name {
            Ok(())
        } else {
            Err(MappingError::FieldShape {
                entity: name.to_string(),
                field: "<record>".to_string(),
                reason: format!("record describes {}", self.entity),
            })
        }
    }
}

/// A domain type that can be stored through the mapper
pub trait Entity: Sized + Clone + Send + Sync + 'static {
    /// Registered entity name; must match `descriptor().name`
    const NAME: &'static str;

    /// Mapping metadata of this type
    fn descriptor() -> EntityDescriptor;

    fn to_record(&self) -> EntityRecord;

    fn from_record(record: &EntityRecord) -> Result<Self, MappingError>;
}
