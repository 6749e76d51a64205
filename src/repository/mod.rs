//! Repositories
//!
//! A repository is declared once as a `RepositoryDescriptor`: the entity it
//! serves plus any query methods beyond the CRUD contract. The dispatcher
//! classifies every method when it is constructed and keeps the resulting
//! handlers in a fixed table; a method that cannot be classified fails
//! construction instead of the first call.

mod dispatcher;
mod typed;

pub use dispatcher::{MethodHandler, RepositoryDispatcher};
pub use typed::Repository;

use crate::mapping::{Entity, EntityRecord};
use crate::value_objects::{ElementId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Generic operations every repository answers without declaring them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrudOperation {
    Save,
    SaveAll,
    Delete,
    DeleteById,
    DeleteAll,
    FindById,
    FindAll,
    ExistsById,
    Count,
}

impl CrudOperation {
    pub const ALL: [CrudOperation; 9] = [
        CrudOperation::Save,
        CrudOperation::SaveAll,
        CrudOperation::Delete,
        CrudOperation::DeleteById,
        CrudOperation::DeleteAll,
        CrudOperation::FindById,
        CrudOperation::FindAll,
        CrudOperation::ExistsById,
        CrudOperation::Count,
    ];

    pub fn method_name(self) -> &'static str {
        match self {
            CrudOperation::Save => "save",
            CrudOperation::SaveAll => "saveAll",
            CrudOperation::Delete => "delete",
            CrudOperation::DeleteById => "deleteById",
            CrudOperation::DeleteAll => "deleteAll",
            CrudOperation::FindById => "findById",
            CrudOperation::FindAll => "findAll",
            CrudOperation::ExistsById => "existsById",
            CrudOperation::Count => "count",
        }
    }

    pub fn from_method_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.method_name() == name)
    }
}

/// A query method declared on a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodDeclaration {
    /// Resolved from the method name
    Derived(String),
    /// Runs the given traversal expression
    Template { name: String, expression: String },
}

impl MethodDeclaration {
    pub fn name(&self) -> &str {
        match self {
            MethodDeclaration::Derived(name) | MethodDeclaration::Template { name, .. } => name,
        }
    }
}

/// Static declaration of one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub entity: String,
    pub methods: Vec<MethodDeclaration>,
}

impl RepositoryDescriptor {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            methods: Vec::new(),
        }
    }

    pub fn for_entity<T: Entity>() -> Self {
        Self::new(T::NAME)
    }

    pub fn derived(mut self, name: &str) -> Self {
        self.methods.push(MethodDeclaration::Derived(name.to_string()));
        self
    }

    pub fn template(mut self, name: &str, expression: &str) -> Self {
        self.methods.push(MethodDeclaration::Template {
            name: name.to_string(),
            expression: expression.to_string(),
        });
        self
    }
}

/// A call argument passed to `RepositoryDispatcher::invoke`
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(PropertyValue),
    Entity(EntityRecord),
    Entities(Vec<EntityRecord>),
}

impl From<PropertyValue> for Argument {
    fn from(value: PropertyValue) -> Self {
        Argument::Value(value)
    }
}

impl From<ElementId> for Argument {
    fn from(id: ElementId) -> Self {
        Argument::Value(id.into())
    }
}

impl From<EntityRecord> for Argument {
    fn from(record: EntityRecord) -> Self {
        Argument::Entity(record)
    }
}

impl From<Vec<EntityRecord>> for Argument {
    fn from(records: Vec<EntityRecord>) -> Self {
        Argument::Entities(records)
    }
}

/// Result of a dispatched call
#[derive(Debug, Clone)]
pub enum MethodOutput {
    Entity(Arc<EntityRecord>),
    Optional(Option<Arc<EntityRecord>>),
    Entities(Vec<Arc<EntityRecord>>),
    Count(usize),
    Exists(bool),
    Unit,
}

impl MethodOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            MethodOutput::Entity(_) => "an entity",
            MethodOutput::Optional(_) => "an optional entity",
            MethodOutput::Entities(_) => "entities",
            MethodOutput::Count(_) => "a count",
            MethodOutput::Exists(_) => "a boolean",
            MethodOutput::Unit => "nothing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud_names_round_trip() {
        for op in CrudOperation::ALL {
            assert_eq!(CrudOperation::from_method_name(op.method_name()), Some(op));
        }
        assert_eq!(CrudOperation::from_method_name("findByFirstName"), None);
        assert_eq!(CrudOperation::from_method_name("FindAll"), None);
    }

    #[test]
    fn test_descriptor_keeps_declaration_order() {
        let descriptor = RepositoryDescriptor::new("Person")
            .derived("findByFirstName")
            .template("findAdults", "g.V().has('age', gte(18))");

        let names: Vec<_> = descriptor.methods.iter().map(MethodDeclaration::name).collect();
        assert_eq!(names, ["findByFirstName", "findAdults"]);
    }
}
