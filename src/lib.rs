//! Object-graph mapping for property graphs
//!
//! Domain entities are described once by static descriptors and stored as
//! vertices and edges of a property graph. Repositories built from those
//! descriptors answer the CRUD contract plus query methods that are either
//! derived from their names (`findByPerson1_FirstName`) or written as
//! traversal templates (`g.E().has('date')`). All work happens inside a
//! `GraphSession`, which owns the transaction and the identity map.

pub mod config;
pub mod descriptor;
pub mod errors;
pub mod mapping;
pub mod queries;
pub mod relationships;
pub mod repository;
pub mod session;
pub mod store;
pub mod traversal;
pub mod value_objects;

pub use config::OgmConfig;
pub use errors::{
    ConfigurationError, MappingError, OgmError, OgmResult, QueryError, TransactionError, ValidationError,
};

pub use descriptor::{
    DescriptorRegistry, EndpointDescriptor, EntityDescriptor, EntityKind, PropertyKind, RelationshipDescriptor,
};
pub use mapping::{Entity, EntityMapper, EntityRecord, FieldValue};
pub use queries::{CompiledTemplate, DerivedQuery, QueryDerivationEngine, QuerySubject, QueryTemplateEngine};
pub use relationships::RelationshipResolver;
pub use repository::{Argument, MethodOutput, Repository, RepositoryDescriptor, RepositoryDispatcher};
pub use session::GraphSession;
pub use store::{ElementRef, GraphHandle, GraphStore, InMemoryGraphStore, StoreError};
pub use traversal::{Predicate, Step, Traversal};

pub use value_objects::{CascadePolicy, Cardinality, Direction, ElementId, FetchMode, PropertyValue, SaveMode};
