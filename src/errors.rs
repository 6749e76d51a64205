//! Error taxonomy of the mapper
//!
//! Each family has its own enum so callers can match on the layer that failed.
//! `OgmError` wraps them all and is what public operations return.

use crate::store::StoreError;
use crate::value_objects::ElementId;
use thiserror::Error;

/// Result type for mapper operations
pub type OgmResult<T> = Result<T, OgmError>;

/// Top-level error returned by sessions, mappers and repositories
#[derive(Debug, Error)]
pub enum OgmError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Graph store error: {0}")]
    Store(#[from] StoreError),
}

/// Entity to element conversion failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("Entity type not registered: {0}")]
    UnknownEntity(String),

    #[error("Field {field} of {entity} references a transient {target} and cascade-save is disabled")]
    MissingIdentifier {
        entity: String,
        field: String,
        target: String,
    },

    #[error("Edge entity {entity} requires a persisted or cascadable {endpoint} endpoint")]
    MissingEndpoint { entity: String, endpoint: String },

    #[error("Endpoint {endpoint} of persisted edge entity {entity} cannot be changed")]
    ImmutableEndpoint { entity: String, endpoint: String },

    #[error("Element {id} has label {found}, expected {expected}")]
    LabelMismatch {
        id: ElementId,
        expected: String,
        found: String,
    },

    #[error("Element {0} no longer exists in the graph")]
    ElementNotFound(ElementId),

    #[error("Field {field} of {entity} has an unexpected shape: {reason}")]
    FieldShape {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("Cannot delete {entity} {id}: relationship {field} is restricted and still has edges")]
    DeleteRestricted {
        entity: String,
        id: ElementId,
        field: String,
    },

    #[error("Cannot delete a transient {0}")]
    TransientDelete(String),
}

/// Query planning and execution failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Cannot resolve segment '{segment}' of query path '{path}' on {entity}")]
    UnresolvableQueryPath {
        entity: String,
        path: String,
        segment: String,
    },

    #[error("Method name '{0}' does not follow the derived query grammar")]
    UnparsableMethodName(String),

    #[error("Query expects {expected} argument(s), got {actual}")]
    ArgumentCountMismatch { expected: usize, actual: usize },

    #[error("Template parse error at offset {position}: {message}")]
    TemplateParseError { position: usize, message: String },

    #[error("Template has {expected} placeholder(s), got {actual} argument(s)")]
    TemplateArgumentCountMismatch { expected: usize, actual: usize },

    #[error("Traversal selects unknown alias '{0}'")]
    UnknownAlias(String),

    #[error("Placeholder {0} was not bound to an argument")]
    UnboundPlaceholder(usize),

    #[error("Repository has no method named '{0}'")]
    UnknownMethod(String),

    #[error("Invalid argument for '{method}': {reason}")]
    InvalidArgument { method: String, reason: String },

    #[error("Method '{method}' does not return {expected}")]
    UnexpectedOutput { method: String, expected: &'static str },
}

/// Transaction boundary failures
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("A transaction is already active on this session")]
    TransactionAlreadyActive,

    #[error("Graph store failed to {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Repository construction failures; raised once, never per call
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Repository method '{method}' on {entity} is unsupported: {source}")]
    UnsupportedRepositoryMethod {
        entity: String,
        method: String,
        #[source]
        source: QueryError,
    },

    #[error("Repository declares method '{0}' more than once")]
    DuplicateMethod(String),

    #[error("Repository targets unregistered entity {0}")]
    UnknownEntity(String),

    #[error("Invalid descriptor for {entity}: {reason}")]
    InvalidDescriptor { entity: String, reason: String },

    #[error("Descriptor registry is already installed")]
    RegistryAlreadyInstalled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Entity content rejected before anything is written
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Required property {field} of {entity} is missing")]
    MissingRequired { entity: String, field: String },

    #[error("Property {field} of {entity} expects {expected}, got {found}")]
    TypeMismatch {
        entity: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("Entity {entity} has no field named {field}")]
    UnknownField { entity: String, field: String },
}
