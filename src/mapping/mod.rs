//! Entity to graph element mapping
//!
//! The mapper turns descriptor-shaped records into planned element writes,
//! applies them through a session and hydrates records back from the graph.

mod mapper;
mod mutation;
mod record;

pub use mapper::EntityMapper;
pub(crate) use mapper::FetchContext;
pub use mutation::{ElementMutation, ElementTarget, PropertyOperation, RelationshipMutation, TargetRef};
pub use record::{Entity, EntityRecord, FieldValue};
