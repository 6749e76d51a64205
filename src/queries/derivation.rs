//! Query derivation from repository method names
//!
//! `findByPerson1_FirstName` reads as: start from every `Likes` edge, hop to
//! the `person1` endpoint, keep the edge when that vertex's `firstName`
//! equals the first argument. Criteria combine with `And`/`Or` and may carry
//! an operator suffix such as `GreaterThan` or `IsNull`.

use crate::descriptor::{DescriptorRegistry, EntityDescriptor, FieldDescriptor};
use crate::errors::{OgmResult, QueryError};
use crate::relationships::FIELDS_KEY;
use crate::session::GraphSession;
use crate::store::ElementRef;
use crate::traversal::{self, Predicate, Step, Traversal, Value};
use crate::value_objects::{Direction, PropertyValue};
use std::sync::Arc;
use tracing::trace;

/// What a derived method returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySubject {
    /// Matching entities
    Find,
    /// Number of matching entities
    Count,
    /// Whether any entity matches
    Exists,
}

const SUBJECTS: &[(&str, QuerySubject)] = &[
    ("findAllBy", QuerySubject::Find),
    ("findBy", QuerySubject::Find),
    ("readBy", QuerySubject::Find),
    ("getBy", QuerySubject::Find),
    ("queryBy", QuerySubject::Find),
    ("countBy", QuerySubject::Count),
    ("existsBy", QuerySubject::Exists),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    Containing,
    StartingWith,
    IsNull,
    IsNotNull,
    True,
    False,
}

impl Operator {
    fn arity(self) -> usize {
        match self {
            Operator::Between => 2,
            Operator::IsNull | Operator::IsNotNull | Operator::True | Operator::False => 0,
            _ => 1,
        }
    }

    fn predicate(self, first_slot: usize) -> Predicate {
        let slot = Value::Slot(first_slot);
        match self {
            Operator::Eq => Predicate::Eq(slot),
            Operator::Neq => Predicate::Neq(slot),
            Operator::Gt => Predicate::Gt(slot),
            Operator::Gte => Predicate::Gte(slot),
            Operator::Lt => Predicate::Lt(slot),
            Operator::Lte => Predicate::Lte(slot),
            Operator::Between => Predicate::Between(slot, Value::Slot(first_slot + 1)),
            Operator::Containing => Predicate::Containing(slot),
            Operator::StartingWith => Predicate::StartingWith(slot),
            Operator::IsNull => Predicate::IsNull,
            Operator::IsNotNull => Predicate::IsNotNull,
            Operator::True => Predicate::Eq(Value::Literal(PropertyValue::Boolean(true))),
            Operator::False => Predicate::Eq(Value::Literal(PropertyValue::Boolean(false))),
        }
    }
}

// longest suffixes first so `GreaterThanEqual` wins over `GreaterThan`
const OPERATORS: &[(&str, Operator)] = &[
    ("GreaterThanEqual", Operator::Gte),
    ("LessThanEqual", Operator::Lte),
    ("StartingWith", Operator::StartingWith),
    ("GreaterThan", Operator::Gt),
    ("Containing", Operator::Containing),
    ("IsNotNull", Operator::IsNotNull),
    ("LessThan", Operator::Lt),
    ("NotNull", Operator::IsNotNull),
    ("Between", Operator::Between),
    ("IsNull", Operator::IsNull),
    ("IsFalse", Operator::False),
    ("Equals", Operator::Eq),
    ("IsTrue", Operator::True),
    ("False", Operator::False),
    ("True", Operator::True),
    ("IsNot", Operator::Neq),
    ("Null", Operator::IsNull),
    ("Not", Operator::Neq),
    ("Is", Operator::Eq),
];

/// A resolved property path: hops from the root element, then the property key
#[derive(Debug)]
struct PropertyPath {
    hops: Vec<Step>,
    key: String,
}

/// A method name compiled into a traversal with argument slots
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedQuery {
    pub method: String,
    pub entity: String,
    pub subject: QuerySubject,
    pub traversal: Traversal,
    /// Number of call arguments the method takes
    pub arity: usize,
}

impl DerivedQuery {
    /// Substitute call arguments into the planned traversal
    pub fn bind(&self, args: &[PropertyValue]) -> Result<Traversal, QueryError> {
        if args.len() != self.arity {
            return Err(QueryError::ArgumentCountMismatch {
                expected: self.arity,
                actual: args.len(),
            });
        }
        Ok(self.traversal.bind(args))
    }

    /// Bind and run against the session's graph
    pub fn execute(&self, session: &GraphSession, args: &[PropertyValue]) -> OgmResult<Vec<ElementRef>> {
        let traversal = self.bind(args)?;
        trace!(method = %self.method, traversal = %traversal, "executing derived query");
        traversal::execute(session.graph()?, &traversal)
    }
}

/// Parses method names against the registered descriptors
#[derive(Debug, Clone)]
pub struct QueryDerivationEngine {
    registry: Arc<DescriptorRegistry>,
}

impl QueryDerivationEngine {
    pub fn new(registry: Arc<DescriptorRegistry>) -> Self {
        Self { registry }
    }

    /// Whether `method` starts with a recognised subject prefix
    pub fn is_derivable(method: &str) -> bool {
        SUBJECTS.iter().any(|(prefix, _)| method.starts_with(prefix))
    }

    /// Compile `method` for the repository of `entity`
    pub fn derive(&self, entity: &str, method: &str) -> Result<DerivedQuery, QueryError> {
        let descriptor = self.registry.get(entity).ok_or_else(|| QueryError::UnresolvableQueryPath {
            entity: entity.to_string(),
            path: method.to_string(),
            segment: entity.to_string(),
        })?;

        let (subject, body) = SUBJECTS
            .iter()
            .find_map(|(prefix, subject)| method.strip_prefix(prefix).map(|body| (*subject, body)))
            .ok_or_else(|| QueryError::UnparsableMethodName(method.to_string()))?;
        if body.is_empty() {
            return Err(QueryError::UnparsableMethodName(method.to_string()));
        }

        let mut slots = 0;
        let mut alternatives = Vec::new();
        for alternative in split_keyword(body, "Or") {
            let mut filters = Vec::new();
            for criterion in split_keyword(alternative, "And") {
                if criterion.is_empty() {
                    return Err(QueryError::UnparsableMethodName(method.to_string()));
                }
                let (path, operator) = self.criterion(descriptor, criterion)?;
                let has = Step::Has {
                    key: path.key,
                    predicate: Some(operator.predicate(slots)),
                };
                slots += operator.arity();

                if path.hops.is_empty() {
                    filters.push(has);
                } else {
                    // hops run in a sub-traversal so the root element is kept
                    let mut steps = path.hops;
                    steps.push(has);
                    filters.push(Step::And(vec![Traversal::from_steps(steps)]));
                }
            }
            alternatives.push(filters);
        }

        let label = descriptor.label().unwrap_or(&descriptor.name).to_string();
        let mut traversal = Traversal::new();
        traversal = if descriptor.is_edge() {
            traversal.then(Step::E(Vec::new()))
        } else {
            traversal.then(Step::V(Vec::new()))
        };
        traversal = traversal.then(Step::HasLabel(vec![label]));

        if alternatives.len() == 1 {
            for filter in alternatives.pop().into_iter().flatten() {
                traversal = traversal.then(filter);
            }
        } else {
            traversal = traversal.then(Step::Or(alternatives.into_iter().map(Traversal::from_steps).collect()));
        }

        trace!(entity, method, traversal = %traversal, arity = slots, "derived query planned");
        Ok(DerivedQuery {
            method: method.to_string(),
            entity: entity.to_string(),
            subject,
            traversal,
            arity: slots,
        })
    }

    /// Split one criterion into its property path and operator
    fn criterion(&self, descriptor: &EntityDescriptor, criterion: &str) -> Result<(PropertyPath, Operator), QueryError> {
        let whole = match self.resolve_path(descriptor, criterion) {
            Ok(path) => return Ok((path, Operator::Eq)),
            Err(error) => error,
        };

        let mut first_error = None;
        for (suffix, operator) in OPERATORS {
            let Some(path) = criterion.strip_suffix(suffix).filter(|p| !p.is_empty()) else {
                continue;
            };
            match self.resolve_path(descriptor, path) {
                Ok(resolved) => return Ok((resolved, *operator)),
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        Err(first_error.unwrap_or(whole))
    }

    fn resolve_path(&self, root: &EntityDescriptor, path: &str) -> Result<PropertyPath, QueryError> {
        let config = self.registry.config();
        let unresolvable = |segment: &str| QueryError::UnresolvableQueryPath {
            entity: root.name.clone(),
            path: path.to_string(),
            segment: segment.to_string(),
        };

        let segments: Vec<&str> = path.split('_').collect();
        let mut current = root;
        let mut prefix = String::new();
        let mut hops = Vec::new();

        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();
            match current.resolve_segment(segment) {
                Some(FieldDescriptor::Property(property)) if last => {
                    return Ok(PropertyPath {
                        hops,
                        key: config.embedded_key(&prefix, &property.name),
                    });
                }
                Some(FieldDescriptor::Embedded(embedded)) if !last => {
                    prefix = config.embedded_key(&prefix, &embedded.field);
                    current = &embedded.descriptor;
                }
                Some(FieldDescriptor::Relationship(relationship)) if !last => {
                    let target = self
                        .registry
                        .get(&relationship.target)
                        .ok_or_else(|| unresolvable(segment))?;
                    let labels = vec![relationship.label.clone()];
                    if current.shares_edges(relationship) {
                        // only the edges this field holds
                        hops.push(match relationship.direction {
                            Direction::Out => Step::OutE(labels),
                            Direction::In => Step::InE(labels),
                            Direction::Both => Step::BothE(labels),
                        });
                        hops.push(Step::Has {
                            key: FIELDS_KEY.to_string(),
                            predicate: Some(Predicate::Containing(Value::Literal(PropertyValue::from(
                                relationship.field.as_str(),
                            )))),
                        });
                        if !target.is_edge() {
                            hops.push(match relationship.direction {
                                Direction::Out => Step::InV,
                                Direction::In => Step::OutV,
                                Direction::Both => Step::OtherV,
                            });
                        }
                    } else {
                        hops.push(match (target.is_edge(), relationship.direction) {
                            (false, Direction::Out) => Step::Out(labels),
                            (false, Direction::In) => Step::In(labels),
                            (false, Direction::Both) => Step::Both(labels),
                            (true, Direction::Out) => Step::OutE(labels),
                            (true, Direction::In) => Step::InE(labels),
                            (true, Direction::Both) => Step::BothE(labels),
                        });
                    }
                    current = target;
                    prefix.clear();
                }
                Some(FieldDescriptor::Endpoint(endpoint, direction)) if !last => {
                    hops.push(match direction {
                        Direction::In => Step::InV,
                        Direction::Out | Direction::Both => Step::OutV,
                    });
                    current = self.registry.get(&endpoint.entity).ok_or_else(|| unresolvable(segment))?;
                }
                _ => return Err(unresolvable(segment)),
            }
        }
        Err(unresolvable(path))
    }
}

/// Split on `keyword` where it starts a new capitalised word
fn split_keyword<'a>(body: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut search = 1;
    while let Some(offset) = body.get(search..).and_then(|rest| rest.find(keyword)) {
        let at = search + offset;
        let after = at + keyword.len();
        let boundary = body[after..].chars().next().is_some_and(|c| c.is_ascii_uppercase());
        if boundary && at > start {
            parts.push(&body[start..at]);
            start = after;
        }
        search = at + 1;
    }
    parts.push(&body[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OgmConfig;
    use crate::descriptor::{EndpointDescriptor, PropertyKind, RelationshipDescriptor};

    fn engine() -> QueryDerivationEngine {
        let address = EntityDescriptor::embedded("Address").property("city", PropertyKind::String);
        let registry = DescriptorRegistry::builder(OgmConfig::default())
            .register(
                EntityDescriptor::vertex("Person")
                    .property("firstName", PropertyKind::String)
                    .property("age", PropertyKind::Integer)
                    .property("active", PropertyKind::Boolean)
                    .embed("address", address)
                    .relationship(RelationshipDescriptor::set("pets", "OWNS", "Pet")),
            )
            .register(EntityDescriptor::vertex("Pet").property("name", PropertyKind::String))
            .register(
                EntityDescriptor::edge(
                    "Likes",
                    EndpointDescriptor::new("person1", "Person"),
                    EndpointDescriptor::new("person2", "Person"),
                )
                .property("date", PropertyKind::Date),
            )
            .build()
            .unwrap();
        QueryDerivationEngine::new(registry)
    }

    #[test]
    fn test_endpoint_path_on_edge_entity() {
        let query = engine().derive("Likes", "findByPerson1_FirstName").unwrap();

        assert_eq!(query.subject, QuerySubject::Find);
        assert_eq!(query.arity, 1);
        assert_eq!(
            query.traversal.to_string(),
            "g.E().hasLabel('Likes').and(__.outV().has('firstName', ?))"
        );
    }

    #[test]
    fn test_and_or_with_operators() {
        let query = engine()
            .derive("Person", "findByFirstNameAndAgeGreaterThanOrActiveTrue")
            .unwrap();

        assert_eq!(query.arity, 2);
        assert_eq!(
            query.traversal.to_string(),
            "g.V().hasLabel('Person').or(__.has('firstName', ?).has('age', gt(?)), __.has('active', true))"
        );
    }

    #[test]
    fn test_embedded_and_relationship_paths() {
        let engine = engine();

        let by_city = engine.derive("Person", "countByAddress_City").unwrap();
        assert_eq!(by_city.subject, QuerySubject::Count);
        assert_eq!(by_city.traversal.to_string(), "g.V().hasLabel('Person').has('address_city', ?)");

        let by_pet = engine.derive("Person", "existsByPets_NameStartingWith").unwrap();
        assert_eq!(by_pet.subject, QuerySubject::Exists);
        assert_eq!(
            by_pet.traversal.to_string(),
            "g.V().hasLabel('Person').and(__.out('OWNS').has('name', startingWith(?)))"
        );
    }

    #[test]
    fn test_path_through_field_sharing_a_label_filters_on_holder() {
        let registry = DescriptorRegistry::builder(OgmConfig::default())
            .register(
                EntityDescriptor::vertex("Person")
                    .relationship(RelationshipDescriptor::single("owns", "owns", "House"))
                    .relationship(RelationshipDescriptor::set("owned", "owns", "House")),
            )
            .register(EntityDescriptor::vertex("House").property("rooms", PropertyKind::Integer))
            .build()
            .unwrap();

        let query = QueryDerivationEngine::new(registry)
            .derive("Person", "findByOwned_Rooms")
            .unwrap();
        assert_eq!(
            query.traversal.to_string(),
            "g.V().hasLabel('Person').and(__.outE('owns').has('_fields', containing('owned')).inV().has('rooms', ?))"
        );
    }

    #[test]
    fn test_between_takes_two_slots() {
        let query = engine().derive("Person", "findByAgeBetweenAndFirstNameIsNotNull").unwrap();
        assert_eq!(query.arity, 2);
        assert!(matches!(
            query.bind(&[1.into()]),
            Err(QueryError::ArgumentCountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_unknown_segments_and_prefixes() {
        let engine = engine();

        assert!(matches!(
            engine.derive("Person", "findByNickname"),
            Err(QueryError::UnresolvableQueryPath { segment, .. }) if segment == "Nickname"
        ));
        assert!(matches!(
            engine.derive("Person", "findByPets_Colour"),
            Err(QueryError::UnresolvableQueryPath { segment, .. }) if segment == "Colour"
        ));
        assert!(matches!(
            engine.derive("Person", "removeByFirstName"),
            Err(QueryError::UnparsableMethodName(_))
        ));
        assert!(matches!(engine.derive("Person", "findBy"), Err(QueryError::UnparsableMethodName(_))));
    }

    #[test]
    fn test_split_keyword_needs_capital_boundary() {
        assert_eq!(split_keyword("ColorOrSize", "Or"), vec!["Color", "Size"]);
        assert_eq!(split_keyword("OrderNumber", "Or"), vec!["OrderNumber"]);
        assert_eq!(split_keyword("ColorOrange", "Or"), vec!["ColorOrange"]);
        assert_eq!(split_keyword("FirstNameAndAge", "And"), vec!["FirstName", "Age"]);
    }
}
