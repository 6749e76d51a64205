//! Method classification and call routing

use super::{Argument, CrudOperation, MethodDeclaration, MethodOutput, RepositoryDescriptor};
use crate::descriptor::{DescriptorRegistry, EntityDescriptor};
use crate::errors::{ConfigurationError, OgmResult, QueryError};
use crate::mapping::{EntityMapper, EntityRecord};
use crate::queries::{CompiledTemplate, DerivedQuery, QueryDerivationEngine, QuerySubject, QueryTemplateEngine};
use crate::session::GraphSession;
use crate::store::ElementRef;
use crate::value_objects::{ElementId, PropertyValue, SaveMode};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// How a repository method is answered
#[derive(Debug, Clone)]
pub enum MethodHandler {
    Crud(CrudOperation),
    Derived(DerivedQuery),
    Template(CompiledTemplate),
}

/// Routes repository calls through a dispatch table fixed at construction
#[derive(Debug, Clone)]
pub struct RepositoryDispatcher {
    entity: String,
    mapper: EntityMapper,
    handlers: IndexMap<String, MethodHandler>,
}

impl RepositoryDispatcher {
    /// Classify every method of `descriptor`
    ///
    /// CRUD names are matched first, then templates, then the method name is
    /// derived. Any failure aborts construction.
    pub fn new(registry: Arc<DescriptorRegistry>, descriptor: &RepositoryDescriptor) -> Result<Self, ConfigurationError> {
        if registry.get(&descriptor.entity).is_none() {
            return Err(ConfigurationError::UnknownEntity(descriptor.entity.clone()));
        }

        let mut handlers: IndexMap<String, MethodHandler> = CrudOperation::ALL
            .into_iter()
            .map(|op| (op.method_name().to_string(), MethodHandler::Crud(op)))
            .collect();

        let derivation = QueryDerivationEngine::new(registry.clone());
        let templates = QueryTemplateEngine::new();
        let mut declared = HashSet::new();

        for method in &descriptor.methods {
            let name = method.name();
            if !declared.insert(name) {
                return Err(ConfigurationError::DuplicateMethod(name.to_string()));
            }
            if CrudOperation::from_method_name(name).is_some() {
                if matches!(method, MethodDeclaration::Template { .. }) {
                    warn!(entity = %descriptor.entity, method = name, "template ignored on a CRUD method");
                }
                continue;
            }

            let unsupported = |source: QueryError| ConfigurationError::UnsupportedRepositoryMethod {
                entity: descriptor.entity.clone(),
                method: name.to_string(),
                source,
            };
            let handler = match method {
                MethodDeclaration::Template { expression, .. } => {
                    MethodHandler::Template(templates.compile(expression).map_err(unsupported)?)
                }
                MethodDeclaration::Derived(_) => {
                    if !QueryDerivationEngine::is_derivable(name) {
                        return Err(unsupported(QueryError::UnparsableMethodName(name.to_string())));
                    }
                    MethodHandler::Derived(derivation.derive(&descriptor.entity, name).map_err(unsupported)?)
                }
            };
            debug!(entity = %descriptor.entity, method = name, handler = handler.kind(), "repository method classified");
            handlers.insert(name.to_string(), handler);
        }

        Ok(Self {
            entity: descriptor.entity.clone(),
            mapper: EntityMapper::new(registry),
            handlers,
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn mapper(&self) -> &EntityMapper {
        &self.mapper
    }

    pub fn handler(&self, method: &str) -> Option<&MethodHandler> {
        self.handlers.get(method)
    }

    /// Method names in classification order, CRUD first
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Call `method` with `args` inside the session's transaction
    pub fn invoke(&self, session: &mut GraphSession, method: &str, args: &[Argument]) -> OgmResult<MethodOutput> {
        let handler = self
            .handlers
            .get(method)
            .ok_or_else(|| QueryError::UnknownMethod(method.to_string()))?;
        trace!(entity = %self.entity, method, args = args.len(), "invoking repository method");

        match handler {
            MethodHandler::Crud(op) => self.crud(session, *op, args),
            MethodHandler::Derived(query) => {
                let values = values(method, args)?;
                let elements = query.execute(session, &values)?;
                match query.subject {
                    QuerySubject::Find => Ok(MethodOutput::Entities(self.hydrate_all(session, elements)?)),
                    QuerySubject::Count => Ok(MethodOutput::Count(elements.len())),
                    QuerySubject::Exists => Ok(MethodOutput::Exists(!elements.is_empty())),
                }
            }
            MethodHandler::Template(template) => {
                let values = values(method, args)?;
                let elements = QueryTemplateEngine::new().execute(session, template, &values)?;
                Ok(MethodOutput::Entities(self.hydrate_all(session, elements)?))
            }
        }
    }

    fn crud(&self, session: &mut GraphSession, op: CrudOperation, args: &[Argument]) -> OgmResult<MethodOutput> {
        let method = op.method_name();
        match (op, args) {
            (CrudOperation::Save, [Argument::Entity(record)]) => {
                self.check_entity(method, record)?;
                let saved = self.mapper.save(session, record, SaveMode::default())?;
                Ok(MethodOutput::Entity(saved))
            }
            (CrudOperation::SaveAll, [Argument::Entities(records)]) => {
                let mut saved = Vec::with_capacity(records.len());
                for record in records {
                    self.check_entity(method, record)?;
                    saved.push(self.mapper.save(session, record, SaveMode::default())?);
                }
                Ok(MethodOutput::Entities(saved))
            }
            (CrudOperation::Delete, [Argument::Entity(record)]) => {
                self.check_entity(method, record)?;
                self.mapper.delete(session, record)?;
                Ok(MethodOutput::Unit)
            }
            (CrudOperation::DeleteById, [Argument::Value(id)]) => {
                self.mapper.delete_by_id(session, &self.entity, element_id(method, id)?)?;
                Ok(MethodOutput::Unit)
            }
            (CrudOperation::DeleteAll, []) => {
                let ids = self.all_ids(session)?;
                for id in ids {
                    // earlier cascades may already have removed this one
                    self.mapper.delete_by_id(session, &self.entity, id)?;
                }
                Ok(MethodOutput::Unit)
            }
            (CrudOperation::DeleteAll, [Argument::Entities(records)]) => {
                for record in records {
                    self.check_entity(method, record)?;
                    self.mapper.delete(session, record)?;
                }
                Ok(MethodOutput::Unit)
            }
            (CrudOperation::FindById, [Argument::Value(id)]) => {
                let found = self.mapper.find_by_id(session, &self.entity, element_id(method, id)?)?;
                Ok(MethodOutput::Optional(found))
            }
            (CrudOperation::FindAll, []) => Ok(MethodOutput::Entities(self.mapper.find_all(session, &self.entity)?)),
            (CrudOperation::ExistsById, [Argument::Value(id)]) => {
                let id = element_id(method, id)?;
                let descriptor = self.descriptor()?;
                let element = element_ref(descriptor, id);
                let label = session.graph()?.label(element)?;
                Ok(MethodOutput::Exists(label.as_deref() == descriptor.label()))
            }
            (CrudOperation::Count, []) => Ok(MethodOutput::Count(self.all_ids(session)?.len())),
            _ => Err(QueryError::InvalidArgument {
                method: method.to_string(),
                reason: format!("unexpected arguments {}", describe(args)),
            }
            .into()),
        }
    }

    fn descriptor(&self) -> OgmResult<&EntityDescriptor> {
        Ok(self.mapper.descriptor(&self.entity)?)
    }

    fn all_ids(&self, session: &GraphSession) -> OgmResult<Vec<ElementId>> {
        let descriptor = self.descriptor()?;
        let label = descriptor.label();
        let graph = session.graph()?;
        let ids = if descriptor.is_edge() {
            graph.edges(label)?
        } else {
            graph.vertices(label)?
        };
        Ok(ids)
    }

    /// Hydrate query results, skipping elements of other entities
    fn hydrate_all(&self, session: &mut GraphSession, elements: Vec<ElementRef>) -> OgmResult<Vec<Arc<EntityRecord>>> {
        let descriptor = self.descriptor()?;
        let expected = descriptor.label().map(str::to_string);
        let edge = descriptor.is_edge();

        let mut records = Vec::with_capacity(elements.len());
        for element in elements {
            let label = session.graph()?.label(element)?;
            if element.is_vertex() == edge || label != expected {
                debug!(entity = %self.entity, element = %element.id(), ?label, "skipping element of another entity");
                continue;
            }
            records.push(self.mapper.load(session, &self.entity, element)?);
        }
        Ok(records)
    }

    fn check_entity(&self, method: &str, record: &EntityRecord) -> Result<(), QueryError> {
        if record.entity == self.entity {
            return Ok(());
        }
        Err(QueryError::InvalidArgument {
            method: method.to_string(),
            reason: format!("expected a {} record, got {}", self.entity, record.entity),
        })
    }
}

impl MethodHandler {
    pub fn kind(&self) -> &'static str {
        match self {
            MethodHandler::Crud(_) => "crud",
            MethodHandler::Derived(_) => "derived",
            MethodHandler::Template(_) => "template",
        }
    }
}

fn element_ref(descriptor: &EntityDescriptor, id: ElementId) -> ElementRef {
    if descriptor.is_edge() {
        ElementRef::Edge(id)
    } else {
        ElementRef::Vertex(id)
    }
}

fn element_id(method: &str, value: &PropertyValue) -> Result<ElementId, QueryError> {
    let invalid = || QueryError::InvalidArgument {
        method: method.to_string(),
        reason: format!("{} is not an element id", value),
    };
    match value {
        PropertyValue::String(raw) => raw.parse().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn values(method: &str, args: &[Argument]) -> Result<Vec<PropertyValue>, QueryError> {
    args.iter()
        .map(|arg| match arg {
            Argument::Value(value) => Ok(value.clone()),
            other => Err(QueryError::InvalidArgument {
                method: method.to_string(),
                reason: format!("query arguments must be values, got {}", describe(std::slice::from_ref(other))),
            }),
        })
        .collect()
}

fn describe(args: &[Argument]) -> String {
    let kinds: Vec<&str> = args
        .iter()
        .map(|arg| match arg {
            Argument::Value(_) => "value",
            Argument::Entity(_) => "entity",
            Argument::Entities(_) => "entities",
        })
        .collect();
    format!("[{}]", kinds.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{EndpointDescriptor, PropertyKind};
    use crate::errors::OgmError;
    use crate::store::InMemoryGraphStore;
    use crate::OgmConfig;

    fn registry() -> Arc<DescriptorRegistry> {
        DescriptorRegistry::builder(OgmConfig::default())
            .register(
                EntityDescriptor::vertex("Person")
                    .required_property("firstName", PropertyKind::String)
                    .property("age", PropertyKind::Integer),
            )
            .register(
                EntityDescriptor::edge(
                    "Likes",
                    EndpointDescriptor::new("person1", "Person"),
                    EndpointDescriptor::new("person2", "Person"),
                )
                .property("date", PropertyKind::Date),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_methods_are_classified_in_order() {
        let descriptor = RepositoryDescriptor::new("Person")
            .derived("findByFirstName")
            .derived("countByAgeGreaterThan")
            .template("findAll", "g.V()")
            .template("findOlderThan", "g.V().has('age', gt(?))");

        let dispatcher = RepositoryDispatcher::new(registry(), &descriptor).unwrap();

        assert!(matches!(dispatcher.handler("findAll"), Some(MethodHandler::Crud(CrudOperation::FindAll))));
        assert!(matches!(dispatcher.handler("findByFirstName"), Some(MethodHandler::Derived(q)) if q.arity == 1));
        assert!(matches!(
            dispatcher.handler("countByAgeGreaterThan"),
            Some(MethodHandler::Derived(q)) if q.subject == QuerySubject::Count
        ));
        assert!(matches!(dispatcher.handler("findOlderThan"), Some(MethodHandler::Template(t)) if t.placeholders() == 1));
        assert_eq!(dispatcher.methods().count(), CrudOperation::ALL.len() + 3);
    }

    #[test]
    fn test_unclassifiable_methods_fail_construction() {
        let unparsable = RepositoryDescriptor::new("Person").derived("lookupEveryone");
        assert!(matches!(
            RepositoryDispatcher::new(registry(), &unparsable),
            Err(ConfigurationError::UnsupportedRepositoryMethod {
                source: QueryError::UnparsableMethodName(_),
                ..
            })
        ));

        let unresolvable = RepositoryDescriptor::new("Person").derived("findByNickname");
        assert!(matches!(
            RepositoryDispatcher::new(registry(), &unresolvable),
            Err(ConfigurationError::UnsupportedRepositoryMethod {
                source: QueryError::UnresolvableQueryPath { .. },
                ..
            })
        ));

        let broken = RepositoryDescriptor::new("Person").template("findBroken", "g.V().has('age'");
        assert!(matches!(
            RepositoryDispatcher::new(registry(), &broken),
            Err(ConfigurationError::UnsupportedRepositoryMethod {
                source: QueryError::TemplateParseError { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_and_unknown_entity_fail_construction() {
        let duplicate = RepositoryDescriptor::new("Person")
            .derived("findByFirstName")
            .template("findByFirstName", "g.V()");
        assert!(matches!(
            RepositoryDispatcher::new(registry(), &duplicate),
            Err(ConfigurationError::DuplicateMethod(name)) if name == "findByFirstName"
        ));

        assert!(matches!(
            RepositoryDispatcher::new(registry(), &RepositoryDescriptor::new("Robot")),
            Err(ConfigurationError::UnknownEntity(name)) if name == "Robot"
        ));
    }

    #[test]
    fn test_invoke_crud_and_derived() {
        let store = InMemoryGraphStore::new();
        let mut session = GraphSession::open(&store).unwrap();
        session.begin().unwrap();
        let dispatcher =
            RepositoryDispatcher::new(registry(), &RepositoryDescriptor::new("Person").derived("existsByFirstName")).unwrap();

        let saved = match dispatcher
            .invoke(
                &mut session,
                "save",
                &[EntityRecord::new("Person").set("firstName", "Graham").into()],
            )
            .unwrap()
        {
            MethodOutput::Entity(record) => record,
            other => panic!("unexpected output {other:?}"),
        };
        let id = saved.id.unwrap();

        assert!(matches!(
            dispatcher.invoke(&mut session, "existsById", &[id.into()]).unwrap(),
            MethodOutput::Exists(true)
        ));
        assert!(matches!(
            dispatcher.invoke(&mut session, "existsByFirstName", &[PropertyValue::from("Graham").into()]).unwrap(),
            MethodOutput::Exists(true)
        ));
        assert!(matches!(dispatcher.invoke(&mut session, "count", &[]).unwrap(), MethodOutput::Count(1)));

        dispatcher.invoke(&mut session, "deleteById", &[id.into()]).unwrap();
        assert!(matches!(
            dispatcher.invoke(&mut session, "findById", &[id.into()]).unwrap(),
            MethodOutput::Optional(None)
        ));
    }

    #[test]
    fn test_invoke_rejects_bad_calls() {
        let store = InMemoryGraphStore::new();
        let mut session = GraphSession::open(&store).unwrap();
        session.begin().unwrap();
        let dispatcher = RepositoryDispatcher::new(registry(), &RepositoryDescriptor::new("Person")).unwrap();

        assert!(matches!(
            dispatcher.invoke(&mut session, "findByAge", &[]),
            Err(OgmError::Query(QueryError::UnknownMethod(_)))
        ));
        assert!(matches!(
            dispatcher.invoke(&mut session, "findById", &[PropertyValue::from("not-an-id").into()]),
            Err(OgmError::Query(QueryError::InvalidArgument { .. }))
        ));
        assert!(matches!(
            dispatcher.invoke(&mut session, "save", &[EntityRecord::new("Likes").into()]),
            Err(OgmError::Query(QueryError::InvalidArgument { .. }))
        ));
    }

    #[test]
    fn test_template_results_of_other_entities_are_skipped() {
        let store = InMemoryGraphStore::new();
        let mut session = GraphSession::open(&store).unwrap();
        session.begin().unwrap();
        let descriptor = RepositoryDescriptor::new("Person").template("findEverything", "g.V()");
        let dispatcher = RepositoryDispatcher::new(registry(), &descriptor).unwrap();

        dispatcher
            .invoke(&mut session, "save", &[EntityRecord::new("Person").set("firstName", "Graham").into()])
            .unwrap();
        session.graph_mut().unwrap().add_vertex("Robot").unwrap();

        match dispatcher.invoke(&mut session, "findEverything", &[]).unwrap() {
            MethodOutput::Entities(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].string("firstName"), "Graham");
            }
            other => panic!("unexpected output {other:?}"),
        }
    }
}
