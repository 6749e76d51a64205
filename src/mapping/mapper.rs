//! Entity mapper
//!
//! Saving goes in two phases. `to_graph_element` validates a record and plans
//! every write as an `ElementMutation` without touching the graph; `apply`
//! then executes the plan through the session. Loading walks the graph from
//! one element, consulting the session's identity map so an element is
//! hydrated once per transaction at a given fetch depth.

use super::mutation::{ElementMutation, ElementTarget, PropertyOperation, RelationshipMutation, TargetRef};
use super::record::{EntityRecord, FieldValue};
use crate::config::OgmConfig;
use crate::descriptor::{DescriptorRegistry, EndpointDescriptor, EntityDescriptor, EntityKind, RelationshipDescriptor};
use crate::errors::{MappingError, OgmResult, ValidationError};
use crate::relationships::RelationshipResolver;
use crate::session::GraphSession;
use crate::store::ElementRef;
use crate::value_objects::{Direction, ElementId, FetchMode, PropertyValue, SaveMode};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Elements currently being hydrated along one load path
#[derive(Debug, Default)]
pub(crate) struct FetchContext {
    in_progress: HashSet<ElementId>,
}

/// Converts between entity records and graph elements
#[derive(Debug, Clone)]
pub struct EntityMapper {
    registry: Arc<DescriptorRegistry>,
}

impl EntityMapper {
    pub fn new(registry: Arc<DescriptorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OgmConfig {
        self.registry.config()
    }

    pub fn descriptor(&self, entity: &str) -> Result<&EntityDescriptor, MappingError> {
        self.registry
            .get(entity)
            .ok_or_else(|| MappingError::UnknownEntity(entity.to_string()))
    }

    /// Check a record against its descriptor without planning any write
    pub fn validate(&self, record: &EntityRecord) -> OgmResult<()> {
        let descriptor = self.descriptor(&record.entity)?;
        validate_record(descriptor, record)?;
        Ok(())
    }

    /// Plan the writes that persist `record`
    ///
    /// Null or absent properties plan a removal. Relationship fields that are
    /// absent or unloaded are left out, so their edges stay as they are.
    pub fn to_graph_element(&self, record: &EntityRecord) -> OgmResult<ElementMutation> {
        self.plan(record, None, false)
    }

    fn plan(&self, record: &EntityRecord, owner_side: Option<Direction>, cascade: bool) -> OgmResult<ElementMutation> {
        let descriptor = self.descriptor(&record.entity)?;
        validate_record(descriptor, record)?;

        let mut operations = Vec::new();
        self.flatten(descriptor, Some(record), "", &mut operations);

        let element = match &descriptor.kind {
            EntityKind::Vertex { label } => ElementTarget::Vertex {
                id: record.id,
                label: label.clone(),
            },
            EntityKind::Edge { label, source, target } => ElementTarget::Edge {
                id: record.id,
                label: label.clone(),
                source: Box::new(self.endpoint_ref(
                    descriptor,
                    record,
                    source,
                    owner_side == Some(Direction::Out),
                    cascade,
                )?),
                target: Box::new(self.endpoint_ref(
                    descriptor,
                    record,
                    target,
                    owner_side == Some(Direction::In),
                    cascade,
                )?),
            },
            EntityKind::Embedded => return Err(MappingError::UnknownEntity(descriptor.name.clone()).into()),
        };

        let mut relationships = Vec::new();
        for relationship in &descriptor.relationships {
            let targets: Vec<&Arc<EntityRecord>> =
                match (record.field(&relationship.field), relationship.cardinality.is_collection()) {
                    (None | Some(FieldValue::Unloaded), _) => continue,
                    (Some(FieldValue::One(target)), false) => target.iter().collect(),
                    (Some(FieldValue::Many(targets)), true) => targets.iter().collect(),
                    (Some(_), true) => {
                        return Err(shape(descriptor, &relationship.field, "expected a collection of targets").into())
                    }
                    (Some(_), false) => return Err(shape(descriptor, &relationship.field, "expected a single target").into()),
                };

            let targets = targets
                .into_iter()
                .map(|target| self.relationship_target(descriptor, relationship, target))
                .collect::<OgmResult<Vec<_>>>()?;
            relationships.push(RelationshipMutation {
                field: relationship.field.clone(),
                targets,
            });
        }

        Ok(ElementMutation {
            entity: descriptor.name.clone(),
            element,
            operations,
            relationships,
        })
    }

    fn flatten(
        &self,
        descriptor: &EntityDescriptor,
        record: Option<&EntityRecord>,
        prefix: &str,
        operations: &mut Vec<PropertyOperation>,
    ) {
        let config = self.config();
        for property in &descriptor.properties {
            let key = config.embedded_key(prefix, &property.name);
            match record.and_then(|r| r.property(&property.name)) {
                Some(value) if !value.is_null() => operations.push(PropertyOperation::Set {
                    key,
                    value: value.clone(),
                }),
                _ => operations.push(PropertyOperation::Remove { key }),
            }
        }
        for embedded in &descriptor.embedded {
            let nested_prefix = config.embedded_key(prefix, &embedded.field);
            let nested = record.and_then(|r| r.embedded(&embedded.field));
            // the embedded key itself marks a present value, even one whose fields are all null
            operations.push(match nested {
                Some(_) => PropertyOperation::Set {
                    key: nested_prefix.clone(),
                    value: PropertyValue::Boolean(true),
                },
                None => PropertyOperation::Remove {
                    key: nested_prefix.clone(),
                },
            });
            self.flatten(&embedded.descriptor, nested, &nested_prefix, operations);
        }
    }

    fn endpoint_ref(
        &self,
        descriptor: &EntityDescriptor,
        record: &EntityRecord,
        endpoint: &EndpointDescriptor,
        is_owner: bool,
        cascade: bool,
    ) -> OgmResult<TargetRef> {
        if is_owner {
            return Ok(TargetRef::Owner);
        }
        match record.field(&endpoint.field) {
            Some(FieldValue::One(Some(target))) => {
                if target.entity != endpoint.entity {
                    return Err(shape(
                        descriptor,
                        &endpoint.field,
                        format!("expected {}, got {}", endpoint.entity, target.entity),
                    )
                    .into());
                }
                match target.id {
                    Some(id) => Ok(TargetRef::Persisted(id)),
                    None if endpoint.cascade_save || cascade => {
                        Ok(TargetRef::Cascade(Box::new(self.plan(target, None, false)?)))
                    }
                    None => Err(MappingError::MissingIdentifier {
                        entity: descriptor.name.clone(),
                        field: endpoint.field.clone(),
                        target: endpoint.entity.clone(),
                    }
                    .into()),
                }
            }
            Some(FieldValue::One(None) | FieldValue::Unloaded) | None => Err(MappingError::MissingEndpoint {
                entity: descriptor.name.clone(),
                endpoint: endpoint.field.clone(),
            }
            .into()),
            Some(_) => Err(shape(descriptor, &endpoint.field, "expected a single endpoint").into()),
        }
    }

    fn relationship_target(
        &self,
        owner: &EntityDescriptor,
        relationship: &RelationshipDescriptor,
        target: &EntityRecord,
    ) -> OgmResult<TargetRef> {
        if target.entity != relationship.target {
            return Err(shape(
                owner,
                &relationship.field,
                format!("expected {}, got {}", relationship.target, target.entity),
            )
            .into());
        }
        let target_descriptor = self.descriptor(&relationship.target)?;

        match target.id {
            // persisted targets are linked, never re-saved
            Some(id) => Ok(TargetRef::Persisted(id)),
            None if target_descriptor.is_edge() => {
                let owner_side = match relationship.direction {
                    Direction::In => Direction::In,
                    Direction::Out | Direction::Both => Direction::Out,
                };
                let mutation = self.plan(target, Some(owner_side), relationship.cascade_save)?;
                Ok(TargetRef::Cascade(Box::new(mutation)))
            }
            None if relationship.cascade_save => Ok(TargetRef::Cascade(Box::new(self.plan(target, None, false)?))),
            None => Err(MappingError::MissingIdentifier {
                entity: owner.name.clone(),
                field: relationship.field.clone(),
                target: relationship.target.clone(),
            }
            .into()),
        }
    }

    /// Execute a planned mutation; `owner` fills `TargetRef::Owner` endpoints
    pub fn apply(
        &self,
        session: &mut GraphSession,
        mutation: &ElementMutation,
        owner: Option<ElementId>,
        mode: SaveMode,
    ) -> OgmResult<ElementId> {
        let descriptor = self.descriptor(&mutation.entity)?;

        let element = match &mutation.element {
            ElementTarget::Vertex { id: Some(id), .. } => {
                self.verify_vertex(session, descriptor, *id)?;
                ElementRef::Vertex(*id)
            }
            ElementTarget::Vertex { id: None, label } => ElementRef::Vertex(session.graph_mut()?.add_vertex(label)?),
            ElementTarget::Edge {
                id,
                label,
                source,
                target,
            } => {
                let (source_endpoint, target_endpoint) = descriptor
                    .endpoints()
                    .ok_or_else(|| shape(descriptor, "<element>", "edge mutation on a vertex entity"))?;
                let source_id = self.resolve_endpoint(session, descriptor, source_endpoint, source, owner, mode)?;
                let target_id = self.resolve_endpoint(session, descriptor, target_endpoint, target, owner, mode)?;

                match id {
                    Some(id) => {
                        let edge = session
                            .graph()?
                            .edge(*id)?
                            .ok_or(MappingError::ElementNotFound(*id))?;
                        check_label(descriptor, *id, &edge.label)?;
                        for (endpoint, stored, wanted) in [
                            (source_endpoint, edge.out_vertex, source_id),
                            (target_endpoint, edge.in_vertex, target_id),
                        ] {
                            if stored != wanted {
                                return Err(MappingError::ImmutableEndpoint {
                                    entity: descriptor.name.clone(),
                                    endpoint: endpoint.field.clone(),
                                }
                                .into());
                            }
                        }
                        ElementRef::Edge(*id)
                    }
                    None => ElementRef::Edge(session.graph_mut()?.add_edge(label, source_id, target_id)?),
                }
            }
        };

        let graph = session.graph_mut()?;
        for operation in &mutation.operations {
            match operation {
                PropertyOperation::Set { key, value } => graph.set_property(element, key, value.clone())?,
                PropertyOperation::Remove { key } => graph.remove_property(element, key)?,
            }
        }

        if !mutation.relationships.is_empty() {
            RelationshipResolver::new(self).save(session, descriptor, element.id(), &mutation.relationships, mode)?;
        }

        trace!(entity = %mutation.entity, id = %element.id(), created = mutation.is_new(), "element mutation applied");
        Ok(element.id())
    }

    fn resolve_endpoint(
        &self,
        session: &mut GraphSession,
        descriptor: &EntityDescriptor,
        endpoint: &EndpointDescriptor,
        reference: &TargetRef,
        owner: Option<ElementId>,
        mode: SaveMode,
    ) -> OgmResult<ElementId> {
        match reference {
            TargetRef::Owner => owner.ok_or_else(|| {
                MappingError::MissingEndpoint {
                    entity: descriptor.name.clone(),
                    endpoint: endpoint.field.clone(),
                }
                .into()
            }),
            TargetRef::Persisted(id) => {
                self.verify_vertex(session, self.descriptor(&endpoint.entity)?, *id)?;
                Ok(*id)
            }
            TargetRef::Cascade(mutation) => self.apply(session, mutation, None, mode),
        }
    }

    /// Fails unless `id` is a vertex carrying the descriptor's label
    pub(crate) fn verify_vertex(&self, session: &GraphSession, descriptor: &EntityDescriptor, id: ElementId) -> OgmResult<()> {
        let vertex = session.graph()?.vertex(id)?.ok_or(MappingError::ElementNotFound(id))?;
        check_label(descriptor, id, &vertex.label)?;
        Ok(())
    }

    /// Validate, plan, apply and reload `record`
    ///
    /// The identity map is cleared afterwards so the returned record reflects
    /// the graph rather than an instance hydrated before the write.
    pub fn save(&self, session: &mut GraphSession, record: &EntityRecord, mode: SaveMode) -> OgmResult<Arc<EntityRecord>> {
        let mutation = self.to_graph_element(record)?;
        let id = self.apply(session, &mutation, None, mode)?;
        session.identity_map_mut().clear();
        debug!(entity = %record.entity, %id, created = mutation.is_new(), "entity saved");

        self.find_by_id(session, &record.entity, id)?
            .ok_or_else(|| MappingError::ElementNotFound(id).into())
    }

    /// Hydrate any element whose label belongs to a registered entity
    pub fn from_graph_element(&self, session: &mut GraphSession, element: ElementRef) -> OgmResult<Arc<EntityRecord>> {
        let label = session
            .graph()?
            .label(element)?
            .ok_or(MappingError::ElementNotFound(element.id()))?;
        let descriptor = self
            .registry
            .by_label(&label, !element.is_vertex())
            .ok_or(MappingError::UnknownEntity(label))?;
        self.hydrate(session, descriptor, element, 0, &mut FetchContext::default())
    }

    /// Hydrate `element` as `entity`; a label mismatch is an error
    pub fn load(&self, session: &mut GraphSession, entity: &str, element: ElementRef) -> OgmResult<Arc<EntityRecord>> {
        let descriptor = self.descriptor(entity)?;
        self.hydrate(session, descriptor, element, 0, &mut FetchContext::default())
    }

    /// `None` when the element is gone or belongs to another entity
    pub fn find_by_id(&self, session: &mut GraphSession, entity: &str, id: ElementId) -> OgmResult<Option<Arc<EntityRecord>>> {
        let descriptor = self.descriptor(entity)?;
        let element = element_ref(descriptor, id);
        match session.graph()?.label(element)? {
            None => return Ok(None),
            Some(label) if descriptor.label() != Some(label.as_str()) => {
                debug!(entity, %id, %label, "element belongs to another entity");
                return Ok(None);
            }
            Some(_) => {}
        }
        self.hydrate(session, descriptor, element, 0, &mut FetchContext::default())
            .map(Some)
    }

    pub fn find_all(&self, session: &mut GraphSession, entity: &str) -> OgmResult<Vec<Arc<EntityRecord>>> {
        let descriptor = self.descriptor(entity)?;
        let label = descriptor.label().unwrap_or(&descriptor.name);
        let graph = session.graph()?;
        let ids = if descriptor.is_edge() {
            graph.edges(Some(label))?
        } else {
            graph.vertices(Some(label))?
        };

        ids.into_iter()
            .map(|id| self.hydrate(session, descriptor, element_ref(descriptor, id), 0, &mut FetchContext::default()))
            .collect()
    }

    pub(crate) fn hydrate(
        &self,
        session: &mut GraphSession,
        descriptor: &EntityDescriptor,
        element: ElementRef,
        depth: usize,
        context: &mut FetchContext,
    ) -> OgmResult<Arc<EntityRecord>> {
        let id = element.id();
        if let Some(cached) = session.identity_map().get(&descriptor.name, id, depth) {
            return Ok(cached);
        }
        if context.in_progress.contains(&id) {
            // cycle back to an element still being built
            return Ok(Arc::new(EntityRecord::reference(&descriptor.name, id)));
        }

        let graph = session.graph()?;
        let (label, properties, endpoints) = match element {
            ElementRef::Vertex(_) => {
                let vertex = graph.vertex(id)?.ok_or(MappingError::ElementNotFound(id))?;
                (vertex.label, vertex.properties, None)
            }
            ElementRef::Edge(_) => {
                let edge = graph.edge(id)?.ok_or(MappingError::ElementNotFound(id))?;
                (edge.label, edge.properties, Some((edge.out_vertex, edge.in_vertex)))
            }
        };
        check_label(descriptor, id, &label)?;

        let mut record = EntityRecord::new(&descriptor.name).with_id(Some(id));
        self.read_properties(descriptor, &properties, "", &mut record);

        context.in_progress.insert(id);
        let linked = self.hydrate_links(session, descriptor, id, endpoints, depth, context, &mut record);
        context.in_progress.remove(&id);
        linked?;

        Ok(session
            .identity_map_mut()
            .insert(&descriptor.name, id, depth, Arc::new(record)))
    }

    #[allow(clippy::too_many_arguments)]
    fn hydrate_links(
        &self,
        session: &mut GraphSession,
        descriptor: &EntityDescriptor,
        id: ElementId,
        endpoints: Option<(ElementId, ElementId)>,
        depth: usize,
        context: &mut FetchContext,
        record: &mut EntityRecord,
    ) -> OgmResult<()> {
        let max_depth = self.config().max_fetch_depth;

        if let (Some((source, target)), Some((out_vertex, in_vertex))) = (descriptor.endpoints(), endpoints) {
            for (endpoint, vertex) in [(source, out_vertex), (target, in_vertex)] {
                // endpoints are always present, as id-only references past the depth limit
                let value = if depth < max_depth {
                    let endpoint_descriptor = self.descriptor(&endpoint.entity)?;
                    self.hydrate(session, endpoint_descriptor, ElementRef::Vertex(vertex), depth + 1, context)?
                } else {
                    Arc::new(EntityRecord::reference(&endpoint.entity, vertex))
                };
                record.fields.insert(endpoint.field.clone(), FieldValue::One(Some(value)));
            }
        }

        let resolver = RelationshipResolver::new(self);
        for relationship in &descriptor.relationships {
            let value = if relationship.fetch_mode() == FetchMode::Lazy || depth >= max_depth {
                FieldValue::Unloaded
            } else {
                resolver.load(session, descriptor, relationship, id, depth, context)?
            };
            record.fields.insert(relationship.field.clone(), value);
        }
        Ok(())
    }

    /// Returns whether any key of the value, or its presence marker, was found
    fn read_properties(
        &self,
        descriptor: &EntityDescriptor,
        properties: &IndexMap<String, PropertyValue>,
        prefix: &str,
        record: &mut EntityRecord,
    ) -> bool {
        let config = self.config();
        let mut present = false;
        for property in &descriptor.properties {
            let value = match properties.get(&config.embedded_key(prefix, &property.name)) {
                Some(value) => {
                    present = true;
                    value.clone()
                }
                None => property.kind.zero_value(),
            };
            record.fields.insert(property.name.clone(), FieldValue::Property(value));
        }
        for embedded in &descriptor.embedded {
            let nested_prefix = config.embedded_key(prefix, &embedded.field);
            let mut nested = EntityRecord::new(&embedded.descriptor.name);
            let marked = properties.get(&nested_prefix) == Some(&PropertyValue::Boolean(true));
            let found = self.read_properties(&embedded.descriptor, properties, &nested_prefix, &mut nested) || marked;
            present |= found;
            record
                .fields
                .insert(embedded.field.clone(), FieldValue::Embedded(found.then_some(nested)));
        }
        present
    }

    /// Delete a persisted record; `false` when its element is already gone
    pub fn delete(&self, session: &mut GraphSession, record: &EntityRecord) -> OgmResult<bool> {
        let id = record
            .id
            .ok_or_else(|| MappingError::TransientDelete(record.entity.clone()))?;
        self.delete_by_id(session, &record.entity, id)
    }

    /// Delete by id applying each relationship's delete policy
    ///
    /// Restrictions are checked across the whole cascade before anything is
    /// removed, so a refused delete leaves the graph untouched.
    pub fn delete_by_id(&self, session: &mut GraphSession, entity: &str, id: ElementId) -> OgmResult<bool> {
        let descriptor = self.descriptor(entity)?;
        let mut plan = IndexMap::new();
        self.plan_delete(session, descriptor, element_ref(descriptor, id), &mut plan)?;
        if plan.is_empty() {
            debug!(entity, %id, "nothing to delete");
            return Ok(false);
        }

        let graph = session.graph_mut()?;
        for element in plan.values() {
            match *element {
                ElementRef::Vertex(vertex) => {
                    if graph.vertex(vertex)?.is_some() {
                        graph.remove_vertex(vertex)?;
                    }
                }
                ElementRef::Edge(edge) => {
                    if graph.edge(edge)?.is_some() {
                        graph.remove_edge(edge)?;
                    }
                }
            }
        }
        session.identity_map_mut().clear();
        debug!(entity, %id, removed = plan.len(), "entity deleted");
        Ok(true)
    }

    fn plan_delete(
        &self,
        session: &GraphSession,
        descriptor: &EntityDescriptor,
        element: ElementRef,
        plan: &mut IndexMap<ElementId, ElementRef>,
    ) -> OgmResult<()> {
        if plan.contains_key(&element.id()) {
            return Ok(());
        }
        let Some(label) = session.graph()?.label(element)? else {
            return Ok(());
        };
        check_label(descriptor, element.id(), &label)?;
        plan.insert(element.id(), element);

        if let ElementRef::Vertex(id) = element {
            let resolver = RelationshipResolver::new(self);
            if let Some(field) = resolver.restricted_by(session, descriptor, id)? {
                return Err(MappingError::DeleteRestricted {
                    entity: descriptor.name.clone(),
                    id,
                    field,
                }
                .into());
            }
            for (entity, target) in resolver.cascade_targets(session, descriptor, id)? {
                self.plan_delete(session, self.descriptor(&entity)?, target, plan)?;
            }
        }
        Ok(())
    }
}

fn element_ref(descriptor: &EntityDescriptor, id: ElementId) -> ElementRef {
    if descriptor.is_edge() {
        ElementRef::Edge(id)
    } else {
        ElementRef::Vertex(id)
    }
}

fn check_label(descriptor: &EntityDescriptor, id: ElementId, found: &str) -> Result<(), MappingError> {
    match descriptor.label() {
        Some(expected) if expected != found => Err(MappingError::LabelMismatch {
            id,
            expected: expected.to_string(),
            found: found.to_string(),
        }),
        _ => Ok(()),
    }
}

fn shape(descriptor: &EntityDescriptor, field: &str, reason: impl Into<String>) -> MappingError {
    MappingError::FieldShape {
        entity: descriptor.name.clone(),
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn validate_record(descriptor: &EntityDescriptor, record: &EntityRecord) -> Result<(), ValidationError> {
    if let Some(name) = record.fields.keys().find(|name| descriptor.field(name).is_none()) {
        return Err(ValidationError::UnknownField {
            entity: descriptor.name.clone(),
            field: name.clone(),
        });
    }

    for property in &descriptor.properties {
        let mismatch = |found: &str| ValidationError::TypeMismatch {
            entity: descriptor.name.clone(),
            field: property.name.clone(),
            expected: format!("{:?}", property.kind),
            found: found.to_string(),
        };
        match record.field(&property.name) {
            Some(FieldValue::Property(value)) if property.required && value.is_null() => {
                return Err(ValidationError::MissingRequired {
                    entity: descriptor.name.clone(),
                    field: property.name.clone(),
                })
            }
            Some(FieldValue::Property(value)) if !property.kind.accepts(value) => return Err(mismatch(value.kind_name())),
            Some(FieldValue::Property(_)) => {}
            None if property.required => {
                return Err(ValidationError::MissingRequired {
                    entity: descriptor.name.clone(),
                    field: property.name.clone(),
                })
            }
            None => {}
            Some(_) => return Err(mismatch("non-property value")),
        }
    }

    for embedded in &descriptor.embedded {
        match record.field(&embedded.field) {
            Some(FieldValue::Embedded(Some(inner))) => validate_record(&embedded.descriptor, inner)?,
            Some(FieldValue::Embedded(None)) | None => {}
            Some(_) => {
                return Err(ValidationError::TypeMismatch {
                    entity: descriptor.name.clone(),
                    field: embedded.field.clone(),
                    expected: embedded.descriptor.name.clone(),
                    found: "non-embedded value".to_string(),
                })
            }
        }
    }
    Ok(())
}
