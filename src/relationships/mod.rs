//! Relationship resolver
//!
//! Reconciles the edges behind one relationship field with the targets the
//! owner currently holds, loads them back in the declared direction and
//! answers the delete-policy questions the mapper asks before removing a
//! vertex.
//!
//! When two fields of one owner map to the same label, target and direction,
//! every edge they write carries the names of the fields holding it under
//! `FIELDS_KEY`, and each field only sees the edges marked with its name.

use crate::descriptor::{EntityDescriptor, RelationshipDescriptor};
use crate::errors::{MappingError, OgmResult};
use crate::mapping::{EntityMapper, FetchContext, FieldValue, RelationshipMutation, TargetRef};
use crate::session::GraphSession;
use crate::store::{Edge, ElementRef, GraphHandle, StoreResult};
use crate::value_objects::{Cardinality, CascadePolicy, Direction, ElementId, PropertyValue, SaveMode};
use tracing::{debug, trace};

/// Edge property holding the index of a list relationship's target
pub const POSITION_KEY: &str = "_position";

/// Edge property naming the relationship fields that hold the edge
pub const FIELDS_KEY: &str = "_fields";

/// Edge and far-end vertex of one stored relationship entry
#[derive(Debug, Clone)]
struct Link {
    edge: Edge,
    target: ElementId,
}

impl Link {
    fn position(&self) -> Option<i64> {
        self.edge.properties.get(POSITION_KEY).and_then(PropertyValue::as_i64)
    }

    fn held_by(&self, field: &str) -> bool {
        field_marks(&self.edge).iter().any(|held| held == field)
    }
}

/// Writes and reads relationship edges on behalf of an `EntityMapper`
pub struct RelationshipResolver<'m> {
    mapper: &'m EntityMapper,
}

impl<'m> RelationshipResolver<'m> {
    pub fn new(mapper: &'m EntityMapper) -> Self {
        Self { mapper }
    }

    /// Apply the planned relationship writes of the element `owner_id`
    pub fn save(
        &self,
        session: &mut GraphSession,
        owner: &EntityDescriptor,
        owner_id: ElementId,
        relationships: &[RelationshipMutation],
        mode: SaveMode,
    ) -> OgmResult<()> {
        for planned in relationships {
            let relationship = owner
                .relationship_named(&planned.field)
                .ok_or_else(|| MappingError::FieldShape {
                    entity: owner.name.clone(),
                    field: planned.field.clone(),
                    reason: "not a relationship".to_string(),
                })?;
            let target = self.mapper.descriptor(&relationship.target)?;

            // resolve every target first; cascaded entities are created here
            let mut wanted: Vec<ElementId> = Vec::new();
            let mut far_ends: Vec<ElementId> = Vec::new();
            for reference in &planned.targets {
                let reused = self.linked_edge(session, relationship, target, owner_id, reference, &wanted)?;
                let id = match (reference, reused) {
                    (TargetRef::Cascade(mutation), Some(edge)) => {
                        trace!(field = %relationship.field, %edge, "edge entity merged into the edge already linking its endpoints");
                        self.mapper.apply(session, &mutation.targeting(edge), Some(owner_id), mode)?
                    }
                    _ => self.resolve_target(session, owner, relationship, target, owner_id, reference, mode)?,
                };
                if wanted.contains(&id) {
                    continue;
                }
                // an endpoint pair is linked once, whatever element carries the edge
                let far = if target.is_edge() {
                    let edge = session.graph()?.edge(id)?.ok_or(MappingError::ElementNotFound(id))?;
                    edge.other_end(owner_id)
                } else {
                    id
                };
                if far_ends.contains(&far) {
                    continue;
                }
                far_ends.push(far);
                wanted.push(id);
            }

            self.reconcile(session, owner, relationship, target, owner_id, &wanted, mode)?;
            trace!(
                entity = %owner.name,
                field = %relationship.field,
                targets = wanted.len(),
                "relationship saved"
            );
        }
        Ok(())
    }

    /// Existing edge that a transient edge entity should update instead of adding another
    ///
    /// Applies when the entity's far endpoint is persisted and already linked
    /// to the owner with this label, either earlier in the same save or in the
    /// graph.
    fn linked_edge(
        &self,
        session: &GraphSession,
        relationship: &RelationshipDescriptor,
        target: &EntityDescriptor,
        owner_id: ElementId,
        reference: &TargetRef,
        wanted: &[ElementId],
    ) -> OgmResult<Option<ElementId>> {
        let TargetRef::Cascade(mutation) = reference else {
            return Ok(None);
        };
        if !target.is_edge() || !mutation.is_new() {
            return Ok(None);
        }
        let Some((side, TargetRef::Persisted(far))) = mutation.owner_side() else {
            return Ok(None);
        };
        let joins = |edge: &Edge| match side {
            Direction::In => edge.in_vertex == owner_id && edge.out_vertex == *far,
            Direction::Out | Direction::Both => edge.out_vertex == owner_id && edge.in_vertex == *far,
        };

        let graph = session.graph()?;
        for id in wanted {
            if graph.edge(*id)?.is_some_and(|edge| joins(&edge)) {
                return Ok(Some(*id));
            }
        }
        Ok(self
            .stored_links(session, relationship, target, owner_id)?
            .into_iter()
            .find(|link| joins(&link.edge))
            .map(|link| link.edge.id))
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_target(
        &self,
        session: &mut GraphSession,
        owner: &EntityDescriptor,
        relationship: &RelationshipDescriptor,
        target: &EntityDescriptor,
        owner_id: ElementId,
        reference: &TargetRef,
        mode: SaveMode,
    ) -> OgmResult<ElementId> {
        match reference {
            TargetRef::Cascade(mutation) => self.mapper.apply(session, mutation, Some(owner_id), mode),
            TargetRef::Persisted(id) if target.is_edge() => {
                let edge = session.graph()?.edge(*id)?.ok_or(MappingError::ElementNotFound(*id))?;
                if target.label() != Some(edge.label.as_str()) {
                    return Err(MappingError::LabelMismatch {
                        id: *id,
                        expected: relationship.label.clone(),
                        found: edge.label,
                    }
                    .into());
                }
                if !touches(&edge, owner_id, relationship.direction) {
                    return Err(MappingError::FieldShape {
                        entity: owner.name.clone(),
                        field: relationship.field.clone(),
                        reason: format!("edge {id} is not attached to {owner_id}"),
                    }
                    .into());
                }
                Ok(*id)
            }
            TargetRef::Persisted(id) => {
                self.mapper.verify_vertex(session, target, *id)?;
                Ok(*id)
            }
            TargetRef::Owner => Ok(owner_id),
        }
    }

    /// Make the stored edges agree with `wanted`
    ///
    /// For vertex targets `wanted` holds vertex ids; for edge entities it holds
    /// the edge ids themselves, which already exist at this point.
    #[allow(clippy::too_many_arguments)]
    fn reconcile(
        &self,
        session: &mut GraphSession,
        owner: &EntityDescriptor,
        relationship: &RelationshipDescriptor,
        target: &EntityDescriptor,
        owner_id: ElementId,
        wanted: &[ElementId],
        mode: SaveMode,
    ) -> OgmResult<()> {
        let shared = owner.shares_edges(relationship);
        let stored = self.stored_links(session, relationship, target, owner_id)?;
        let existing: Vec<Link> = stored
            .iter()
            .filter(|link| !shared || link.held_by(&relationship.field))
            .cloned()
            .collect();
        let key = |link: &Link| if target.is_edge() { link.edge.id } else { link.target };
        let is_list = relationship.cardinality == Cardinality::List;

        let prune = relationship.cardinality == Cardinality::Single || mode == SaveMode::ReplaceAll;
        let graph = session.graph_mut()?;
        if prune {
            for link in existing.iter().filter(|link| !wanted.contains(&key(*link))) {
                if shared && release(graph, &link.edge, &relationship.field)? {
                    debug!(field = %relationship.field, edge = %link.edge.id, "relationship edge released, still held by another field");
                    continue;
                }
                graph.remove_edge(link.edge.id)?;
                debug!(field = %relationship.field, edge = %link.edge.id, "stale relationship edge removed");
            }
        }

        let wanted: &[ElementId] = if relationship.cardinality == Cardinality::Single {
            &wanted[..wanted.len().min(1)]
        } else {
            wanted
        };

        let mut next_position = existing
            .iter()
            .filter(|link| !prune || wanted.contains(&key(*link)))
            .filter_map(Link::position)
            .max()
            .map_or(0, |max| max + 1);

        for (index, id) in wanted.iter().enumerate() {
            let (edge, positioned) = match existing.iter().find(|link| key(*link) == *id) {
                Some(link) => (link.edge.id, link.position().is_some()),
                None => {
                    let edge = if target.is_edge() {
                        // cascaded edge entities were created before reconciling
                        *id
                    } else if let Some(sibling) = stored.iter().find(|link| shared && link.target == *id) {
                        sibling.edge.id
                    } else {
                        match relationship.direction {
                            Direction::In => graph.add_edge(&relationship.label, *id, owner_id)?,
                            Direction::Out | Direction::Both => graph.add_edge(&relationship.label, owner_id, *id)?,
                        }
                    };
                    if shared {
                        hold(graph, edge, &relationship.field)?;
                    }
                    (edge, false)
                }
            };

            if is_list && mode == SaveMode::ReplaceAll {
                graph.set_property(ElementRef::Edge(edge), POSITION_KEY, PropertyValue::from(index as i64))?;
            } else if is_list && !positioned {
                graph.set_property(ElementRef::Edge(edge), POSITION_KEY, PropertyValue::from(next_position))?;
                next_position += 1;
            }
        }
        Ok(())
    }

    /// Stored entries of a relationship, in edge insertion order
    fn links(
        &self,
        session: &GraphSession,
        owner: &EntityDescriptor,
        relationship: &RelationshipDescriptor,
        target: &EntityDescriptor,
        owner_id: ElementId,
    ) -> OgmResult<Vec<Link>> {
        let mut links = self.stored_links(session, relationship, target, owner_id)?;
        if owner.shares_edges(relationship) {
            links.retain(|link| link.held_by(&relationship.field));
        }
        Ok(links)
    }

    /// Edges matching the relationship's label, direction and target, whichever field holds them
    fn stored_links(
        &self,
        session: &GraphSession,
        relationship: &RelationshipDescriptor,
        target: &EntityDescriptor,
        owner_id: ElementId,
    ) -> OgmResult<Vec<Link>> {
        let graph = session.graph()?;
        let mut links = Vec::new();
        for edge_id in graph.incident_edges(owner_id, relationship.direction, Some(&relationship.label))? {
            let Some(edge) = graph.edge(edge_id)? else {
                continue;
            };
            if target.is_edge() {
                if !touches(&edge, owner_id, relationship.direction) {
                    continue;
                }
            } else {
                // another relationship may share the label with a different target type
                let far = graph.vertex(edge.other_end(owner_id))?;
                if far.map(|v| v.label) != target.label().map(str::to_string) {
                    continue;
                }
            }
            links.push(Link {
                target: edge.other_end(owner_id),
                edge,
            });
        }
        Ok(links)
    }

    /// Hydrate the targets of `relationship` for the owner `owner_id`
    pub(crate) fn load(
        &self,
        session: &mut GraphSession,
        owner: &EntityDescriptor,
        relationship: &RelationshipDescriptor,
        owner_id: ElementId,
        depth: usize,
        context: &mut FetchContext,
    ) -> OgmResult<FieldValue> {
        let target = self.mapper.descriptor(&relationship.target)?;
        let mut links = self.links(session, owner, relationship, target, owner_id)?;
        if relationship.cardinality == Cardinality::List {
            links.sort_by_key(|link| link.position().unwrap_or(i64::MAX));
        }

        let mut records = Vec::with_capacity(links.len());
        for link in links {
            let element = if target.is_edge() {
                ElementRef::Edge(link.edge.id)
            } else {
                ElementRef::Vertex(link.target)
            };
            records.push(self.mapper.hydrate(session, target, element, depth + 1, context)?);
        }

        Ok(match relationship.cardinality {
            Cardinality::Single => FieldValue::One(records.into_iter().next()),
            Cardinality::Set | Cardinality::List => FieldValue::Many(records),
        })
    }

    /// First restricted relationship that still links `owner_id`
    ///
    /// Covers the vertex's own restricted fields and restricted fields of
    /// other entities that target it. The latter are reported as
    /// `Entity.field`.
    pub fn restricted_by(&self, session: &GraphSession, owner: &EntityDescriptor, owner_id: ElementId) -> OgmResult<Option<String>> {
        for relationship in &owner.relationships {
            if relationship.delete_policy() != CascadePolicy::Restrict {
                continue;
            }
            let target = self.mapper.descriptor(&relationship.target)?;
            if !self.links(session, owner, relationship, target, owner_id)?.is_empty() {
                return Ok(Some(relationship.field.clone()));
            }
        }

        let graph = session.graph()?;
        for referrer in self.mapper.registry().entities() {
            let Some(referrer_label) = referrer.label().filter(|_| !referrer.is_edge()) else {
                continue;
            };
            for relationship in &referrer.relationships {
                if relationship.target != owner.name || relationship.delete_policy() != CascadePolicy::Restrict {
                    continue;
                }
                let shared = referrer.shares_edges(relationship);
                for edge_id in graph.incident_edges(owner_id, relationship.direction.reverse(), Some(&relationship.label))? {
                    let Some(edge) = graph.edge(edge_id)? else {
                        continue;
                    };
                    let holder = graph.vertex(edge.other_end(owner_id))?;
                    if holder.is_some_and(|v| v.label == referrer_label)
                        && (!shared || field_marks(&edge).contains(&relationship.field))
                    {
                        return Ok(Some(format!("{}.{}", referrer.name, relationship.field)));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Elements to delete together with `owner_id`, as (entity, element)
    ///
    /// Cascading through an edge entity reaches the vertex at its far end.
    pub fn cascade_targets(
        &self,
        session: &GraphSession,
        owner: &EntityDescriptor,
        owner_id: ElementId,
    ) -> OgmResult<Vec<(String, ElementRef)>> {
        let mut targets = Vec::new();
        for relationship in &owner.relationships {
            if relationship.delete_policy() != CascadePolicy::Cascade {
                continue;
            }
            let target = self.mapper.descriptor(&relationship.target)?;
            for link in self.links(session, owner, relationship, target, owner_id)? {
                match target.endpoints() {
                    Some((source, end)) => {
                        let far = if link.edge.out_vertex == owner_id { end } else { source };
                        targets.push((far.entity.clone(), ElementRef::Vertex(link.target)));
                    }
                    None => targets.push((target.name.clone(), ElementRef::Vertex(link.target))),
                }
            }
        }
        Ok(targets)
    }
}

/// Whether the owner sits on the side of `edge` that `direction` names
fn touches(edge: &Edge, owner_id: ElementId, direction: Direction) -> bool {
    match direction {
        Direction::Out => edge.out_vertex == owner_id,
        Direction::In => edge.in_vertex == owner_id,
        Direction::Both => edge.out_vertex == owner_id || edge.in_vertex == owner_id,
    }
}

fn field_marks(edge: &Edge) -> Vec<String> {
    match edge.properties.get(FIELDS_KEY) {
        Some(PropertyValue::List(values)) => values
            .iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn write_marks(graph: &mut dyn GraphHandle, edge: ElementId, marks: Vec<String>) -> StoreResult<()> {
    let marks = marks.into_iter().map(PropertyValue::String).collect();
    graph.set_property(ElementRef::Edge(edge), FIELDS_KEY, PropertyValue::List(marks))
}

/// Mark `edge` as held by `field`
fn hold(graph: &mut dyn GraphHandle, edge: ElementId, field: &str) -> OgmResult<()> {
    let stored = graph.edge(edge)?.ok_or(MappingError::ElementNotFound(edge))?;
    let mut marks = field_marks(&stored);
    if !marks.iter().any(|held| held == field) {
        marks.push(field.to_string());
        write_marks(graph, edge, marks)?;
    }
    Ok(())
}

/// Drop `field` from the holders of `edge`; true while another field still holds it
fn release(graph: &mut dyn GraphHandle, edge: &Edge, field: &str) -> OgmResult<bool> {
    let marks: Vec<String> = field_marks(edge).into_iter().filter(|held| held != field).collect();
    if marks.is_empty() {
        return Ok(false);
    }
    write_marks(graph, edge.id, marks)?;
    Ok(true)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OgmConfig;
    use crate::descriptor::{DescriptorRegistry, PropertyKind};
    use crate::mapping::EntityRecord;
    use crate::store::InMemoryGraphStore;

    fn mapper() -> EntityMapper {
        let registry = DescriptorRegistry::builder(OgmConfig::default())
            .register(
                EntityDescriptor::vertex("Person")
                    .property("name", PropertyKind::String)
                    .relationship(RelationshipDescriptor::single("favourite", "FAVOURITE", "Pet"))
                    .relationship(RelationshipDescriptor::list("queue", "QUEUED", "Pet"))
                    .relationship(RelationshipDescriptor::set("owned", "OWNS", "Pet").cascade_save())
                    .relationship(RelationshipDescriptor::single("companion", "OWNS", "Pet")),
            )
            .register(EntityDescriptor::vertex("Pet").property("name", PropertyKind::String))
            .build()
            .unwrap();
        EntityMapper::new(registry)
    }

    fn pet(mapper: &EntityMapper, session: &mut GraphSession, name: &str) -> EntityRecord {
        let saved = mapper
            .save(session, &EntityRecord::new("Pet").set("name", name), SaveMode::Merge)
            .unwrap();
        EntityRecord::reference("Pet", saved.id.unwrap())
    }

    #[test]
    fn test_single_relationship_replaces_previous_edge() {
        let mapper = mapper();
        let store = InMemoryGraphStore::new();
        let mut session = GraphSession::open(&store).unwrap();
        session.begin().unwrap();

        let milo = pet(&mapper, &mut session, "Milo");
        let rex = pet(&mapper, &mut session, "Rex");
        let person = mapper
            .save(
                &mut session,
                &EntityRecord::new("Person").set("name", "Graham").one("favourite", Some(milo)),
                SaveMode::Merge,
            )
            .unwrap();

        let updated = EntityRecord::reference("Person", person.id.unwrap())
            .set("name", "Graham")
            .one("favourite", Some(rex));
        let reloaded = mapper.save(&mut session, &updated, SaveMode::Merge).unwrap();

        assert_eq!(reloaded.target("favourite").unwrap().string("name"), "Rex");
        let edges = session.graph().unwrap().edges(Some("FAVOURITE")).unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_list_keeps_save_order_and_merge_appends() {
        let mapper = mapper();
        let store = InMemoryGraphStore::new();
        let mut session = GraphSession::open(&store).unwrap();
        session.begin().unwrap();

        let a = pet(&mapper, &mut session, "A");
        let b = pet(&mapper, &mut session, "B");
        let c = pet(&mapper, &mut session, "C");

        let person = mapper
            .save(
                &mut session,
                &EntityRecord::new("Person").set("name", "G").many("queue", vec![b.clone(), a.clone()]),
                SaveMode::Merge,
            )
            .unwrap();
        let names: Vec<String> = person.targets("queue").iter().map(|p| p.string("name")).collect();
        assert_eq!(names, vec!["B", "A"]);

        let person = mapper
            .save(
                &mut session,
                &EntityRecord::reference("Person", person.id.unwrap())
                    .set("name", "G")
                    .many("queue", vec![c, b]),
                SaveMode::Merge,
            )
            .unwrap();
        let names: Vec<String> = person.targets("queue").iter().map(|p| p.string("name")).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_replace_all_drops_missing_targets() {
        let mapper = mapper();
        let store = InMemoryGraphStore::new();
        let mut session = GraphSession::open(&store).unwrap();
        session.begin().unwrap();

        let person = mapper
            .save(
                &mut session,
                &EntityRecord::new("Person").set("name", "G").many(
                    "owned",
                    vec![EntityRecord::new("Pet").set("name", "A"), EntityRecord::new("Pet").set("name", "B")],
                ),
                SaveMode::Merge,
            )
            .unwrap();
        assert_eq!(person.targets("owned").len(), 2);

        let keep = person.targets("owned")[0].as_ref().clone();
        let person = mapper
            .save(
                &mut session,
                &EntityRecord::reference("Person", person.id.unwrap())
                    .set("name", "G")
                    .many("owned", vec![keep.clone()]),
                SaveMode::ReplaceAll,
            )
            .unwrap();

        assert_eq!(person.targets("owned").len(), 1);
        assert_eq!(person.targets("owned")[0].id, keep.id);
        // pets themselves survive
        assert_eq!(session.graph().unwrap().vertices(Some("Pet")).unwrap().len(), 2);
    }

    #[test]
    fn test_shared_label_with_other_target_type_is_ignored() {
        let mapper = mapper();
        let store = InMemoryGraphStore::new();
        let mut session = GraphSession::open(&store).unwrap();
        session.begin().unwrap();

        let milo = pet(&mapper, &mut session, "Milo");
        let person = mapper
            .save(
                &mut session,
                &EntityRecord::new("Person").set("name", "G").one("favourite", Some(milo)),
                SaveMode::Merge,
            )
            .unwrap();
        let other = session.graph_mut().unwrap().add_vertex("Toy").unwrap();
        session
            .graph_mut()
            .unwrap()
            .add_edge("FAVOURITE", person.id.unwrap(), other)
            .unwrap();
        session.identity_map_mut().clear();

        let reloaded = mapper.find_by_id(&mut session, "Person", person.id.unwrap()).unwrap().unwrap();
        assert_eq!(reloaded.target("favourite").unwrap().string("name"), "Milo");
    }

    #[test]
    fn test_fields_sharing_a_label_hold_their_own_edges() {
        let mapper = mapper();
        let store = InMemoryGraphStore::new();
        let mut session = GraphSession::open(&store).unwrap();
        session.begin().unwrap();

        let person = mapper
            .save(
                &mut session,
                &EntityRecord::new("Person").set("name", "G").many(
                    "owned",
                    vec![EntityRecord::new("Pet").set("name", "A"), EntityRecord::new("Pet").set("name", "B")],
                ),
                SaveMode::Merge,
            )
            .unwrap();
        let id = person.id.unwrap();
        assert!(person.target("companion").is_none());
        let b = person.targets("owned")[1].as_ref().clone();

        let person = mapper
            .save(
                &mut session,
                &EntityRecord::reference("Person", id).set("name", "G").one("companion", Some(b.clone())),
                SaveMode::Merge,
            )
            .unwrap();
        assert_eq!(person.target("companion").unwrap().id, b.id);
        assert_eq!(person.targets("owned").len(), 2);
        // the companion rides on the edge the set already holds
        let edges = session.graph().unwrap().edges(Some("OWNS")).unwrap();
        assert_eq!(edges.len(), 2);

        let person = mapper
            .save(
                &mut session,
                &EntityRecord::reference("Person", id).set("name", "G").one("companion", None),
                SaveMode::Merge,
            )
            .unwrap();
        assert!(person.target("companion").is_none());
        assert_eq!(person.targets("owned").len(), 2);
        assert_eq!(session.graph().unwrap().edges(Some("OWNS")).unwrap().len(), 2);

        let person = mapper
            .save(
                &mut session,
                &EntityRecord::reference("Person", id)
                    .set("name", "G")
                    .many("owned", Vec::<EntityRecord>::new()),
                SaveMode::ReplaceAll,
            )
            .unwrap();
        assert!(person.targets("owned").is_empty());
        assert!(session.graph().unwrap().edges(Some("OWNS")).unwrap().is_empty());
    }
}
