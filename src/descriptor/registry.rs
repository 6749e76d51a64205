//! Read-only registry of entity descriptors
//!
//! Built once at startup, validated as a whole, then shared behind an `Arc`.
//! Applications that want a process-wide registry install it with
//! [`install_global`].

use super::{EntityDescriptor, EntityKind};
use crate::config::OgmConfig;
use crate::errors::ConfigurationError;
use crate::mapping::Entity;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

static GLOBAL_REGISTRY: OnceLock<Arc<DescriptorRegistry>> = OnceLock::new();

/// Install the process-wide registry; only the first call succeeds
pub fn install_global(registry: Arc<DescriptorRegistry>) -> Result<(), ConfigurationError> {
    GLOBAL_REGISTRY
        .set(registry)
        .map_err(|_| ConfigurationError::RegistryAlreadyInstalled)
}

/// The process-wide registry, if one was installed
pub fn global() -> Option<Arc<DescriptorRegistry>> {
    GLOBAL_REGISTRY.get().cloned()
}

/// Validated, immutable set of descriptors plus the configuration they were resolved with
#[derive(Debug)]
pub struct DescriptorRegistry {
    config: OgmConfig,
    entities: IndexMap<String, EntityDescriptor>,
}

impl DescriptorRegistry {
    /// Start collecting descriptors
    pub fn builder(config: OgmConfig) -> RegistryBuilder {
        RegistryBuilder {
            config,
            entities: Vec::new(),
        }
    }

    pub fn config(&self) -> &OgmConfig {
        &self.config
    }

    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(name)
    }

    /// Descriptor of a vertex or edge entity with the given graph label
    pub fn by_label(&self, label: &str, edge: bool) -> Option<&EntityDescriptor> {
        self.entities
            .values()
            .find(|d| d.label() == Some(label) && d.is_edge() == edge)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }
}

/// Collects descriptors before validation
pub struct RegistryBuilder {
    config: OgmConfig,
    entities: Vec<EntityDescriptor>,
}

impl RegistryBuilder {
    pub fn register(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities.push(descriptor);
        self
    }

    /// Register the descriptor declared by a domain type
    pub fn register_entity<T: Entity>(self) -> Self {
        self.register(T::descriptor())
    }

    /// Validate all descriptors and freeze them
    pub fn build(self) -> Result<Arc<DescriptorRegistry>, ConfigurationError> {
        self.config.validate()?;

        let mut entities = IndexMap::new();
        for mut descriptor in self.entities {
            if matches!(descriptor.kind, EntityKind::Embedded) {
                return Err(invalid(&descriptor.name, "embedded value objects cannot be registered as entities"));
            }
            for relationship in &mut descriptor.relationships {
                relationship.fetch.get_or_insert(self.config.default_fetch);
                relationship.on_delete.get_or_insert(self.config.default_cascade);
            }
            let name = descriptor.name.clone();
            let same_label = |other: &&EntityDescriptor| {
                other.label() == descriptor.label() && other.is_edge() == descriptor.is_edge()
            };
            if let Some(other) = entities.values().find(same_label) {
                return Err(invalid(
                    &name,
                    format!("label {} is already mapped by {}", descriptor.label().unwrap_or_default(), other.name),
                ));
            }
            if entities.insert(name.clone(), descriptor).is_some() {
                return Err(invalid(&name, "registered twice"));
            }
        }

        for descriptor in entities.values() {
            validate_fields(descriptor)?;
            validate_references(descriptor, &entities)?;
        }

        tracing::debug!(entities = entities.len(), "descriptor registry built");
        Ok(Arc::new(DescriptorRegistry {
            config: self.config,
            entities,
        }))
    }
}

fn invalid(entity: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidDescriptor {
        entity: entity.to_string(),
        reason: reason.into(),
    }
}

fn validate_fields(descriptor: &EntityDescriptor) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    seen.insert(descriptor.id_field.clone());
    for name in descriptor.field_names() {
        if !seen.insert(name.clone()) {
            return Err(invalid(&descriptor.name, format!("field {name} declared twice")));
        }
    }

    for embedded in &descriptor.embedded {
        let nested = &embedded.descriptor;
        if !matches!(nested.kind, EntityKind::Embedded) {
            return Err(invalid(&descriptor.name, format!("embedded field {} must use an embedded descriptor", embedded.field)));
        }
        if !nested.relationships.is_empty() {
            return Err(invalid(&descriptor.name, format!("embedded field {} cannot declare relationships", embedded.field)));
        }
        validate_fields(nested)?;
    }
    Ok(())
}

fn validate_references(
    descriptor: &EntityDescriptor,
    entities: &IndexMap<String, EntityDescriptor>,
) -> Result<(), ConfigurationError> {
    if let Some((source, target)) = descriptor.endpoints() {
        for endpoint in [source, target] {
            match entities.get(&endpoint.entity) {
                Some(d) if d.is_vertex() => {}
                _ => {
                    return Err(invalid(
                        &descriptor.name,
                        format!("endpoint {} must reference a vertex entity, found {}", endpoint.field, endpoint.entity),
                    ))
                }
            }
        }
        if !descriptor.relationships.is_empty() {
            return Err(invalid(&descriptor.name, "edge entities cannot declare relationships"));
        }
    }

    for relationship in &descriptor.relationships {
        let Some(target) = entities.get(&relationship.target) else {
            return Err(invalid(
                &descriptor.name,
                format!("relationship {} targets unknown entity {}", relationship.field, relationship.target),
            ));
        };
        if let Some((source, end)) = target.endpoints() {
            // the owner must sit on one side of the edge entity
            let owner_side = match relationship.direction {
                crate::value_objects::Direction::In => end,
                _ => source,
            };
            if owner_side.entity != descriptor.name {
                return Err(invalid(
                    &descriptor.name,
                    format!("relationship {} expects {} on the owner side of {}", relationship.field, owner_side.entity, target.name),
                ));
            }
            if target.label() != Some(relationship.label.as_str()) {
                return Err(invalid(
                    &descriptor.name,
                    format!("relationship {} must use the label of edge entity {}", relationship.field, target.name),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{EndpointDescriptor, PropertyKind, RelationshipDescriptor};
    use crate::value_objects::{CascadePolicy, FetchMode};

    fn person() -> EntityDescriptor {
        EntityDescriptor::vertex("Person")
            .property("firstName", PropertyKind::String)
            .relationship(RelationshipDescriptor::single("address", "lives_at", "Address"))
    }

    #[test]
    fn test_build_fills_relationship_defaults() {
        let config = OgmConfig {
            default_cascade: CascadePolicy::Restrict,
            ..OgmConfig::default()
        };
        let registry = DescriptorRegistry::builder(config)
            .register(person())
            .register(EntityDescriptor::vertex("Address"))
            .build()
            .unwrap();

        let address = registry.get("Person").unwrap().relationship_named("address").unwrap();
        assert_eq!(address.fetch, Some(FetchMode::Eager));
        assert_eq!(address.on_delete, Some(CascadePolicy::Restrict));
        assert_eq!(registry.by_label("Address", false).unwrap().name, "Address");
    }

    #[test]
    fn test_unknown_relationship_target_rejected() {
        let result = DescriptorRegistry::builder(OgmConfig::default()).register(person()).build();
        assert!(matches!(result, Err(ConfigurationError::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let descriptor = EntityDescriptor::vertex("Pet")
            .property("name", PropertyKind::String)
            .property("name", PropertyKind::String);
        let result = DescriptorRegistry::builder(OgmConfig::default()).register(descriptor).build();
        assert!(matches!(result, Err(ConfigurationError::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_shared_label_of_same_element_kind_rejected() {
        let result = DescriptorRegistry::builder(OgmConfig::default())
            .register(EntityDescriptor::vertex("Pet"))
            .register(EntityDescriptor::vertex("Animal").with_label("Pet"))
            .build();
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidDescriptor { entity, reason }) if entity == "Animal" && reason.contains("Pet")
        ));

        // a vertex and an edge may carry the same label
        let registry = DescriptorRegistry::builder(OgmConfig::default())
            .register(EntityDescriptor::vertex("Knows"))
            .register(
                EntityDescriptor::edge(
                    "KnowsEdge",
                    EndpointDescriptor::new("from", "Knows"),
                    EndpointDescriptor::new("to", "Knows"),
                )
                .with_label("Knows"),
            )
            .build()
            .unwrap();
        assert_eq!(registry.by_label("Knows", true).unwrap().name, "KnowsEdge");
        assert_eq!(registry.by_label("Knows", false).unwrap().name, "Knows");
    }

    #[test]
    fn test_edge_relationship_must_share_label() {
        let person = EntityDescriptor::vertex("Person")
            .relationship(RelationshipDescriptor::set("locations", "visited", "Located"));
        let located = EntityDescriptor::edge(
            "Located",
            EndpointDescriptor::new("person", "Person"),
            EndpointDescriptor::new("location", "Location"),
        );
        let result = DescriptorRegistry::builder(OgmConfig::default())
            .register(person)
            .register(located)
            .register(EntityDescriptor::vertex("Location"))
            .build();
        assert!(matches!(result, Err(ConfigurationError::InvalidDescriptor { .. })));
    }
}
