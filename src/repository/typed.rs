//! Typed facade over `RepositoryDispatcher`

use super::{Argument, MethodOutput, RepositoryDescriptor, RepositoryDispatcher};
use crate::descriptor::DescriptorRegistry;
use crate::errors::{ConfigurationError, OgmResult, QueryError};
use crate::mapping::{Entity, EntityRecord};
use crate::session::GraphSession;
use crate::value_objects::{ElementId, PropertyValue, SaveMode};
use std::marker::PhantomData;
use std::sync::Arc;

/// Repository of one domain type
#[derive(Debug, Clone)]
pub struct Repository<T: Entity> {
    dispatcher: RepositoryDispatcher,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    /// Repository offering only the CRUD contract
    pub fn new(registry: Arc<DescriptorRegistry>) -> Result<Self, ConfigurationError> {
        Self::with_descriptor(registry, RepositoryDescriptor::for_entity::<T>())
    }

    /// Repository with declared query methods
    pub fn with_descriptor(
        registry: Arc<DescriptorRegistry>,
        descriptor: RepositoryDescriptor,
    ) -> Result<Self, ConfigurationError> {
        if descriptor.entity != T::NAME {
            return Err(ConfigurationError::InvalidDescriptor {
                entity: T::NAME.to_string(),
                reason: format!("repository declared for {}", descriptor.entity),
            });
        }
        Ok(Self {
            dispatcher: RepositoryDispatcher::new(registry, &descriptor)?,
            _entity: PhantomData,
        })
    }

    pub fn dispatcher(&self) -> &RepositoryDispatcher {
        &self.dispatcher
    }

    pub fn save(&self, session: &mut GraphSession, entity: &T) -> OgmResult<T> {
        match self.call(session, "save", &[entity.to_record().into()])? {
            MethodOutput::Entity(record) => Ok(T::from_record(&record)?),
            other => Err(unexpected("save", "an entity", &other)),
        }
    }

    /// Save with an explicit collection strategy
    pub fn save_with_mode(&self, session: &mut GraphSession, entity: &T, mode: SaveMode) -> OgmResult<T> {
        let record = self.dispatcher.mapper().save(session, &entity.to_record(), mode)?;
        Ok(T::from_record(&record)?)
    }

    pub fn save_all(&self, session: &mut GraphSession, entities: &[T]) -> OgmResult<Vec<T>> {
        let records: Vec<EntityRecord> = entities.iter().map(T::to_record).collect();
        match self.call(session, "saveAll", &[records.into()])? {
            MethodOutput::Entities(records) => convert(&records),
            other => Err(unexpected("saveAll", "entities", &other)),
        }
    }

    pub fn delete(&self, session: &mut GraphSession, entity: &T) -> OgmResult<()> {
        self.call(session, "delete", &[entity.to_record().into()]).map(drop)
    }

    pub fn delete_by_id(&self, session: &mut GraphSession, id: ElementId) -> OgmResult<()> {
        self.call(session, "deleteById", &[id.into()]).map(drop)
    }

    pub fn delete_all(&self, session: &mut GraphSession) -> OgmResult<()> {
        self.call(session, "deleteAll", &[]).map(drop)
    }

    pub fn find_by_id(&self, session: &mut GraphSession, id: ElementId) -> OgmResult<Option<T>> {
        match self.call(session, "findById", &[id.into()])? {
            MethodOutput::Optional(record) => Ok(record.map(|r| T::from_record(&r)).transpose()?),
            other => Err(unexpected("findById", "an optional entity", &other)),
        }
    }

    pub fn find_all(&self, session: &mut GraphSession) -> OgmResult<Vec<T>> {
        match self.call(session, "findAll", &[])? {
            MethodOutput::Entities(records) => convert(&records),
            other => Err(unexpected("findAll", "entities", &other)),
        }
    }

    pub fn exists_by_id(&self, session: &mut GraphSession, id: ElementId) -> OgmResult<bool> {
        match self.call(session, "existsById", &[id.into()])? {
            MethodOutput::Exists(exists) => Ok(exists),
            other => Err(unexpected("existsById", "a boolean", &other)),
        }
    }

    pub fn count(&self, session: &mut GraphSession) -> OgmResult<usize> {
        match self.call(session, "count", &[])? {
            MethodOutput::Count(count) => Ok(count),
            other => Err(unexpected("count", "a count", &other)),
        }
    }

    /// Run a declared derived or template method returning entities
    pub fn query(&self, session: &mut GraphSession, method: &str, args: &[PropertyValue]) -> OgmResult<Vec<T>> {
        match self.call(session, method, &values(args))? {
            MethodOutput::Entities(records) => convert(&records),
            other => Err(unexpected(method, "entities", &other)),
        }
    }

    /// Run a `countBy` method; entity-returning methods are counted too
    pub fn count_query(&self, session: &mut GraphSession, method: &str, args: &[PropertyValue]) -> OgmResult<usize> {
        match self.call(session, method, &values(args))? {
            MethodOutput::Count(count) => Ok(count),
            MethodOutput::Entities(records) => Ok(records.len()),
            other => Err(unexpected(method, "a count", &other)),
        }
    }

    /// Run an `existsBy` method; entity-returning methods test for any match
    pub fn exists_query(&self, session: &mut GraphSession, method: &str, args: &[PropertyValue]) -> OgmResult<bool> {
        match self.call(session, method, &values(args))? {
            MethodOutput::Exists(exists) => Ok(exists),
            MethodOutput::Entities(records) => Ok(!records.is_empty()),
            other => Err(unexpected(method, "a boolean", &other)),
        }
    }

    fn call(&self, session: &mut GraphSession, method: &str, args: &[Argument]) -> OgmResult<MethodOutput> {
        self.dispatcher.invoke(session, method, args)
    }
}

fn values(args: &[PropertyValue]) -> Vec<Argument> {
    args.iter().cloned().map(Argument::Value).collect()
}

fn convert<T: Entity>(records: &[Arc<EntityRecord>]) -> OgmResult<Vec<T>> {
    records
        .iter()
        .map(|record| T::from_record(record).map_err(Into::into))
        .collect()
}

fn unexpected(method: &str, expected: &'static str, actual: &MethodOutput) -> crate::errors::OgmError {
    tracing::warn!(method, expected, actual = actual.kind(), "repository method returned another shape");
    QueryError::UnexpectedOutput {
        method: method.to_string(),
        expected,
    }
    .into()
}
