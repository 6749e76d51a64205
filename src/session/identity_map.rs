//! Session-scoped identity map

use crate::mapping::EntityRecord;
use crate::value_objects::ElementId;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Entry {
    record: Arc<EntityRecord>,
    depth: usize,
}

/// Maps (entity name, element id) to the record hydrated for it
///
/// Owned by a `GraphSession` and emptied at every transaction boundary, so it
/// never serves a record across transactions. Each entry remembers the fetch
/// depth it was hydrated at: a record built deeper in a load path has fewer
/// relationships loaded and never answers a shallower lookup.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<(String, ElementId), Entry>,
}

impl IdentityMap {
    /// Record hydrated at `depth` or shallower
    pub fn get(&self, entity: &str, id: ElementId, depth: usize) -> Option<Arc<EntityRecord>> {
        self.entries
            .get(&(entity.to_string(), id))
            .filter(|entry| entry.depth <= depth)
            .map(|entry| Arc::clone(&entry.record))
    }

    /// Store `record` hydrated at `depth`; returns the mapped record
    ///
    /// An entry from a load at the same or a shallower depth is kept.
    pub fn insert(&mut self, entity: &str, id: ElementId, depth: usize, record: Arc<EntityRecord>) -> Arc<EntityRecord> {
        let entry = self
            .entries
            .entry((entity.to_string(), id))
            .and_modify(|entry| {
                if depth < entry.depth {
                    *entry = Entry {
                        record: Arc::clone(&record),
                        depth,
                    };
                }
            })
            .or_insert_with(|| Entry {
                record: Arc::clone(&record),
                depth,
            });
        Arc::clone(&entry.record)
    }

    pub fn contains(&self, entity: &str, id: ElementId) -> bool {
        self.entries.contains_key(&(entity.to_string(), id))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
