//! Session and transaction boundaries

mod common;

use chrono::{TimeZone, Utc};
use cim_graph_ogm::{
    GraphSession, InMemoryGraphStore, OgmConfig, OgmError, QueryError, Repository, TransactionError,
};
use common::*;
use std::sync::Arc;

fn people() -> Repository<Person> {
    Repository::new(registry()).unwrap()
}

#[test]
fn test_rollback_discards_mutations() {
    let store = InMemoryGraphStore::new();
    let people = people();

    let mut session = begin(&store);
    people
        .save(&mut session, &Person::new("Graham", "Webber", None, true))
        .unwrap();
    assert_eq!(people.count(&mut session).unwrap(), 1);
    session.rollback().unwrap();

    let mut next = begin(&store);
    assert_eq!(people.count(&mut next).unwrap(), 0);
    assert_eq!(store.vertex_count(), 0);
}

#[test]
fn test_commit_publishes_mutations() {
    let store = InMemoryGraphStore::new();
    let people = people();

    let mut session = begin(&store);
    let mut graham = Person::new("Graham", "Webber", None, true);
    graham.owned = vec![House::new(3)];
    let graham = people.save(&mut session, &graham).unwrap();
    session.commit().unwrap();
    assert!(!session.is_active());

    let mut next = begin(&store);
    let loaded = people.find_by_id(&mut next, graham.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded, graham);
    assert_eq!(store.vertex_count(), 2);
    assert_eq!(store.edge_count(), 1);
}

#[test]
fn test_dropping_an_open_session_rolls_back() {
    let store = InMemoryGraphStore::new();
    let people = people();

    {
        let mut session = begin(&store);
        people
            .save(&mut session, &Person::new("Jake", "Webber", None, false))
            .unwrap();
    }

    let mut next = begin(&store);
    assert_eq!(people.count(&mut next).unwrap(), 0);
}

#[test]
fn test_transaction_helper_commits_or_rolls_back() {
    let store = InMemoryGraphStore::new();
    let people = people();
    let mut session = GraphSession::open(&store).unwrap();

    let failed: Result<(), OgmError> = session.transaction(|s| {
        people.save(s, &Person::new("Lara", "Ivanovic", None, true))?;
        Err(QueryError::UnknownMethod("abort".to_string()).into())
    });
    assert!(failed.is_err());
    assert!(!session.is_active());

    let saved = session
        .transaction(|s| people.save(s, &Person::new("Vanja", "Ivanovic", None, true)))
        .unwrap();

    let mut next = begin(&store);
    let all = people.find_all(&mut next).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, saved.id);
}

#[test]
fn test_graph_access_requires_an_open_transaction() {
    let store = InMemoryGraphStore::new();
    let people = people();
    let mut session = GraphSession::open(&store).unwrap();

    assert!(matches!(
        people.count(&mut session),
        Err(OgmError::Transaction(TransactionError::NoActiveTransaction))
    ));
    assert!(matches!(session.commit(), Err(TransactionError::NoActiveTransaction)));

    session.begin().unwrap();
    assert!(matches!(session.begin(), Err(TransactionError::TransactionAlreadyActive)));
}

#[test]
fn test_identity_map_is_scoped_to_one_transaction() {
    let store = InMemoryGraphStore::new();
    let people = people();
    let mapper = people.dispatcher().mapper();

    let mut session = begin(&store);
    let id = people
        .save(&mut session, &Person::new("Graham", "Webber", None, true))
        .unwrap()
        .id
        .unwrap();

    let first = mapper.find_by_id(&mut session, "Person", id).unwrap().unwrap();
    let second = mapper.find_by_id(&mut session, "Person", id).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    session.commit().unwrap();

    session.begin().unwrap();
    assert!(session.identity_map().is_empty());
    let third = mapper.find_by_id(&mut session, "Person", id).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(*first, *third);
}

#[test]
fn test_depth_limited_records_do_not_shadow_full_loads() {
    let store = InMemoryGraphStore::new();
    let registry = registry_with(OgmConfig {
        max_fetch_depth: 1,
        ..OgmConfig::default()
    });
    let people: Repository<Person> = Repository::new(registry.clone()).unwrap();
    let visits: Repository<Located> = Repository::new(registry).unwrap();
    let day = Utc.with_ymd_and_hms(2015, 6, 4, 9, 0, 0).unwrap();

    let mut session = begin(&store);
    let mut graham = Person::new("Graham", "Webber", None, true);
    graham.locations = vec![
        Located::at(Location::new(-33.0, 151.0), day),
        Located::at(Location::new(-32.0, 152.0), day),
    ];
    let id = people.save(&mut session, &graham).unwrap().id.unwrap();
    session.commit().unwrap();

    session.begin().unwrap();
    // each visit hydrates its person one hop away, with relationships left unloaded
    let all = visits.find_all(&mut session).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|visit| visit.person == Some(id)));

    let loaded = people.find_by_id(&mut session, id).unwrap().unwrap();
    assert_eq!(loaded.locations.len(), 2);

    let mapper = people.dispatcher().mapper();
    let first = mapper.find_by_id(&mut session, "Person", id).unwrap().unwrap();
    let second = mapper.find_by_id(&mut session, "Person", id).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.targets("locations").len(), 2);
}
