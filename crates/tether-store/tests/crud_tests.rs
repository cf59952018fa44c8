// Integration tests for the core persistence cycle: save, retrieve through
// the cache and the store, update, delete, eject.

mod common;

use std::rc::Rc;

use common::{count, setup_manager, Item, Tag};
use tether_core::errors::{ErrorKind, TetherError};
use tether_core::record::shared;
use tether_store::StoreManager;

#[test]
fn test_save_assigns_store_generated_ids() {
    let mut manager = setup_manager();

    let first = shared(Item::named("a"));
    manager.save(&first).unwrap();
    assert_eq!(first.borrow().id, 1);

    let second = shared(Item::named("b"));
    manager.save(&second).unwrap();
    assert_eq!(second.borrow().id, 2);
}

#[test]
fn test_round_trip_preserves_scalars() {
    // Given: a saved record evicted from the cache
    let mut manager = setup_manager();
    let item = shared(Item::named("tatatoto"));
    manager.save(&item).unwrap();
    let id = item.borrow().id;
    manager.eject_from_cache(&item);

    // When: it is retrieved again
    let reloaded = manager.retrieve::<Item>(id).unwrap();

    // Then: the reload is a fresh instance with equal scalar fields
    assert!(
        !Rc::ptr_eq(&item, &reloaded),
        "eject should force a fresh load"
    );
    assert_eq!(reloaded.borrow().id, id);
    assert_eq!(reloaded.borrow().name, "tatatoto");
}

#[test]
fn test_retrieve_is_idempotent_and_shares_the_instance() {
    let mut manager = setup_manager();
    let item = shared(Item::named("a"));
    manager.save(&item).unwrap();
    let id = item.borrow().id;

    let first = manager.retrieve::<Item>(id).unwrap();
    let second = manager.retrieve::<Item>(id).unwrap();
    assert!(Rc::ptr_eq(&first, &second));

    // The second call must not touch the store: drop the table behind the
    // manager's back and retrieve again.
    manager
        .connection()
        .execute("DROP TABLE \"Item\"", [])
        .unwrap();
    let third = manager.retrieve::<Item>(id).unwrap();
    assert!(Rc::ptr_eq(&first, &third));
}

#[test]
fn test_crud_cycle_through_cache_and_store() {
    let mut manager = setup_manager();
    let item = shared(Item::named("tatatoto"));
    manager.save(&item).unwrap();
    let id = item.borrow().id;

    // Retrieve from the cache: the very instance that was saved
    let cached = manager.retrieve::<Item>(id).unwrap();
    assert!(
        Rc::ptr_eq(&item, &cached),
        "retrieve after save should hit the cache"
    );

    // Eject, retrieve from the store
    manager.eject_from_cache(&cached);
    let from_store = manager.retrieve::<Item>(id).unwrap();
    assert_eq!(from_store.borrow().name, "tatatoto");

    // Update, eject, retrieve shows the new value
    from_store.borrow_mut().name = "totoro".to_string();
    manager.update(&from_store).unwrap();
    manager.eject_from_cache(&from_store);
    let updated = manager.retrieve::<Item>(id).unwrap();
    assert_eq!(updated.borrow().name, "totoro");

    // Delete, then retrieve is the distinguished NotFound
    manager.delete(&updated).unwrap();
    let err = manager.retrieve::<Item>(id).unwrap_err();
    assert!(matches!(err, TetherError::NotFound { .. }));
}

#[test]
fn test_update_of_missing_row_is_not_found_and_changes_nothing() {
    let mut manager = setup_manager();
    let item = shared(Item::named("a"));
    manager.save(&item).unwrap();

    let ghost = shared(Item {
        id: item.borrow().id + 123,
        name: "ghost".to_string(),
        tags: Vec::new(),
    });
    let err = manager.update(&ghost).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // The store is unchanged
    assert_eq!(count(&manager, "SELECT COUNT(*) FROM \"Item\""), 1);
    manager.eject_from_cache(&item);
    let id = item.borrow().id;
    let reloaded = manager.retrieve::<Item>(id).unwrap();
    assert_eq!(reloaded.borrow().name, "a");
}

#[test]
fn test_delete_of_missing_row_is_not_found() {
    let mut manager = setup_manager();
    let item = shared(Item::named("a"));
    manager.save(&item).unwrap();
    manager.delete(&item).unwrap();

    let err = manager.delete(&item).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_delete_removes_the_cache_entry() {
    let mut manager = setup_manager();
    let item = shared(Item::named("a"));
    manager.save(&item).unwrap();
    let id = item.borrow().id;

    manager.delete(&item).unwrap();

    // A later retrieve misses the cache and the store
    let err = manager.retrieve::<Item>(id).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_create_table_replaces_existing_rows() {
    let mut manager = setup_manager();
    let item = shared(Item::named("a"));
    manager.save(&item).unwrap();
    assert_eq!(count(&manager, "SELECT COUNT(*) FROM \"Item\""), 1);

    manager.create_table::<Item>().unwrap();
    assert_eq!(count(&manager, "SELECT COUNT(*) FROM \"Item\""), 0);
}

#[test]
fn test_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tether.db");

    let id = {
        let mut manager = StoreManager::open(&path).unwrap();
        manager.create_table::<Item>().unwrap();
        manager.create_table::<Tag>().unwrap();
        let item = shared(Item::named("persisted"));
        manager.save(&item).unwrap();
        let saved_id = item.borrow().id;
        saved_id
    };

    let mut manager = StoreManager::open(&path).unwrap();
    let item = manager.retrieve::<Item>(id).unwrap();
    assert_eq!(item.borrow().name, "persisted");
}

#[test]
fn test_ping() {
    let manager = setup_manager();
    manager.ping().unwrap();
}
