//! Shared fixtures for store integration tests: a feed item owning an
//! ordered collection of tags, the canonical to-many/to-one pair.

// Each test binary uses its own subset of these fixtures
#![allow(dead_code)]

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use tether_core::errors::{Result, TetherError};
use tether_core::record::{Record, Row, Shared, SharedDyn, Value};
use tether_core::schema::EntitySchema;
use tether_store::StoreManager;

#[derive(Default, Debug)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub tags: Vec<Shared<Tag>>,
}

impl Item {
    pub fn named(name: &str) -> Self {
        Item {
            id: 0,
            name: name.to_string(),
            tags: Vec::new(),
        }
    }
}

impl Record for Item {
    fn type_name() -> &'static str {
        "Item"
    }

    fn schema() -> Result<EntitySchema> {
        EntitySchema::builder(Self::type_name())
            .id("Id")
            .text("Name")
            .one_to_many::<Tag>("Tags")
            .build()
    }

    fn from_row(mut row: Row) -> Result<Self> {
        Ok(Item {
            id: 0,
            name: row.text("Name")?,
            tags: Vec::new(),
        })
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone())]
    }

    fn reference_id(&self, _field: &str) -> Option<i64> {
        None
    }

    fn set_reference(&mut self, field: &str, _target: Rc<dyn Any>) -> Result<()> {
        Err(unknown_field::<Self>(field))
    }

    fn clear_reference_if(&mut self, _field: &str, _target_id: i64) -> bool {
        false
    }

    fn collection(&self, field: &str) -> Vec<SharedDyn> {
        match field {
            "Tags" => self
                .tags
                .iter()
                .map(|tag| -> SharedDyn { tag.clone() })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn clear_collection(&mut self, field: &str) {
        if field == "Tags" {
            self.tags.clear();
        }
    }

    fn push_to_collection(&mut self, field: &str, child: Rc<dyn Any>) -> Result<()> {
        if field != "Tags" {
            return Err(unknown_field::<Self>(field));
        }
        let tag = child
            .downcast::<RefCell<Tag>>()
            .map_err(|_| mismatch::<Self>(field, Tag::type_name()))?;
        self.tags.push(tag);
        Ok(())
    }

    fn remove_from_collection(&mut self, field: &str, child_id: i64) {
        if field == "Tags" {
            self.tags.retain(|tag| tag.borrow().id != child_id);
        }
    }
}

#[derive(Default, Debug)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub item: Option<Shared<Item>>,
}

impl Tag {
    pub fn named(name: &str, item: &Shared<Item>) -> Self {
        Tag {
            id: 0,
            name: name.to_string(),
            item: Some(item.clone()),
        }
    }
}

impl Record for Tag {
    fn type_name() -> &'static str {
        "Tag"
    }

    fn schema() -> Result<EntitySchema> {
        EntitySchema::builder(Self::type_name())
            .id("Id")
            .text("Name")
            .many_to_one::<Item>("Item")
            .build()
    }

    fn from_row(mut row: Row) -> Result<Self> {
        Ok(Tag {
            id: 0,
            name: row.text("Name")?,
            item: None,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn values(&self) -> Vec<Value> {
        let item = match &self.item {
            Some(item) => Value::Integer(item.borrow().id),
            None => Value::Null,
        };
        vec![Value::Text(self.name.clone()), item]
    }

    fn reference_id(&self, field: &str) -> Option<i64> {
        match field {
            "Item" => self.item.as_ref().map(|item| item.borrow().id),
            _ => None,
        }
    }

    fn set_reference(&mut self, field: &str, target: Rc<dyn Any>) -> Result<()> {
        if field != "Item" {
            return Err(unknown_field::<Self>(field));
        }
        let item = target
            .downcast::<RefCell<Item>>()
            .map_err(|_| mismatch::<Self>(field, Item::type_name()))?;
        self.item = Some(item);
        Ok(())
    }

    fn clear_reference_if(&mut self, field: &str, target_id: i64) -> bool {
        if field == "Item" && self.reference_id(field) == Some(target_id) {
            self.item = None;
            return true;
        }
        false
    }

    fn collection(&self, _field: &str) -> Vec<SharedDyn> {
        Vec::new()
    }

    fn clear_collection(&mut self, _field: &str) {}

    fn push_to_collection(&mut self, field: &str, _child: Rc<dyn Any>) -> Result<()> {
        Err(unknown_field::<Self>(field))
    }

    fn remove_from_collection(&mut self, _field: &str, _child_id: i64) {}
}

/// Build the error a record impl returns for an undeclared relation field
pub fn unknown_field<T: Record>(field: &str) -> TetherError {
    TetherError::UnknownRelationField {
        type_name: T::type_name().to_string(),
        field: field.to_string(),
    }
}

/// Build the error a record impl returns when a handle holds the wrong type
pub fn mismatch<T: Record>(field: &str, target: &str) -> TetherError {
    TetherError::ReferenceTypeMismatch {
        type_name: T::type_name().to_string(),
        field: field.to_string(),
        target: target.to_string(),
    }
}

/// In-memory manager with the Item and Tag tables created
pub fn setup_manager() -> StoreManager {
    let mut manager = StoreManager::open_in_memory().unwrap();
    manager.create_table::<Item>().unwrap();
    manager.create_table::<Tag>().unwrap();
    manager
}

/// Run a single-value COUNT-style query against the raw connection
pub fn count(manager: &StoreManager, sql: &str) -> i64 {
    manager
        .connection()
        .query_row(sql, [], |row| row.get(0))
        .unwrap()
}
