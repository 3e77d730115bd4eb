//! In-process storage for todo lists and their items.
//!
//! Every operation takes the table lock once, so a check and the write that
//! depends on it (duplicate detection, cascading deletes) happen atomically.

use crate::error::Error;
use events::Id;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    pub id: Id,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: Id,
    pub list_id: Id,
    pub text: String,
    pub done: bool,
}

/// Outcome of an insert that refuses duplicate names.
#[derive(Debug, PartialEq)]
pub enum Insert<T> {
    Created(T),
    /// A record with the same name (ignoring case) already existed.
    Existing(T),
}

#[derive(Debug, Default)]
struct Tables {
    lists: BTreeMap<Id, TodoList>,
    items: BTreeMap<Id, TodoItem>,
    last_list_id: Id,
    last_item_id: Id,
}

impl Tables {
    fn list(&self, list_id: Id) -> Result<&TodoList, Error> {
        self.lists
            .get(&list_id)
            .ok_or_else(|| Error::not_found(format!("todo list {list_id}")))
    }

    fn item_mut(&mut self, list_id: Id, item_id: Id) -> Result<&mut TodoItem, Error> {
        self.list(list_id)?;
        self.items
            .get_mut(&item_id)
            .filter(|item| item.list_id == list_id)
            .ok_or_else(|| Error::not_found(format!("todo item {item_id} in list {list_id}")))
    }

    fn next_list_id(&mut self) -> Result<Id, Error> {
        self.last_list_id = self
            .last_list_id
            .checked_add(1)
            .ok_or_else(|| Error::other("todo list ids exhausted"))?;
        Ok(self.last_list_id)
    }

    fn next_item_id(&mut self) -> Result<Id, Error> {
        self.last_item_id = self
            .last_item_id
            .checked_add(1)
            .ok_or_else(|| Error::other("todo item ids exhausted"))?;
        Ok(self.last_item_id)
    }

    fn push_list(&mut self, name: &str) -> Result<TodoList, Error> {
        let list = TodoList {
            id: self.next_list_id()?,
            name: name.to_string(),
        };
        self.lists.insert(list.id, list.clone());
        Ok(list)
    }

    fn push_item(&mut self, list_id: Id, text: &str, done: bool) -> Result<TodoItem, Error> {
        let item = TodoItem {
            id: self.next_item_id()?,
            list_id,
            text: text.to_string(),
            done,
        };
        self.items.insert(item.id, item.clone());
        Ok(item)
    }
}

#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding one starter list with an open and a finished item.
    pub fn seeded() -> Self {
        let mut tables = Tables::default();
        // Fresh tables cannot run out of ids.
        if let Ok(list) = tables.push_list("Initial list") {
            let _ = tables.push_item(list.id, "First Item", false);
            let _ = tables.push_item(list.id, "Second Item", true);
        }

        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn lists(&self) -> Vec<TodoList> {
        self.tables.read().await.lists.values().cloned().collect()
    }

    pub async fn find_list(&self, list_id: Id) -> Result<TodoList, Error> {
        self.tables.read().await.list(list_id).cloned()
    }

    pub async fn insert_list(&self, name: &str) -> Result<Insert<TodoList>, Error> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .lists
            .values()
            .find(|list| list.name.to_lowercase() == name.to_lowercase())
        {
            return Ok(Insert::Existing(existing.clone()));
        }

        let list = tables.push_list(name)?;
        debug!("Inserted todo list: {list:?}");
        Ok(Insert::Created(list))
    }

    pub async fn rename_list(&self, list_id: Id, name: &str) -> Result<TodoList, Error> {
        let mut tables = self.tables.write().await;
        let list = tables
            .lists
            .get_mut(&list_id)
            .ok_or_else(|| Error::not_found(format!("todo list {list_id}")))?;

        list.name = name.to_string();
        Ok(list.clone())
    }

    /// Remove a list together with all of its items. Returns false if there was no such list.
    pub async fn remove_list(&self, list_id: Id) -> bool {
        let mut tables = self.tables.write().await;
        if tables.lists.remove(&list_id).is_none() {
            return false;
        }

        tables.items.retain(|_, item| item.list_id != list_id);
        true
    }

    pub async fn items(&self, list_id: Id) -> Result<Vec<TodoItem>, Error> {
        let tables = self.tables.read().await;
        tables.list(list_id)?;

        Ok(tables
            .items
            .values()
            .filter(|item| item.list_id == list_id)
            .cloned()
            .collect())
    }

    pub async fn insert_item(&self, list_id: Id, text: &str) -> Result<Insert<TodoItem>, Error> {
        let mut tables = self.tables.write().await;
        tables.list(list_id)?;

        if let Some(existing) = tables
            .items
            .values()
            .find(|item| item.list_id == list_id && item.text.to_lowercase() == text.to_lowercase())
        {
            return Ok(Insert::Existing(existing.clone()));
        }

        let item = tables.push_item(list_id, text, false)?;
        debug!("Inserted todo item: {item:?}");
        Ok(Insert::Created(item))
    }

    pub async fn update_item_text(
        &self,
        list_id: Id,
        item_id: Id,
        text: &str,
    ) -> Result<TodoItem, Error> {
        let mut tables = self.tables.write().await;
        let item = tables.item_mut(list_id, item_id)?;
        item.text = text.to_string();
        Ok(item.clone())
    }

    pub async fn toggle_item(&self, list_id: Id, item_id: Id) -> Result<TodoItem, Error> {
        let mut tables = self.tables.write().await;
        let item = tables.item_mut(list_id, item_id)?;
        item.done = !item.done;
        Ok(item.clone())
    }

    /// Returns false if the list has no such item.
    pub async fn remove_item(&self, list_id: Id, item_id: Id) -> bool {
        let mut tables = self.tables.write().await;
        if tables.item_mut(list_id, item_id).is_err() {
            return false;
        }

        tables.items.remove(&item_id).is_some()
    }
}
