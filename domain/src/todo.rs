//! Todo list and item mutations.
//!
//! Each successful mutation publishes its domain event detached from the
//! caller, and only after the store has committed the change. Whatever happens
//! to the event afterwards cannot fail or slow down the mutation.

use crate::error::Error;
use crate::store::{Insert, Store, TodoItem};
use events::{DomainEvent, EventPublisher, Id};
use log::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Longest item text accepted, in characters.
pub const MAX_ITEM_TEXT_LENGTH: usize = 250;

#[derive(Clone)]
pub struct TodoService {
    store: Arc<Store>,
    publisher: EventPublisher,
}

impl TodoService {
    pub fn new(store: Arc<Store>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    /// All list names keyed by list id.
    pub async fn all_lists(&self) -> BTreeMap<Id, String> {
        self.store
            .lists()
            .await
            .into_iter()
            .map(|list| (list.id, list.name))
            .collect()
    }

    pub async fn list_name(&self, list_id: Id) -> Result<String, Error> {
        Ok(self.store.find_list(list_id).await?.name)
    }

    pub async fn all_items(&self, list_id: Id) -> Result<Vec<TodoItem>, Error> {
        self.store.items(list_id).await
    }

    /// Create a list, or return the id of the list that already has this name.
    pub async fn add_list(&self, name: &str) -> Result<Id, Error> {
        let name = validate_name(name)?;

        match self.store.insert_list(name).await? {
            Insert::Existing(list) => {
                debug!("Todo list named {name:?} already exists with id {}", list.id);
                Ok(list.id)
            }
            Insert::Created(list) => {
                info!("Created todo list {}", list.id);
                let list_id = list.id;
                self.publish(DomainEvent::ListCreated {
                    list_id,
                    name: list.name,
                });
                Ok(list_id)
            }
        }
    }

    /// Add an item, or return the id of the item in this list that already has this text.
    pub async fn add_item(&self, list_id: Id, text: &str) -> Result<Id, Error> {
        let text = validate_text(text)?;

        match self.store.insert_item(list_id, text).await? {
            Insert::Existing(item) => {
                debug!(
                    "Todo item {text:?} already exists in list {list_id} with id {}",
                    item.id
                );
                Ok(item.id)
            }
            Insert::Created(item) => {
                info!("Added todo item {} to list {list_id}", item.id);
                let item_id = item.id;
                self.publish(DomainEvent::ItemAdded {
                    list_id,
                    item_id,
                    text: item.text,
                });
                Ok(item_id)
            }
        }
    }

    pub async fn change_list_name(&self, list_id: Id, name: &str) -> Result<(), Error> {
        let name = validate_name(name)?;
        let list = self.store.rename_list(list_id, name).await?;

        self.publish(DomainEvent::ListRenamed {
            list_id,
            name: list.name,
        });
        Ok(())
    }

    pub async fn change_item_text(&self, list_id: Id, item_id: Id, text: &str) -> Result<(), Error> {
        let text = validate_text(text)?;
        let item = self.store.update_item_text(list_id, item_id, text).await?;

        self.publish(DomainEvent::ItemTextChanged {
            list_id,
            item_id,
            text: item.text,
        });
        Ok(())
    }

    pub async fn toggle_item_done(&self, list_id: Id, item_id: Id) -> Result<(), Error> {
        let item = self.store.toggle_item(list_id, item_id).await?;

        self.publish(DomainEvent::ItemDoneChanged {
            list_id,
            item_id,
            done: item.done,
        });
        Ok(())
    }

    /// Delete a list and its items. Returns false if the list did not exist.
    pub async fn delete_list(&self, list_id: Id) -> bool {
        if !self.store.remove_list(list_id).await {
            return false;
        }

        info!("Deleted todo list {list_id}");
        self.publish(DomainEvent::ListDeleted { list_id });
        true
    }

    /// Returns false if the list had no such item.
    pub async fn delete_item(&self, list_id: Id, item_id: Id) -> bool {
        if !self.store.remove_item(list_id, item_id).await {
            return false;
        }

        self.publish(DomainEvent::ItemDeleted { list_id, item_id });
        true
    }

    fn publish(&self, event: DomainEvent) {
        // Dropping the handle detaches the broadcast from this request.
        drop(self.publisher.publish_detached(event));
    }
}

fn validate_name(name: &str) -> Result<&str, Error> {
    if name.trim().is_empty() {
        return Err(Error::invalid("todo list name is required"));
    }
    Ok(name)
}

fn validate_text(text: &str) -> Result<&str, Error> {
    if text.trim().is_empty() {
        return Err(Error::invalid("todo item text is required"));
    }
    if text.chars().count() > MAX_ITEM_TEXT_LENGTH {
        return Err(Error::invalid(format!(
            "todo item text is longer than {MAX_ITEM_TEXT_LENGTH} characters"
        )));
    }
    Ok(text)
}
