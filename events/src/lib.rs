//! Event system infrastructure for the todo platform.
//!
//! This crate provides the event system that enables loose coupling between
//! domain logic and infrastructure concerns (like push notifications).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all business events in the system
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers, either inline
//!   or detached from the caller through [`background::run_detached`]
//!
//! This crate has no dependencies on internal crates (domain, push, etc.),
//! avoiding circular dependencies.

use async_trait::async_trait;
use log::*;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub mod background;

/// A type alias that represents the id of a todo list or todo item.
pub type Id = i32;

/// Error type returned by event handlers. Handlers live in infrastructure crates
/// with their own error types, so they are boxed at this boundary.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Domain events that represent business-level changes in the system.
/// These events are emitted only after the corresponding mutation has been
/// committed to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A new todo list was created.
    ListCreated { list_id: Id, name: String },
    /// An existing todo list was given a new name.
    ListRenamed { list_id: Id, name: String },
    /// A todo list and all of its items were removed.
    ListDeleted { list_id: Id },
    /// A new item was added to a list.
    ItemAdded {
        list_id: Id,
        item_id: Id,
        text: String,
    },
    /// The text of an existing item changed.
    ItemTextChanged {
        list_id: Id,
        item_id: Id,
        text: String,
    },
    /// An item was toggled; `done` carries the new state.
    ItemDoneChanged { list_id: Id, item_id: Id, done: bool },
    /// An item was removed from its list.
    ItemDeleted { list_id: Id, item_id: Id },
}

/// Trait for handling domain events.
/// Implementations can perform side effects like sending notifications,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// A failing handler does not stop the remaining handlers from running;
    /// the first error encountered is returned once all of them have run.
    pub async fn publish(&self, event: DomainEvent) -> Result<(), HandlerError> {
        let mut first_error = None;

        for handler in self.handlers.iter() {
            if let Err(e) = handler.handle(&event).await {
                debug!("Event handler failed for {event:?}: {e}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Publish an event without making the caller wait for the handlers.
    /// Any handler failure is logged by the background task runner and never
    /// reaches the caller.
    ///
    /// Must be called from within a tokio runtime.
    pub fn publish_detached(&self, event: DomainEvent) -> JoinHandle<()> {
        let publisher = self.clone();
        background::run_detached(async move { publisher.publish(event).await })
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
