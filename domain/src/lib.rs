//! Todo domain: the in-process store and the mutation service that publishes a
//! domain event after every committed change.
//!
//! `web` depends on this crate only; it never reaches into `events` or `push`
//! directly.

pub use events::{EventPublisher, Id};

pub mod error;
pub mod store;
pub mod todo;

pub use store::{Store, TodoItem, TodoList};
pub use todo::TodoService;
