//! Push notification relay for real-time todo updates.
//!
//! Every committed change to a todo list or item is broadcast to the push
//! broker, which fans it out to subscribed clients. The relay is strictly
//! best-effort: it never makes a mutation wait on the network and never fails
//! one because the broker is unreachable.
//!
//! # Architecture
//!
//! - **Single connection**: the relay keeps at most one outbound connection to
//!   the broker, opened lazily on the first broadcast (or at startup).
//! - **Fresh credentials per connect**: each connect attempt exchanges the
//!   relay's client id/secret for a new access token. Tokens are not cached.
//! - **Demand-driven reconnect**: a connection that closes or fails a write is
//!   forgotten; the next broadcast opens a new one. There is no timer-driven
//!   reconnect and no replay of dropped events.
//! - **Single-flight connect**: concurrent broadcasts while disconnected share
//!   one connect attempt.
//!
//! # Message Flow
//!
//! 1. The domain commits a change and publishes a `DomainEvent` detached from
//!    the request
//! 2. `PushDomainEventHandler` maps it onto the matching `PushService` method
//! 3. `PushRelay` asks the `Supervisor` for a connection, connecting if needed
//! 4. The event is sent as a hub invocation, or dropped if no connection could
//!    be established
//!
//! # Modules
//!
//! - `credentials`: client-credentials token exchange
//! - `hub`: WebSocket hub transport and the `Connector`/`Connection` seams
//! - `message`: hub protocol records and target names
//! - `connection`: the `Supervisor` owning the single connection
//! - `relay`: `PushService`, `PushRelay` and `NoopPushService`
//! - `domain_event_handler`: adapter from domain events to broadcasts

pub mod connection;
pub mod credentials;
pub mod domain_event_handler;
pub mod error;
pub mod hub;
pub mod message;
pub mod relay;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ConnectionState, Supervisor};
pub use domain_event_handler::PushDomainEventHandler;
pub use error::{Error, ErrorKind};
pub use relay::{NoopPushService, PushRelay, PushService};
