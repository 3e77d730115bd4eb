//! Ownership of the single broker connection.
//!
//! The [`Supervisor`] holds at most one [`ActiveConnection`]. It connects lazily
//! on demand, forgets a connection as soon as that connection reports closure,
//! and lets only one connect sequence run at a time. Every connection gets a
//! fresh generation number so that late closure callbacks and stale send
//! failures can only ever clear the connection they belong to.

use crate::credentials::TokenSource;
use crate::hub::{hub_url, ClosedCallback, ConnectRequest, Connection, Connector};
use crate::message::ignored_events;
use log::*;
use secrecy::ExposeSecret;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// A connection together with the generation it was opened as.
#[derive(Clone)]
pub struct ActiveConnection {
    pub generation: u64,
    pub connection: Arc<dyn Connection>,
}

impl fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ActiveConnection")
            .field("generation", &self.generation)
            .field("closed", &self.connection.is_closed())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type Slot = Mutex<Option<ActiveConnection>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<ActiveConnection>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Supervisor {
    tokens: Arc<dyn TokenSource>,
    connector: Arc<dyn Connector>,
    broker_url: String,
    // Only ever locked for short, non-async critical sections.
    current: Arc<Slot>,
    connect_gate: tokio::sync::Mutex<()>,
    // Bumped by every connect sequence, successful or not.
    attempts: AtomicU64,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        connector: Arc<dyn Connector>,
        broker_url: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            connector,
            broker_url: broker_url.into(),
            current: Arc::new(Mutex::new(None)),
            connect_gate: tokio::sync::Mutex::new(()),
            attempts: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelled once [`Supervisor::stop`] has been called.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Return the current connection, connecting first if there is none.
    ///
    /// A held connection is assumed usable until it reports closure; a stale
    /// one is only discovered by the next failing send. `None` means the
    /// broker is unreachable right now or the supervisor has been stopped.
    ///
    /// Callers that queue behind an in-flight connect share its outcome: if it
    /// failed they return `None` instead of starting another attempt.
    pub async fn ensure_connected(&self) -> Option<ActiveConnection> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        let attempts_seen = self.attempts.load(Ordering::SeqCst);

        if let Some(active) = self.live() {
            return Some(active);
        }

        let _gate = tokio::select! {
            _ = self.shutdown.cancelled() => return None,
            gate = self.connect_gate.lock() => gate,
        };

        // Someone else may have connected while we waited for the gate.
        if let Some(active) = self.live() {
            return Some(active);
        }

        if self.attempts.load(Ordering::SeqCst) != attempts_seen {
            debug!("Push broker connect attempt just failed, not retrying yet");
            return None;
        }

        self.connect().await
    }

    /// Fetch a fresh token and open a new connection. Must be called with the
    /// connect gate held.
    async fn connect(&self) -> Option<ActiveConnection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let token = tokio::select! {
            _ = self.shutdown.cancelled() => return None,
            token = self.tokens.fetch_token() => token,
        };

        let Some(token) = token else {
            warn!("No access token available, push broker connection not established");
            return None;
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let request = ConnectRequest {
            url: hub_url(&self.broker_url, token.expose_secret()),
            ignored_events: ignored_events(),
            on_closed: self.closed_callback(generation),
        };

        info!(
            "Connecting to push broker at {} (generation {generation})",
            self.broker_url
        );

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return None,
            result = self.connector.connect(request) => result,
        };

        let connection = match result {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Failed to connect to push broker: {e}");
                return None;
            }
        };

        let active = ActiveConnection {
            generation,
            connection,
        };

        let stored = {
            let mut slot = lock(&self.current);
            if self.shutdown.is_cancelled() {
                false
            } else {
                *slot = Some(active.clone());
                true
            }
        };

        if !stored {
            debug!("Push relay stopped while connecting, closing generation {generation}");
            if let Err(e) = active.connection.close().await {
                warn!("Error while closing push broker connection: {e}");
            }
            return None;
        }

        info!("Connected to push broker (generation {generation})");
        Some(active)
    }

    /// Clears the slot when the connection of `generation` closes, unless a
    /// newer connection has already replaced it.
    fn closed_callback(&self, generation: u64) -> ClosedCallback {
        let current = Arc::downgrade(&self.current);

        Box::new(move || {
            let Some(current) = current.upgrade() else {
                return;
            };

            let mut slot = lock(&current);
            if slot
                .as_ref()
                .is_some_and(|active| active.generation == generation)
            {
                *slot = None;
                info!("Push broker connection closed (generation {generation})");
            }
        })
    }

    /// Forget the connection of `generation` if it is still the current one,
    /// returning it so the caller can close it.
    pub fn discard(&self, generation: u64) -> Option<ActiveConnection> {
        let mut slot = lock(&self.current);
        if slot
            .as_ref()
            .is_some_and(|active| active.generation == generation)
        {
            debug!("Discarding push broker connection (generation {generation})");
            slot.take()
        } else {
            None
        }
    }

    /// Connect eagerly at service start. Failure is not fatal: the next
    /// broadcast tries again.
    pub async fn start(&self) {
        if self.ensure_connected().await.is_none() {
            warn!("Push broker unavailable at startup, will retry on the next broadcast");
        }
    }

    /// Close the current connection and refuse to reconnect from now on.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let active = lock(&self.current).take();
        if let Some(active) = active {
            info!(
                "Closing push broker connection (generation {})",
                active.generation
            );
            if let Err(e) = active.connection.close().await {
                warn!("Error while closing push broker connection: {e}");
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.live().is_some() {
            ConnectionState::Connected
        } else if self.connect_gate.try_lock().is_err() {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    fn live(&self) -> Option<ActiveConnection> {
        let mut slot = lock(&self.current);
        // Closed before its callback got to clear the slot.
        if slot
            .as_ref()
            .is_some_and(|active| active.connection.is_closed())
        {
            *slot = None;
        }
        slot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, FakeTokens};
    use futures_util::future::join_all;
    use std::time::Duration;

    fn supervisor(tokens: Arc<FakeTokens>, connector: Arc<FakeConnector>) -> Supervisor {
        Supervisor::new(tokens, connector, "http://broker.test")
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_single_connect() {
        let tokens = FakeTokens::granting("tok");
        let connector = FakeConnector::slow(Duration::from_millis(50));
        let supervisor = supervisor(tokens.clone(), connector.clone());

        let results = join_all((0..10).map(|_| supervisor.ensure_connected())).await;

        assert_eq!(connector.attempts(), 1);
        assert_eq!(tokens.calls(), 1);
        assert!(results
            .iter()
            .all(|active| active.as_ref().map(|a| a.generation) == Some(1)));
        assert_eq!(supervisor.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn connects_with_token_in_hub_url_and_ignores_echoes() {
        let connector = FakeConnector::new();
        let supervisor = supervisor(FakeTokens::granting("a+b"), connector.clone());

        assert!(supervisor.ensure_connected().await.is_some());

        assert_eq!(
            connector.urls(),
            vec!["ws://broker.test/hubs/list?token=a%2Bb".to_string()]
        );
        let connection = connector.last();
        assert_eq!(connection.ignored_events.len(), 7);
        assert!(connection
            .ignored_events
            .contains(&"itemDoneChanged".to_string()));
    }

    #[tokio::test]
    async fn missing_token_means_no_connect() {
        let tokens = FakeTokens::denying();
        let connector = FakeConnector::new();
        let supervisor = supervisor(tokens.clone(), connector.clone());

        assert!(supervisor.ensure_connected().await.is_none());
        assert_eq!(tokens.calls(), 1);
        assert_eq!(connector.attempts(), 0);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn failed_connect_leaves_slot_empty_and_next_call_retries() {
        let connector = FakeConnector::new();
        connector.refuse_connections(true);
        let supervisor = supervisor(FakeTokens::granting("tok"), connector.clone());

        assert!(supervisor.ensure_connected().await.is_none());
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);

        connector.refuse_connections(false);
        assert!(supervisor.ensure_connected().await.is_some());
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn closure_triggers_exactly_one_reconnect() {
        let tokens = FakeTokens::granting("tok");
        let connector = FakeConnector::new();
        let supervisor = supervisor(tokens.clone(), connector.clone());

        let first = supervisor.ensure_connected().await.unwrap();
        connector.last().broker_close();
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);

        let second = supervisor.ensure_connected().await.unwrap();
        let third = supervisor.ensure_connected().await.unwrap();

        assert_eq!(connector.attempts(), 2);
        assert_eq!(tokens.calls(), 2);
        assert!(second.generation > first.generation);
        assert_eq!(second.generation, third.generation);
    }

    #[tokio::test]
    async fn stale_closure_callback_keeps_newer_connection() {
        let connector = FakeConnector::new();
        let supervisor = supervisor(FakeTokens::granting("tok"), connector.clone());

        let first = supervisor.ensure_connected().await.unwrap();
        assert!(supervisor.discard(first.generation).is_some());
        let second = supervisor.ensure_connected().await.unwrap();

        // The old connection finally reports closure after being replaced.
        connector.opened()[0].broker_close();

        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert_eq!(
            supervisor.ensure_connected().await.unwrap().generation,
            second.generation
        );
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn discard_only_clears_matching_generation() {
        let supervisor = supervisor(FakeTokens::granting("tok"), FakeConnector::new());

        let active = supervisor.ensure_connected().await.unwrap();
        assert!(supervisor.discard(active.generation + 1).is_none());
        assert_eq!(supervisor.state(), ConnectionState::Connected);

        assert!(supervisor.discard(active.generation).is_some());
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn reports_connecting_while_a_connect_is_in_flight() {
        let connector = FakeConnector::slow(Duration::from_millis(200));
        let supervisor = Arc::new(supervisor(FakeTokens::granting("tok"), connector.clone()));

        let pending = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.ensure_connected().await.is_some() }
        });

        while connector.attempts() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(supervisor.state(), ConnectionState::Connecting);

        assert!(pending.await.unwrap());
        assert_eq!(supervisor.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn start_connects_eagerly_and_tolerates_failure() {
        let connector = FakeConnector::new();
        let supervisor = supervisor(FakeTokens::granting("tok"), connector.clone());
        supervisor.start().await;
        assert_eq!(supervisor.state(), ConnectionState::Connected);

        let unavailable = Supervisor::new(
            FakeTokens::denying(),
            FakeConnector::new(),
            "http://broker.test",
        );
        unavailable.start().await;
        assert_eq!(unavailable.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_prevents_reconnects() {
        let connector = FakeConnector::new();
        let supervisor = supervisor(FakeTokens::granting("tok"), connector.clone());

        supervisor.ensure_connected().await.unwrap();
        supervisor.stop().await;
        supervisor.stop().await;

        assert!(connector.last().is_closed());
        assert!(supervisor.shutdown_token().is_cancelled());
        assert!(supervisor.ensure_connected().await.is_none());
        assert_eq!(connector.attempts(), 1);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_failed_token_fetch() {
        let tokens = FakeTokens::denying();
        let connector = FakeConnector::new();
        let supervisor = supervisor(tokens.clone(), connector.clone());

        let results = join_all((0..10).map(|_| supervisor.ensure_connected())).await;

        assert!(results.iter().all(Option::is_none));
        assert_eq!(tokens.calls(), 1);
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_refused_connect() {
        let tokens = FakeTokens::granting("tok");
        let connector = FakeConnector::slow(Duration::from_millis(20));
        connector.refuse_connections(true);
        let supervisor = supervisor(tokens.clone(), connector.clone());

        let results = join_all((0..10).map(|_| supervisor.ensure_connected())).await;

        assert!(results.iter().all(Option::is_none));
        assert_eq!(connector.attempts(), 1);
        assert_eq!(tokens.calls(), 1);

        // A later broadcast is free to try again.
        connector.refuse_connections(false);
        assert!(supervisor.ensure_connected().await.is_some());
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn stop_landing_as_connect_completes_closes_the_new_connection() {
        let connector = FakeConnector::new();
        let supervisor = supervisor(FakeTokens::granting("tok"), connector.clone());
        connector.cancel_after_connect(supervisor.shutdown_token().clone());

        assert!(supervisor.ensure_connected().await.is_none());

        assert_eq!(connector.attempts(), 1);
        assert!(connector.last().is_closed());
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn stop_while_connecting_abandons_the_attempt() {
        let connector = FakeConnector::slow(Duration::from_millis(100));
        let supervisor = Arc::new(supervisor(FakeTokens::granting("tok"), connector.clone()));

        let pending = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.ensure_connected().await }
        });

        while connector.attempts() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        supervisor.stop().await;

        assert!(pending.await.unwrap().is_none());
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }
}
