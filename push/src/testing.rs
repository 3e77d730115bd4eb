//! In-memory stand-ins for the token endpoint and the broker, used by the
//! supervisor and relay tests.

use crate::credentials::TokenSource;
use crate::error::{error, Error, ErrorKind};
use crate::hub::{ClosedCallback, ConnectRequest, Connection, Connector};
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) struct FakeTokens {
    token: Option<String>,
    calls: AtomicUsize,
}

impl FakeTokens {
    pub(crate) fn granting(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: Some(token.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn denying() -> Arc<Self> {
        Arc::new(Self {
            token: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for FakeTokens {
    async fn fetch_token(&self) -> Option<SecretString> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token.clone().map(SecretString::new)
    }
}

#[derive(Default)]
pub(crate) struct FakeConnector {
    delay: Duration,
    refuse: AtomicBool,
    attempts: AtomicUsize,
    urls: Mutex<Vec<String>>,
    opened: Mutex<Vec<Arc<FakeConnection>>>,
    cancel_after_connect: Mutex<Option<CancellationToken>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every connect attempt takes `delay` before it completes.
    pub(crate) fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    /// Cancel `token` the moment a connection has been opened, as if the
    /// relay were stopped right as the connect completed.
    pub(crate) fn cancel_after_connect(&self, token: CancellationToken) {
        *self.cancel_after_connect.lock().unwrap() = Some(token);
    }

    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub(crate) fn opened(&self) -> Vec<Arc<FakeConnection>> {
        self.opened.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Arc<FakeConnection> {
        self.opened
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection was opened")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, request: ConnectRequest) -> Result<Arc<dyn Connection>, Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(request.url);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.refuse.load(Ordering::SeqCst) {
            return Err(error(ErrorKind::Connect, "connection refused"));
        }

        let connection = Arc::new(FakeConnection {
            ignored_events: request.ignored_events.into_iter().collect(),
            on_closed: Mutex::new(Some(request.on_closed)),
            ..FakeConnection::default()
        });
        self.opened.lock().unwrap().push(connection.clone());
        if let Some(token) = self.cancel_after_connect.lock().unwrap().as_ref() {
            token.cancel();
        }
        Ok(connection)
    }
}

#[derive(Default)]
pub(crate) struct FakeConnection {
    pub(crate) ignored_events: Vec<String>,
    sent: Mutex<Vec<(String, Vec<Value>)>>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
    on_closed: Mutex<Option<ClosedCallback>>,
}

impl FakeConnection {
    pub(crate) fn sent(&self) -> Vec<(String, Vec<Value>)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Simulate the broker dropping the connection.
    pub(crate) fn broker_close(&self) {
        self.mark_closed();
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let callback = self.on_closed.lock().unwrap().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send(&self, target: &str, arguments: Vec<Value>) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) || self.fail_sends.load(Ordering::SeqCst) {
            return Err(error(ErrorKind::Send, "broken pipe"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), arguments));
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.mark_closed();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
