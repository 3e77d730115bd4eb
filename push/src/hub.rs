//! Broker transport: a JSON hub protocol spoken over a WebSocket.
//!
//! [`Connector`] and [`Connection`] are the seams the supervisor depends on;
//! [`WebSocketConnector`] is the production implementation. Each open
//! connection owns a reader task that answers for the inbound side: it swallows
//! the broker's echoes, sends keep-alive pings, and fires the closure callback
//! exactly once when the connection goes away for any reason.

use crate::error::{error, transport_error, Error, ErrorKind};
use crate::message::{
    decode, decode_handshake, encode, records, HandshakeRequest, Inbound, Invocation, Ping,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

/// Invoked once when a connection closes, whoever closed it.
pub type ClosedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Everything needed to open one broker connection.
pub struct ConnectRequest {
    /// Full hub URL including the access token, see [`hub_url`].
    pub url: String,
    /// Inbound invocation targets to accept and discard.
    pub ignored_events: HashSet<String>,
    pub on_closed: ClosedCallback,
}

/// Opens connections to the push broker.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: ConnectRequest) -> Result<Arc<dyn Connection>, Error>;
}

/// An open session with the push broker.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Invoke `target` on the broker with ordered `arguments`, without waiting for a result.
    async fn send(&self, target: &str, arguments: Vec<Value>) -> Result<(), Error>;

    /// Close the session. Safe to call on an already closed connection.
    async fn close(&self) -> Result<(), Error>;

    /// True once the connection has observed closure from either side.
    fn is_closed(&self) -> bool;
}

/// Build the hub endpoint URL for `broker_url`, carrying `token` as a query parameter.
/// HTTP(S) base URLs are mapped onto the matching WebSocket scheme.
pub fn hub_url(broker_url: &str, token: &str) -> String {
    let base = broker_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };

    format!("{base}/hubs/list?token={}", urlencoding::encode(token))
}

#[derive(Debug, Clone)]
pub struct HubOptions {
    /// Upper bound for opening the socket and completing the hub handshake.
    pub handshake_timeout: Duration,
    /// Interval between pings on an otherwise idle connection.
    pub keep_alive: Duration,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(15),
            keep_alive: Duration::from_secs(15),
        }
    }
}

pub struct WebSocketConnector {
    options: HubOptions,
}

impl WebSocketConnector {
    pub fn new(options: HubOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, request: ConnectRequest) -> Result<Arc<dyn Connection>, Error> {
        let ConnectRequest {
            url,
            ignored_events,
            on_closed,
        } = request;

        let (sink, stream) = timeout(
            self.options.handshake_timeout,
            open(&url, &ignored_events),
        )
        .await
            .map_err(|_| error(ErrorKind::Connect, "timed out connecting to push broker"))??;

        let connection = Arc::new(HubConnection {
            sink: Arc::new(Mutex::new(sink)),
            closed: CancellationToken::new(),
        });

        tokio::spawn(read_loop(
            stream,
            connection.sink.clone(),
            connection.closed.clone(),
            ignored_events,
            self.options.keep_alive,
            on_closed,
        ));

        Ok(connection)
    }
}

/// Open the socket and run the hub handshake. Records that arrive in the same
/// frame as the handshake reply are handled here; a close among them fails the
/// connect.
async fn open(
    url: &str,
    ignored_events: &HashSet<String>,
) -> Result<(SplitSink<WsStream, Message>, SplitStream<WsStream>), Error> {
    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| transport_error(ErrorKind::Connect, e))?;

    let (mut sink, mut stream) = ws_stream.split();

    sink.send(Message::text(encode(&HandshakeRequest::json())?))
        .await
        .map_err(|e| transport_error(ErrorKind::Connect, e))?;

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let mut frame = records(text.as_str());
                let record = frame
                    .next()
                    .ok_or_else(|| error(ErrorKind::Protocol, "empty handshake response"))?;

                if let Some(reason) = decode_handshake(record)?.error {
                    return Err(error(
                        ErrorKind::Connect,
                        &format!("push broker rejected handshake: {reason}"),
                    ));
                }

                if !handle_records(frame, ignored_events) {
                    return Err(error(
                        ErrorKind::Connect,
                        "push broker closed the connection right after the handshake",
                    ));
                }

                return Ok((sink, stream));
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(error(
                    ErrorKind::Connect,
                    "push broker closed the connection during handshake",
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(transport_error(ErrorKind::Connect, e)),
        }
    }
}

async fn send_record<T: Serialize>(sink: &SharedSink, record: &T) -> Result<(), Error> {
    let frame = encode(record)?;
    sink.lock()
        .await
        .send(Message::text(frame))
        .await
        .map_err(|e| transport_error(ErrorKind::Send, e))
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    sink: SharedSink,
    closed: CancellationToken,
    ignored_events: HashSet<String>,
    keep_alive: Duration,
    on_closed: ClosedCallback,
) {
    let keep_alive = keep_alive.max(Duration::from_secs(1));
    let mut ping = interval_at(Instant::now() + keep_alive, keep_alive);

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            _ = ping.tick() => {
                if let Err(e) = send_record(&sink, &Ping::new()).await {
                    warn!("Keep-alive ping to push broker failed: {e}");
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !handle_frame(text.as_str(), &ignored_events) {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Push broker closed the connection: {frame:?}");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Push broker connection failed: {e}");
                    break;
                }
                None => {
                    info!("Push broker connection ended");
                    break;
                }
            }
        }
    }

    closed.cancel();
    on_closed();
}

/// Returns false once the broker asked to close the connection.
fn handle_frame(frame: &str, ignored_events: &HashSet<String>) -> bool {
    handle_records(records(frame), ignored_events)
}

fn handle_records<'a>(
    records: impl Iterator<Item = &'a str>,
    ignored_events: &HashSet<String>,
) -> bool {
    for record in records {
        match decode(record) {
            Ok(Inbound::Invocation { target }) if ignored_events.contains(&target) => {
                trace!("Ignoring echoed hub event {target}");
            }
            Ok(Inbound::Invocation { target }) => {
                debug!("Discarding unexpected hub event {target}");
            }
            Ok(Inbound::Ping) => trace!("Received hub ping"),
            Ok(Inbound::Close { error }) => {
                info!(
                    "Push broker requested close: {}",
                    error.as_deref().unwrap_or("no reason given")
                );
                return false;
            }
            Ok(Inbound::Other(kind)) => trace!("Ignoring hub record of type {kind}"),
            Err(e) => debug!("Discarding malformed hub record: {e}"),
        }
    }

    true
}

/// A live hub session. Writes are serialized through the shared sink; reads
/// belong to the reader task.
pub struct HubConnection {
    sink: SharedSink,
    closed: CancellationToken,
}

#[async_trait]
impl Connection for HubConnection {
    async fn send(&self, target: &str, arguments: Vec<Value>) -> Result<(), Error> {
        if self.closed.is_cancelled() {
            return Err(error(ErrorKind::Send, "push broker connection is closed"));
        }

        let result = send_record(&self.sink, &Invocation::new(target, arguments)).await;
        if result.is_err() {
            // Let the reader task wind down and fire the closure callback.
            self.closed.cancel();
        }
        result
    }

    async fn close(&self) -> Result<(), Error> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();

        match self.sink.lock().await.send(Message::Close(None)).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(transport_error(ErrorKind::Send, e)),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
