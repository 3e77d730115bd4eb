//! Hub protocol records exchanged with the push broker.
//!
//! Records are JSON objects terminated by the ASCII record separator. The relay
//! only ever sends non-blocking invocations (no invocation id, no completion) and
//! pings; inbound traffic is limited to the handshake response, pings, close
//! notices, and echoes of its own broadcasts.

use crate::error::{error, Error, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Terminates every hub protocol record.
pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u8 = 1;
const PING: u8 = 6;
const CLOSE: u8 = 7;

/// Hub methods the relay invokes on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubTarget {
    ListAdded,
    ListRenamed,
    ListDeleted,
    ItemAdded,
    ItemNameChanged,
    ItemDoneChanged,
    ItemDeleted,
}

impl HubTarget {
    pub const ALL: [HubTarget; 7] = [
        HubTarget::ListAdded,
        HubTarget::ListRenamed,
        HubTarget::ListDeleted,
        HubTarget::ItemAdded,
        HubTarget::ItemNameChanged,
        HubTarget::ItemDoneChanged,
        HubTarget::ItemDeleted,
    ];

    /// Method name as invoked on the broker.
    pub fn name(&self) -> &'static str {
        match self {
            HubTarget::ListAdded => "ListAdded",
            HubTarget::ListRenamed => "ListRenamed",
            HubTarget::ListDeleted => "ListDeleted",
            HubTarget::ItemAdded => "ItemAdded",
            HubTarget::ItemNameChanged => "ItemNameChanged",
            HubTarget::ItemDoneChanged => "ItemDoneChanged",
            HubTarget::ItemDeleted => "ItemDeleted",
        }
    }

    /// Name under which the broker fans the event back out to subscribers,
    /// including this relay.
    pub fn echo_name(&self) -> &'static str {
        match self {
            HubTarget::ListAdded => "listAdded",
            HubTarget::ListRenamed => "listRenamed",
            HubTarget::ListDeleted => "listDeleted",
            HubTarget::ItemAdded => "itemAdded",
            HubTarget::ItemNameChanged => "itemNameChanged",
            HubTarget::ItemDoneChanged => "itemDoneChanged",
            HubTarget::ItemDeleted => "itemDeleted",
        }
    }
}

impl fmt::Display for HubTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inbound invocation targets that are accepted and discarded without side effects.
pub fn ignored_events() -> HashSet<String> {
    HubTarget::ALL
        .iter()
        .map(|target| target.echo_name().to_string())
        .collect()
}

#[derive(Debug, Serialize)]
pub(crate) struct HandshakeRequest {
    protocol: &'static str,
    version: u32,
}

impl HandshakeRequest {
    pub(crate) fn json() -> Self {
        Self {
            protocol: "json",
            version: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HandshakeResponse {
    #[serde(default)]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Invocation<'a> {
    #[serde(rename = "type")]
    kind: u8,
    target: &'a str,
    arguments: Vec<Value>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(target: &'a str, arguments: Vec<Value>) -> Self {
        Self {
            kind: INVOCATION,
            target,
            arguments,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Ping {
    #[serde(rename = "type")]
    kind: u8,
}

impl Ping {
    pub(crate) fn new() -> Self {
        Self { kind: PING }
    }
}

/// Any record the broker may send after the handshake.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    Invocation { target: String },
    Ping,
    Close { error: Option<String> },
    Other(u8),
}

/// Serialize a record and append the record separator.
pub(crate) fn encode<T: Serialize>(record: &T) -> Result<String, Error> {
    let mut frame = serde_json::to_string(record)?;
    frame.push(RECORD_SEPARATOR);
    Ok(frame)
}

/// Split a text frame into its records, skipping empty trailing segments.
pub(crate) fn records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

pub(crate) fn decode_handshake(record: &str) -> Result<HandshakeResponse, Error> {
    Ok(serde_json::from_str(record)?)
}

pub(crate) fn decode(record: &str) -> Result<Inbound, Error> {
    let raw: RawRecord = serde_json::from_str(record)?;

    Ok(match raw.kind {
        INVOCATION => Inbound::Invocation {
            target: raw
                .target
                .ok_or_else(|| error(ErrorKind::Protocol, "invocation without target"))?,
        },
        PING => Inbound::Ping,
        CLOSE => Inbound::Close { error: raw.error },
        other => Inbound::Other(other),
    })
}
