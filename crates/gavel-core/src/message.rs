//! Wire records.
//!
//! Every logical event travels as one JSON object with a `type` tag. The
//! authority is not trusted to fill in every field, so inbound records are
//! decoded leniently: a field that is missing or has the wrong shape becomes
//! `None` and the fold carries the previous value forward.

use crate::Bidder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The `type` tag of a wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Update,
    End,
    Bid,
    Start,
    Error,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Update => "update",
            RecordKind::End => "end",
            RecordKind::Bid => "bid",
            RecordKind::Start => "start",
            RecordKind::Error => "error",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully populated record, as the authority emits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    pub amount: u64,
    pub username: String,
    pub time_left: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Record {
    /// A state snapshot for a running (or idle) listing.
    pub fn update(
        item_name: impl Into<String>,
        amount: u64,
        username: impl Into<String>,
        time_left: u64,
    ) -> Self {
        Self {
            kind: RecordKind::Update,
            item_name: Some(item_name.into()),
            amount,
            username: username.into(),
            time_left,
            content: None,
        }
    }

    /// The final state of a listing whose clock ran out.
    pub fn end(item_name: impl Into<String>, amount: u64, username: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::End,
            item_name: Some(item_name.into()),
            amount,
            username: username.into(),
            time_left: 0,
            content: Some("SOLD!".to_string()),
        }
    }

    /// A rejection addressed to a single client.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Error,
            item_name: None,
            amount: 0,
            username: String::new(),
            time_left: 0,
            content: Some(content.into()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound record with every field left untyped.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: String,
    item_name: Option<Value>,
    amount: Option<Value>,
    username: Option<Value>,
    time_left: Option<Value>,
    content: Option<Value>,
}

/// A message received from the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Current state of the listing.
    Update {
        item_name: Option<String>,
        amount: Option<u64>,
        bidder: Option<String>,
        time_remaining: Option<u64>,
        content: Option<String>,
    },
    /// The listing closed with a final price.
    Ended {
        amount: Option<u64>,
        bidder: Option<String>,
        content: Option<String>,
    },
    /// The authority reported a problem, usually a rejected intent.
    Error { content: String },
    /// An intent relayed back by the authority. Carries no state.
    Echo(RecordKind),
}

impl InboundMessage {
    /// Decode one inbound record.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let raw: RawRecord = serde_json::from_str(text)?;
        let kind: RecordKind = serde_json::from_value(Value::String(raw.kind.clone()))
            .map_err(|_| DecodeError::UnknownType(raw.kind.clone()))?;

        let msg = match kind {
            RecordKind::Update => InboundMessage::Update {
                item_name: text_field(raw.item_name.as_ref(), "item_name"),
                amount: count_field(raw.amount.as_ref(), "amount"),
                bidder: text_field(raw.username.as_ref(), "username"),
                time_remaining: count_field(raw.time_left.as_ref(), "time_left"),
                content: text_field(raw.content.as_ref(), "content"),
            },
            RecordKind::End => InboundMessage::Ended {
                amount: count_field(raw.amount.as_ref(), "amount"),
                bidder: text_field(raw.username.as_ref(), "username"),
                content: text_field(raw.content.as_ref(), "content"),
            },
            RecordKind::Error => InboundMessage::Error {
                content: text_field(raw.content.as_ref(), "content")
                    .unwrap_or_else(|| "authority reported an error".to_string()),
            },
            RecordKind::Bid | RecordKind::Start => InboundMessage::Echo(kind),
        };
        Ok(msg)
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            InboundMessage::Update { .. } => RecordKind::Update,
            InboundMessage::Ended { .. } => RecordKind::End,
            InboundMessage::Error { .. } => RecordKind::Error,
            InboundMessage::Echo(kind) => *kind,
        }
    }
}

/// Non-negative integer field; anything else counts as absent.
fn count_field(value: Option<&Value>, field: &'static str) -> Option<u64> {
    let value = value?;
    if value.is_null() {
        return None;
    }
    let count = value.as_u64();
    if count.is_none() {
        tracing::warn!(field, %value, "ignoring malformed numeric field");
    }
    count
}

/// Non-empty string field; anything else counts as absent.
fn text_field(value: Option<&Value>, field: &'static str) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => {
            tracing::warn!(field, value = %other, "ignoring malformed text field");
            None
        }
    }
}

/// A client-originated request. Not authoritative until echoed back as state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// Offer `amount` for the running listing.
    Bid {
        #[serde(rename = "username")]
        bidder: Bidder,
        amount: u64,
    },
    /// Open a new listing, replacing whatever is running.
    #[serde(rename = "start")]
    StartListing {
        item_name: String,
        #[serde(rename = "amount")]
        starting_amount: u64,
    },
}

impl Intent {
    pub fn kind(&self) -> RecordKind {
        match self {
            Intent::Bid { .. } => RecordKind::Bid,
            Intent::StartListing { .. } => RecordKind::Start,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Error decoding an inbound record.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown record type: {0:?}")]
    UnknownType(String),
}
