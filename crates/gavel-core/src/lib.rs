//! Core types for Gavel.
//!
//! This crate has no I/O. It defines the wire records exchanged with the
//! auction authority, the reconciled [`AuctionView`], and the
//! [`AuctionMachine`] that folds inbound messages into that view and turns
//! user actions into validated [`Intent`]s.

mod bidder;
mod machine;
mod message;
mod view;

pub use bidder::{Bidder, BidderParseError, NO_BIDDER};
pub use machine::{AuctionEvent, AuctionMachine, IntentError, Severity, listing_intent};
pub use message::{DecodeError, InboundMessage, Intent, Record, RecordKind};
pub use view::{AuctionView, PLACEHOLDER_ITEM, Phase};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity of the session to the authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No transport; a retry may be pending.
    #[default]
    Disconnected,
    /// Waiting for the transport handshake.
    Connecting,
    /// Messages flow both ways.
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(s)
    }
}
