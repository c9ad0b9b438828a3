//! Auction state machine.
//!
//! Owns the single [`AuctionView`] of a session, folds inbound messages into
//! it, and reports what changed as [`AuctionEvent`]s. Outbound intents are
//! built here too, validated against the current phase before anything is
//! handed to the transport.

use crate::view::PLACEHOLDER_ITEM;
use crate::{AuctionView, Bidder, ConnectionStatus, InboundMessage, Intent, Phase};
use serde::{Deserialize, Serialize};

/// Something observable happened while folding a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuctionEvent {
    /// A new listing replaced the previous one. Commentary and other
    /// per-listing collaborators should reset on this.
    ListingChanged { item_name: String },
    PhaseChanged { from: Phase, to: Phase },
    /// Final result of a listing.
    Sold {
        item_name: String,
        amount: u64,
        bidder: String,
    },
    /// Text for a transient status line.
    Notice { text: String, severity: Severity },
    /// The transport went up or down.
    Connectivity { status: ConnectionStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Error,
}

/// Why an intent was refused before reaching the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    #[error("no running auction to bid on (phase: {phase})")]
    NotLive { phase: Phase },
    #[error("bid amount must be positive")]
    ZeroAmount,
    #[error("item name cannot be empty")]
    EmptyItemName,
}

/// Build a listing intent. Allowed in every phase; a new listing simply
/// replaces whatever is running.
pub fn listing_intent(item_name: &str, starting_amount: u64) -> Result<Intent, IntentError> {
    let item_name = item_name.trim();
    if item_name.is_empty() {
        return Err(IntentError::EmptyItemName);
    }
    Ok(Intent::StartListing {
        item_name: item_name.to_string(),
        starting_amount,
    })
}

/// The view of one session plus the rules for changing it.
#[derive(Debug, Clone, Default)]
pub struct AuctionMachine {
    view: AuctionView,
}

impl AuctionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a known view.
    pub fn with_view(view: AuctionView) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &AuctionView {
        &self.view
    }

    /// Fold `msg` into the view and report what changed.
    pub fn apply(&mut self, msg: &InboundMessage) -> Vec<AuctionEvent> {
        let next = self.view.apply(msg);
        let mut events = Vec::new();

        if next.item_name != self.view.item_name && next.item_name != PLACEHOLDER_ITEM {
            tracing::info!(item = %next.item_name, "listing changed");
            events.push(AuctionEvent::ListingChanged {
                item_name: next.item_name.clone(),
            });
        }

        if next.phase != self.view.phase {
            tracing::debug!(from = %self.view.phase, to = %next.phase, "phase changed");
            events.push(AuctionEvent::PhaseChanged {
                from: self.view.phase,
                to: next.phase,
            });
        }

        match msg {
            InboundMessage::Ended { content, .. } => {
                events.push(AuctionEvent::Sold {
                    item_name: next.item_name.clone(),
                    amount: next.current_amount,
                    bidder: next.high_bidder.clone(),
                });
                if let Some(text) = content {
                    events.push(notice(text, Severity::Info));
                }
            }
            InboundMessage::Update {
                content: Some(text),
                ..
            } => events.push(notice(text, Severity::Info)),
            InboundMessage::Error { content } => {
                tracing::warn!(%content, "authority reported an error");
                events.push(notice(content, Severity::Error));
            }
            InboundMessage::Echo(kind) => {
                tracing::trace!(%kind, "ignoring echoed intent");
            }
            InboundMessage::Update { .. } => {}
        }

        self.view = next;
        events
    }

    /// Build a bid intent for the running listing.
    pub fn submit_bid(&self, amount: u64, bidder: &Bidder) -> Result<Intent, IntentError> {
        self.view.bid_intent(amount, bidder)
    }

    /// Build a listing intent.
    pub fn submit_listing(
        &self,
        item_name: &str,
        starting_amount: u64,
    ) -> Result<Intent, IntentError> {
        listing_intent(item_name, starting_amount)
    }
}

fn notice(text: &str, severity: Severity) -> AuctionEvent {
    AuctionEvent::Notice {
        text: text.to_string(),
        severity,
    }
}
