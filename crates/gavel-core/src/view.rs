//! The reconciled auction view.
//!
//! [`AuctionView`] is derived state: it is only ever produced by folding
//! [`InboundMessage`]s over the previous view. Nothing local (a submitted bid,
//! a started listing) touches it until the authority echoes the new state.

use crate::bidder::NO_BIDDER;
use crate::{Bidder, InboundMessage, Intent, IntentError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Item name shown before the authority has announced any listing.
pub const PLACEHOLDER_ITEM: &str = "Awaiting listing";

/// Lifecycle stage of the current listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing has been listed yet.
    AwaitingListing,
    /// The clock is running and bids are accepted.
    Live,
    /// The clock reads zero but no final result was announced.
    Ended,
    /// The authority announced the final price.
    Sold,
}

impl Phase {
    pub fn accepts_bids(&self) -> bool {
        matches!(self, Phase::Live)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::AwaitingListing => "awaiting listing",
            Phase::Live => "live",
            Phase::Ended => "ended",
            Phase::Sold => "sold",
        };
        f.write_str(s)
    }
}

/// What is being sold, for how much, by whom, with how much time left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionView {
    pub item_name: String,
    pub current_amount: u64,
    /// Display name of the high bidder, or `"none"`.
    pub high_bidder: String,
    /// Seconds left on the clock.
    pub time_remaining: u64,
    pub phase: Phase,
}

impl Default for AuctionView {
    fn default() -> Self {
        Self {
            item_name: PLACEHOLDER_ITEM.to_string(),
            current_amount: 0,
            high_bidder: NO_BIDDER.to_string(),
            time_remaining: 0,
            phase: Phase::AwaitingListing,
        }
    }
}

impl AuctionView {
    /// Fold one inbound message into the view, returning the next view.
    ///
    /// `Update` replaces amount and bidder wholesale (absent numeric fields
    /// keep their previous value) and derives the phase from the clock.
    /// `Ended` forces the clock to zero and marks the listing sold. Every
    /// other message leaves the view untouched.
    pub fn apply(&self, msg: &InboundMessage) -> AuctionView {
        match msg {
            InboundMessage::Update {
                item_name,
                amount,
                bidder,
                time_remaining,
                ..
            } => {
                let time_remaining = time_remaining.unwrap_or(self.time_remaining);
                AuctionView {
                    item_name: item_name.clone().unwrap_or_else(|| self.item_name.clone()),
                    current_amount: amount.unwrap_or(self.current_amount),
                    high_bidder: bidder_or_sentinel(bidder.as_deref()),
                    time_remaining,
                    phase: if time_remaining > 0 {
                        Phase::Live
                    } else {
                        Phase::Ended
                    },
                }
            }
            InboundMessage::Ended { amount, bidder, .. } => AuctionView {
                item_name: self.item_name.clone(),
                current_amount: amount.unwrap_or(self.current_amount),
                high_bidder: bidder_or_sentinel(bidder.as_deref()),
                time_remaining: 0,
                phase: Phase::Sold,
            },
            InboundMessage::Error { .. } | InboundMessage::Echo(_) => self.clone(),
        }
    }

    /// Whether the authority has announced a listing.
    pub fn has_listing(&self) -> bool {
        self.item_name != PLACEHOLDER_ITEM
    }

    /// Whether anyone has bid on the current listing.
    pub fn has_bids(&self) -> bool {
        self.high_bidder != NO_BIDDER
    }

    /// Whether `bidder` currently holds the high bid.
    pub fn is_leading(&self, bidder: &Bidder) -> bool {
        self.high_bidder == bidder.name()
    }

    /// The amount behind a fixed-increment bid button.
    pub fn next_bid(&self, increment: u64) -> u64 {
        self.current_amount.saturating_add(increment)
    }

    /// Build a bid intent, gated on the phase only.
    ///
    /// Whether `amount` beats the current price is for the authority to
    /// decide; the client just refuses to bid when nothing is running.
    pub fn bid_intent(&self, amount: u64, bidder: &Bidder) -> Result<Intent, IntentError> {
        if !self.phase.accepts_bids() {
            return Err(IntentError::NotLive { phase: self.phase });
        }
        if amount == 0 {
            return Err(IntentError::ZeroAmount);
        }
        Ok(Intent::Bid {
            bidder: bidder.clone(),
            amount,
        })
    }
}

fn bidder_or_sentinel(bidder: Option<&str>) -> String {
    bidder.unwrap_or(NO_BIDDER).to_string()
}
