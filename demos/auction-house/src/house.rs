//! Auction rules.

use gavel_core::Record;

/// Opening bidder of every listing.
pub const HOUSE: &str = "House";
pub const LISTING_SECONDS: u64 = 60;
/// Bids landing with less than this many seconds left extend the clock.
pub const SNIPE_WINDOW: u64 = 10;
pub const SNIPE_EXTENSION: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Listing {
    item_name: String,
    amount: u64,
    bidder: String,
    time_left: u64,
}

/// The single listing this authority runs.
#[derive(Debug, Default)]
pub struct House {
    listing: Option<Listing>,
}

impl House {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, or `None` before the first listing.
    pub fn snapshot(&self) -> Option<Record> {
        self.listing.as_ref().map(|l| {
            if l.time_left > 0 {
                Record::update(&l.item_name, l.amount, &l.bidder, l.time_left)
            } else {
                Record::end(&l.item_name, l.amount, &l.bidder)
            }
        })
    }

    /// Replace whatever is running with a fresh listing.
    pub fn start(&mut self, item_name: String, starting_amount: u64) -> Record {
        tracing::info!(item = %item_name, starting_amount, "listing opened");
        let record = Record::update(&item_name, starting_amount, HOUSE, LISTING_SECONDS);
        self.listing = Some(Listing {
            item_name,
            amount: starting_amount,
            bidder: HOUSE.to_string(),
            time_left: LISTING_SECONDS,
        });
        record
    }

    /// Accept a bid, or explain why not. The message goes back to the bidder only.
    pub fn bid(&mut self, bidder: &str, amount: u64) -> Result<Record, String> {
        let listing = match self.listing.as_mut() {
            Some(l) if l.time_left > 0 => l,
            _ => return Err("No auction is running".to_string()),
        };
        if amount <= listing.amount {
            return Err(format!("Bid must exceed ${}", listing.amount));
        }
        listing.amount = amount;
        listing.bidder = bidder.to_string();
        if listing.time_left < SNIPE_WINDOW {
            listing.time_left += SNIPE_EXTENSION;
        }
        tracing::info!(bidder, amount, time_left = listing.time_left, "bid accepted");
        Ok(Record::update(
            &listing.item_name,
            listing.amount,
            &listing.bidder,
            listing.time_left,
        ))
    }

    /// Advance the clock by one second. Returns the record to broadcast, if any.
    pub fn tick(&mut self) -> Option<Record> {
        let listing = self.listing.as_mut().filter(|l| l.time_left > 0)?;
        listing.time_left -= 1;
        if listing.time_left == 0 {
            tracing::info!(
                item = %listing.item_name,
                amount = listing.amount,
                bidder = %listing.bidder,
                "sold"
            );
            return Some(Record::end(&listing.item_name, listing.amount, &listing.bidder));
        }
        Some(Record::update(
            &listing.item_name,
            listing.amount,
            &listing.bidder,
            listing.time_left,
        ))
    }
}
