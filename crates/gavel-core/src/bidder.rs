//! Bidder identity.
//!
//! A bidder is identified by a free-form display name supplied by whoever
//! runs the client. Names are not unique and carry no authentication; the
//! authority simply echoes them back as the high bidder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel the view uses for "no bid has been placed".
pub const NO_BIDDER: &str = "none";

/// A bidder's display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bidder {
    name: String,
}

impl Bidder {
    /// Create a bidder from a display name, trimming surrounding whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, BidderParseError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(BidderParseError::Empty);
        }
        if trimmed == NO_BIDDER {
            return Err(BidderParseError::Reserved(trimmed.to_string()));
        }
        Ok(Self {
            name: trimmed.to_string(),
        })
    }

    /// A guest name of the form `Guest-<n>`.
    pub fn guest(n: u32) -> Self {
        Self {
            name: format!("Guest-{n}"),
        }
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Bidder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for Bidder {
    type Err = BidderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Bidder {
    type Error = BidderParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Bidder> for String {
    fn from(bidder: Bidder) -> Self {
        bidder.name
    }
}

/// Error parsing a bidder name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BidderParseError {
    #[error("bidder name cannot be empty")]
    Empty,
    #[error("bidder name {0:?} is reserved")]
    Reserved(String),
}
