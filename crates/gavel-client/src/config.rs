//! Client configuration.

use crate::ReconnectPolicy;
use serde::{Deserialize, Serialize};

/// Where the auction socket is served by default.
pub const DEFAULT_URL: &str = "ws://localhost:8080/ws";

/// Where the authority lives and how to reach it again after a drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub url: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
