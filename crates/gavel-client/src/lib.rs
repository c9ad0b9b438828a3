//! Client-side session handling for Gavel.
//!
//! [`ConnectionManager`] keeps one logical session to the auction authority
//! alive over any [`Connector`], reconnecting according to a
//! [`ReconnectPolicy`]. [`AuctionClient`] puts a
//! [`gavel_core::AuctionMachine`] on top of it: inbound records become view
//! updates and events, user actions become intents on the wire.

mod client;
mod config;
mod error;
mod manager;
pub mod memory;
mod policy;
mod transport;
mod websocket;

pub use client::AuctionClient;
pub use config::{ClientConfig, DEFAULT_URL};
pub use error::{ClientError, TransportError};
pub use manager::{ConnectionEvent, ConnectionHandle, ConnectionManager, Session, SessionId};
pub use policy::{Backoff, DEFAULT_RECONNECT_DELAY, PolicyError, ReconnectPolicy};
pub use transport::{BoxSink, BoxStream, Connector, Link};
pub use websocket::WebSocketConnector;
