//! The transport seam.
//!
//! The connection manager does not know what a socket is. It asks a
//! [`Connector`] for a fresh [`Link`] on every attempt and treats the link as
//! a pair of text channels: anything that can open one can carry a session.

use crate::TransportError;
use futures_util::{Sink, Stream};
use std::future::Future;
use std::pin::Pin;

/// Outbound half of a link.
pub type BoxSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a link. Ends when the peer closes.
pub type BoxStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// One open connection to the authority.
pub struct Link {
    pub sink: BoxSink,
    pub stream: BoxStream,
}

impl Link {
    pub fn new(sink: BoxSink, stream: BoxStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens links to the authority.
pub trait Connector: Send + Sync + 'static {
    /// Perform one handshake. Resolving `Ok` moves the session to connected.
    fn connect(&self) -> impl Future<Output = Result<Link, TransportError>> + Send;
}
