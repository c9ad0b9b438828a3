//! In-process transport.
//!
//! [`channel`] returns a connector and the authority end that accepts its
//! links. Each link is a pair of unbounded channels; dropping the
//! [`MemoryPeer`] closes the link from the authority side, and dropping the
//! [`MemoryAuthority`] makes every later handshake fail.

use crate::transport::{Connector, Link};
use crate::TransportError;
use futures_util::{sink, stream};
use gavel_core::Record;
use std::future::{self, Future};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Create a connected connector/authority pair.
pub fn channel() -> (MemoryConnector, MemoryAuthority) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = MemoryConnector {
        peers: tx,
        attempts: Arc::new(AtomicUsize::new(0)),
    };
    (connector, MemoryAuthority { peers: rx })
}

/// Client side: hands a new peer to the authority on every handshake.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Handshakes attempted so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<Link, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let (to_client, from_authority) = mpsc::unbounded_channel::<String>();
        let (to_authority, from_client) = mpsc::unbounded_channel::<String>();
        self.peers
            .send(MemoryPeer {
                outbound: to_client,
                inbound: from_client,
            })
            .map_err(|_| TransportError::Refused("memory authority is gone".to_string()))?;

        let sink = sink::unfold(to_authority, |tx, text: String| async move {
            tx.send(text).map_err(|_| TransportError::Closed)?;
            Ok::<_, TransportError>(tx)
        });
        let stream = stream::unfold(from_authority, |mut rx| async move {
            rx.recv().await.map(|text| (Ok(text), rx))
        });

        Ok(Link::new(Box::pin(sink), Box::pin(stream)))
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> impl Future<Output = Result<Link, TransportError>> + Send {
        future::ready(self.open())
    }
}

/// Authority side: receives one [`MemoryPeer`] per client handshake.
#[derive(Debug)]
pub struct MemoryAuthority {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryAuthority {
    /// Wait for the next handshake.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

/// The authority's end of one link.
#[derive(Debug)]
pub struct MemoryPeer {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Push raw text to the client.
    pub fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.outbound
            .send(text.into())
            .map_err(|_| TransportError::Closed)
    }

    /// Push an authority record to the client.
    pub fn send_record(&self, record: &Record) -> Result<(), TransportError> {
        let text = record
            .to_json()
            .map_err(|e| TransportError::Refused(e.to_string()))?;
        self.send(text)
    }

    /// Next record sent by the client, or `None` once the client side closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.inbound.try_recv().ok()
    }
}
