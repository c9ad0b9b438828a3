//! Live auction client.

use crate::{
    ClientConfig, ClientError, ConnectionEvent, ConnectionHandle, ConnectionManager, Connector,
    ReconnectPolicy, SessionId, WebSocketConnector,
};
use gavel_core::{
    AuctionEvent, AuctionMachine, AuctionView, Bidder, ConnectionStatus, InboundMessage, Intent,
    listing_intent,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 64;

/// A connection manager with an auction state machine on top.
///
/// The machine lives in a driver task that is the only writer of the view;
/// everyone else reads snapshots through [`AuctionClient::view`] or
/// [`AuctionClient::watch_view`]. The view survives reconnects and is brought
/// up to date by the first record of the new session.
pub struct AuctionClient {
    connection: ConnectionHandle,
    view: watch::Receiver<AuctionView>,
    events: broadcast::Sender<AuctionEvent>,
    driver: JoinHandle<()>,
}

impl AuctionClient {
    /// Build a client over any transport. Call [`AuctionClient::start`] to
    /// open the first session.
    pub fn spawn<C: Connector>(connector: C, policy: ReconnectPolicy) -> Self {
        let (connection, inbound) = ConnectionManager::spawn(connector, policy);
        let (view_tx, view) = watch::channel(AuctionView::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let driver = tokio::spawn(drive(AuctionMachine::new(), inbound, view_tx, events.clone()));
        Self {
            connection,
            view,
            events,
            driver,
        }
    }

    /// Connect to the WebSocket authority described by `config`.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Self::spawn(
            WebSocketConnector::new(config.url.as_str()),
            config.reconnect.clone(),
        );
        let session = client.start().await?;
        tracing::info!(url = %config.url, %session, "auction client started");
        Ok(client)
    }

    /// Open a session if none is connecting or connected.
    pub async fn start(&self) -> Result<SessionId, ClientError> {
        self.connection.connect().await
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> AuctionView {
        self.view.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<AuctionView> {
        self.view.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Bid `amount` on the running listing.
    ///
    /// Refused locally unless the view is live. Otherwise the intent is
    /// handed to the session, which drops it if the link is down; the view
    /// only moves when the authority reports the new state.
    pub fn submit_bid(&self, amount: u64, bidder: &Bidder) -> Result<Intent, ClientError> {
        let intent = self.view.borrow().bid_intent(amount, bidder)?;
        self.emit(&intent)?;
        Ok(intent)
    }

    /// Bid the current price plus `increment`.
    pub fn raise_bid(&self, increment: u64, bidder: &Bidder) -> Result<Intent, ClientError> {
        let amount = self.view.borrow().next_bid(increment);
        self.submit_bid(amount, bidder)
    }

    /// Open a new listing, replacing whatever is running.
    pub fn submit_listing(
        &self,
        item_name: &str,
        starting_amount: u64,
    ) -> Result<Intent, ClientError> {
        let intent = listing_intent(item_name, starting_amount)?;
        self.emit(&intent)?;
        Ok(intent)
    }

    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    fn emit(&self, intent: &Intent) -> Result<(), ClientError> {
        let text = intent.to_json()?;
        tracing::debug!(kind = %intent.kind(), "sending intent");
        self.connection.send(text);
        Ok(())
    }
}

impl Drop for AuctionClient {
    fn drop(&mut self) {
        self.connection.shutdown();
        self.driver.abort();
    }
}

async fn drive(
    mut machine: AuctionMachine,
    mut inbound: mpsc::UnboundedReceiver<ConnectionEvent>,
    view: watch::Sender<AuctionView>,
    events: broadcast::Sender<AuctionEvent>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            ConnectionEvent::Status(status) => {
                let _ = events.send(AuctionEvent::Connectivity { status });
            }
            ConnectionEvent::Message(text) => {
                let msg = match InboundMessage::decode(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed record");
                        continue;
                    }
                };
                let changes = machine.apply(&msg);
                view.send_if_modified(|current| {
                    if *current == *machine.view() {
                        return false;
                    }
                    *current = machine.view().clone();
                    true
                });
                for change in changes {
                    let _ = events.send(change);
                }
            }
        }
    }
}
