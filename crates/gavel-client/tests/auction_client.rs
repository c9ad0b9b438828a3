//! End-to-end behaviour of `AuctionClient` against a scripted in-memory authority.

use gavel_client::memory::{self, MemoryAuthority, MemoryPeer};
use gavel_client::{AuctionClient, ClientError, ReconnectPolicy};
use gavel_core::{
    AuctionEvent, AuctionView, Bidder, ConnectionStatus, Intent, IntentError, Phase, Record,
    Severity,
};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

const DELAY: Duration = Duration::from_secs(3);

async fn started() -> (AuctionClient, MemoryAuthority, MemoryPeer) {
    let (connector, mut authority) = memory::channel();
    let client = AuctionClient::spawn(connector, ReconnectPolicy::fixed(DELAY));
    client.start().await.unwrap();
    let peer = authority.accept().await.unwrap();
    wait_for_status(&client, ConnectionStatus::Connected).await;
    (client, authority, peer)
}

async fn wait_for_status(client: &AuctionClient, status: ConnectionStatus) {
    let mut session = client.connection().watch();
    session.wait_for(|s| s.status == status).await.unwrap();
}

async fn wait_for_view(
    view: &mut watch::Receiver<AuctionView>,
    done: impl FnMut(&AuctionView) -> bool,
) -> AuctionView {
    view.wait_for(done).await.unwrap().clone()
}

async fn next_auction_event(events: &mut broadcast::Receiver<AuctionEvent>) -> AuctionEvent {
    loop {
        match events.recv().await.unwrap() {
            AuctionEvent::Connectivity { .. } => continue,
            event => return event,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn bidding_round_trip() {
    let (client, _authority, mut peer) = started().await;
    let mut view = client.watch_view();
    let mut events = client.subscribe();
    let me = Bidder::guest(42);

    // Nothing is running yet.
    assert!(matches!(
        client.raise_bid(100, &me),
        Err(ClientError::Intent(IntentError::NotLive {
            phase: Phase::AwaitingListing
        }))
    ));

    client.submit_listing("Mustang", 5000).unwrap();
    let sent = Intent::from_json(&peer.recv().await.unwrap()).unwrap();
    assert_eq!(
        sent,
        Intent::StartListing {
            item_name: "Mustang".into(),
            starting_amount: 5000
        }
    );

    peer.send_record(&Record::update("Mustang", 5000, "House", 60)).unwrap();
    let live = wait_for_view(&mut view, |v| v.phase == Phase::Live).await;
    assert_eq!(live.item_name, "Mustang");
    assert_eq!(
        next_auction_event(&mut events).await,
        AuctionEvent::ListingChanged {
            item_name: "Mustang".into()
        }
    );

    let intent = client.raise_bid(100, &me).unwrap();
    assert_eq!(
        intent,
        Intent::Bid {
            bidder: me.clone(),
            amount: 5100
        }
    );
    assert_eq!(Intent::from_json(&peer.recv().await.unwrap()).unwrap(), intent);
    // No optimistic update.
    assert_eq!(client.view().current_amount, 5000);

    peer.send_record(&Record::update("Mustang", 5100, "Guest-42", 55)).unwrap();
    let leading = wait_for_view(&mut view, |v| v.current_amount == 5100).await;
    assert!(leading.is_leading(&me));

    peer.send_record(&Record::end("Mustang", 5600, "Guest-7")).unwrap();
    let sold = wait_for_view(&mut view, |v| v.phase == Phase::Sold).await;
    assert_eq!(sold.time_remaining, 0);
    assert_eq!(sold.high_bidder, "Guest-7");
    assert_eq!(sold.item_name, "Mustang");

    // Bidding after the sale never reaches the wire.
    assert!(client.submit_bid(6000, &me).is_err());
    tokio::task::yield_now().await;
    assert!(peer.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn authority_errors_become_notices() {
    let (client, _authority, peer) = started().await;
    let mut events = client.subscribe();

    peer.send_record(&Record::error("Bid must exceed $5100")).unwrap();
    assert_eq!(
        next_auction_event(&mut events).await,
        AuctionEvent::Notice {
            text: "Bid must exceed $5100".into(),
            severity: Severity::Error
        }
    );
    assert_eq!(client.view(), AuctionView::default());
}

#[tokio::test(start_paused = true)]
async fn malformed_records_are_skipped() {
    let (client, _authority, peer) = started().await;
    let mut view = client.watch_view();

    peer.send("{not json").unwrap();
    peer.send(r#"{"type":"gossip"}"#).unwrap();
    let bad_amount = r#"{"type":"update","item_name":"Camaro","amount":"n/a","username":"House","time_left":30}"#;
    peer.send(bad_amount).unwrap();

    let next = wait_for_view(&mut view, |v| v.item_name == "Camaro").await;
    assert_eq!(next.current_amount, 0);
    assert_eq!(next.time_remaining, 30);
    assert_eq!(next.phase, Phase::Live);
}

#[tokio::test(start_paused = true)]
async fn view_survives_reconnect() {
    let (client, mut authority, peer) = started().await;
    let mut view = client.watch_view();
    let me = Bidder::guest(1);

    peer.send_record(&Record::update("Mustang", 5000, "House", 60)).unwrap();
    wait_for_view(&mut view, |v| v.phase == Phase::Live).await;

    drop(peer);
    wait_for_status(&client, ConnectionStatus::Disconnected).await;
    assert_eq!(client.view().item_name, "Mustang");

    // Live view, dead link: accepted locally, dropped by the session.
    assert!(client.raise_bid(100, &me).is_ok());

    let mut peer = authority.accept().await.unwrap();
    wait_for_status(&client, ConnectionStatus::Connected).await;
    assert!(peer.try_recv().is_none());

    peer.send_record(&Record::update("Mustang", 5400, "Guest-9", 41)).unwrap();
    let resumed = wait_for_view(&mut view, |v| v.current_amount == 5400).await;
    assert_eq!(resumed.high_bidder, "Guest-9");
    assert_eq!(resumed.time_remaining, 41);
}
