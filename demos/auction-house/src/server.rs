//! WebSocket front of the auction house.

use crate::house::House;
use futures_util::{SinkExt, StreamExt};
use gavel_core::{Intent, Record};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast};
use tokio_tungstenite::tungstenite::Message;

type SharedHouse = Arc<RwLock<House>>;

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let house = Arc::new(RwLock::new(House::new()));
    let (broadcast_tx, _) = broadcast::channel::<String>(100);

    tokio::spawn(run_clock(house.clone(), broadcast_tx.clone()));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}/ws", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let house = house.clone();
        let broadcast_tx = broadcast_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, house, broadcast_tx).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn run_clock(house: SharedHouse, broadcast_tx: broadcast::Sender<String>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        let Some(record) = house.write().await.tick() else {
            continue;
        };
        publish(&broadcast_tx, &record);
    }
}

fn publish(broadcast_tx: &broadcast::Sender<String>, record: &Record) {
    match record.to_json() {
        Ok(text) => {
            let _ = broadcast_tx.send(text);
        }
        Err(e) => tracing::error!("Failed to encode record: {}", e),
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    house: SharedHouse,
    broadcast_tx: broadcast::Sender<String>,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    let mut broadcast_rx = broadcast_tx.subscribe();

    tracing::debug!("New connection from {}", addr);

    let snapshot = house.read().await.snapshot();
    if let Some(record) = snapshot {
        sink.send(Message::Text(record.to_json()?.into())).await?;
    }

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                let Message::Text(text) = msg else { continue };
                let intent = match Intent::from_json(text.as_str()) {
                    Ok(intent) => intent,
                    Err(e) => {
                        tracing::warn!("Invalid message from {}: {}", addr, e);
                        continue;
                    }
                };

                let outcome = {
                    let mut house = house.write().await;
                    match intent {
                        Intent::Bid { bidder, amount } => house.bid(bidder.name(), amount),
                        Intent::StartListing { item_name, starting_amount } => {
                            Ok(house.start(item_name, starting_amount))
                        }
                    }
                };
                match outcome {
                    Ok(record) => publish(&broadcast_tx, &record),
                    Err(reason) => {
                        tracing::debug!("Rejected intent from {}: {}", addr, reason);
                        sink.send(Message::Text(Record::error(reason).to_json()?.into())).await?;
                    }
                }
            }

            msg = broadcast_rx.recv() => {
                match msg {
                    Ok(text) => sink.send(Message::Text(text.into())).await?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!("{} fell behind by {} records", addr, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("Connection closed: {}", addr);
    Ok(())
}
