//! Live auction authority.
//!
//! Runs one listing at a time: clients open listings with `start`, outbid
//! each other with `bid`, and every connected client sees the clock tick down.
//! Late bids push the clock back so nobody wins by sniping.
//!
//! Run the house, then point any number of bidders at it:
//!   cargo run -p gavel-demo-auction-house -- --port 8080
//!   cargo run -p gavel-cli -- --url ws://localhost:8080/ws

mod house;
mod server;

use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("auction_house=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = parse_arg(&args, "--port").unwrap_or(8080);
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();

    tracing::info!("Starting auction house on {}", addr);
    server::run(addr).await
}

fn parse_arg(args: &[String], flag: &str) -> Option<u16> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
