//! Terminal bidder.
//!
//! Connects to an auction authority, keeps a live dashboard on screen and
//! turns typed commands into bids and listings. The link is re-established
//! automatically whenever it drops.
//!
//! Run against the demo authority:
//!   cargo run -p gavel-demo-auction-house
//!   cargo run -p gavel-cli -- --name Guest-42

mod command;
mod dashboard;
mod settings;

use clap::Parser;
use command::{Command, HELP};
use dashboard::Dashboard;
use gavel_client::{AuctionClient, WebSocketConnector};
use settings::{Args, Settings};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gavel=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(Args::parse())?;
    tracing::info!(url = %settings.client.url, bidder = %settings.bidder, "starting");

    let client = AuctionClient::spawn(
        WebSocketConnector::new(settings.client.url.as_str()),
        settings.client.reconnect.clone(),
    );
    client.start().await?;

    run(&client, &settings).await?;
    client.shutdown();
    Ok(())
}

async fn run(client: &AuctionClient, settings: &Settings) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut view = client.watch_view();
    let mut events = client.subscribe();
    let mut dashboard = Dashboard::new(settings.bidder.clone(), settings.increment);

    draw(&dashboard, client)?;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => execute(command, client, settings, &mut dashboard),
                    Err(e) => dashboard.say(e.to_string()),
                }
                draw(&dashboard, client)?;
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                draw(&dashboard, client)?;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if dashboard.note(&event) {
                        draw(&dashboard, client)?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "dashboard fell behind on events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn execute(
    command: Command,
    client: &AuctionClient,
    settings: &Settings,
    dashboard: &mut Dashboard,
) {
    let result = match command {
        Command::Raise => client.raise_bid(settings.increment, &settings.bidder),
        Command::Bid(amount) => client.submit_bid(amount, &settings.bidder),
        Command::Start {
            starting_amount,
            item_name,
        } => client.submit_listing(&item_name, starting_amount),
        Command::Help => {
            dashboard.say(HELP);
            return;
        }
        Command::Quit => return,
    };
    match result {
        Ok(intent) => tracing::debug!(?intent, "intent sent"),
        Err(e) => dashboard.say(e.to_string()),
    }
}

fn draw(dashboard: &Dashboard, client: &AuctionClient) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(dashboard.render(&client.view(), client.status()).as_bytes())?;
    out.flush()
}
