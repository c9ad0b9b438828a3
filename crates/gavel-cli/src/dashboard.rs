//! Terminal rendering of the auction view.

use gavel_core::{AuctionEvent, AuctionView, Bidder, ConnectionStatus, Phase, Severity};
use std::fmt::Write;

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const CLEAR: &str = "\x1b[H\x1b[2J";

/// Seconds under which the clock is drawn in red.
const URGENT_SECS: u64 = 10;

pub struct Dashboard {
    bidder: Bidder,
    increment: u64,
    status_line: String,
}

impl Dashboard {
    pub fn new(bidder: Bidder, increment: u64) -> Self {
        Self {
            bidder,
            increment,
            status_line: String::new(),
        }
    }

    /// Update the status line from an event. Returns whether it changed.
    pub fn note(&mut self, event: &AuctionEvent) -> bool {
        let line = match event {
            AuctionEvent::Notice { text, severity } => match severity {
                Severity::Error => format!("{RED}{text}{RESET}"),
                Severity::Info => format!("{YELLOW}{text}{RESET}"),
            },
            AuctionEvent::ListingChanged { item_name } => format!("Now selling: {item_name}"),
            AuctionEvent::Sold {
                amount, bidder, ..
            } if bidder == self.bidder.name() => format!("{GREEN}You won at ${amount}!{RESET}"),
            AuctionEvent::Connectivity {
                status: ConnectionStatus::Disconnected,
            } => format!("{RED}Connection lost, retrying...{RESET}"),
            AuctionEvent::Connectivity {
                status: ConnectionStatus::Connected,
            } => "Connected".to_string(),
            _ => return false,
        };
        self.status_line = line;
        true
    }

    /// Show a local message, such as a refused intent.
    pub fn say(&mut self, text: impl Into<String>) {
        self.status_line = text.into();
    }

    pub fn render(&self, view: &AuctionView, status: ConnectionStatus) -> String {
        let mut out = String::new();
        let rule = "=".repeat(40);
        let _ = writeln!(out, "{CLEAR}{rule}");
        let _ = writeln!(out, "   LIVE AUCTION: {}", view.item_name);
        let _ = writeln!(out, "{rule}");

        let clock = if view.time_remaining < URGENT_SECS { RED } else { GREEN };
        let phase = match view.phase {
            Phase::Live => String::new(),
            other => format!(" ({other})"),
        };
        let _ = writeln!(out, "TIME REMAINING: {clock}{}s{RESET}{phase}", view.time_remaining);
        let _ = writeln!(out, "CURRENT PRICE:  {GREEN}${}{RESET}", view.current_amount);

        if view.is_leading(&self.bidder) {
            let _ = writeln!(out, "HIGH BIDDER:    {GREEN}YOU{RESET}");
        } else {
            let _ = writeln!(out, "HIGH BIDDER:    {CYAN}{}{RESET}", view.high_bidder);
        }

        let _ = writeln!(out, "LINK:           {status}");
        let _ = writeln!(out, "\n{}", "-".repeat(40));
        let _ = writeln!(out, "STATUS: {}", self.status_line);
        let _ = writeln!(out, "{}", "-".repeat(40));
        let _ = write!(
            out,
            "{} > bid ${} [enter], amount, start <amount> <item>, help: ",
            self.bidder,
            view.next_bid(self.increment)
        );
        out
    }
}
