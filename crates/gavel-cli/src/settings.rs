//! Settings: TOML file, then environment and flags on top.

use anyhow::Context;
use clap::Parser;
use gavel_client::{ClientConfig, DEFAULT_URL, ReconnectPolicy};
use gavel_core::Bidder;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_INCREMENT: u64 = 100;

#[derive(Debug, Parser)]
#[command(name = "gavel", version, about = "Bid in a live auction from the terminal")]
pub struct Args {
    /// Authority endpoint.
    #[arg(short = 's', long, env = "GAVEL_URL")]
    pub url: Option<String>,

    /// Display name shown to other bidders.
    #[arg(short = 'u', long = "name", env = "GAVEL_NAME")]
    pub name: Option<String>,

    /// Amount added to the current price by a quick bid.
    #[arg(short, long)]
    pub increment: Option<u64>,

    /// TOML settings file.
    #[arg(short, long, env = "GAVEL_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Contents of the settings file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    url: Option<String>,
    name: Option<String>,
    increment: Option<u64>,
    reconnect: Option<ReconnectPolicy>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub client: ClientConfig,
    pub bidder: Bidder,
    pub increment: u64,
}

impl Settings {
    pub fn load(args: Args) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => read_file(path)?,
            None => FileSettings::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: Args, file: FileSettings) -> anyhow::Result<Self> {
        let bidder = match args.name.or(file.name) {
            Some(name) => name.parse().context("invalid bidder name")?,
            None => Bidder::guest(std::process::id() % 1000),
        };
        Ok(Self {
            client: ClientConfig {
                url: args.url.or(file.url).unwrap_or_else(|| DEFAULT_URL.to_string()),
                reconnect: file.reconnect.unwrap_or_default(),
            },
            bidder,
            increment: args.increment.or(file.increment).unwrap_or(DEFAULT_INCREMENT),
        })
    }
}

fn read_file(path: &Path) -> anyhow::Result<FileSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
