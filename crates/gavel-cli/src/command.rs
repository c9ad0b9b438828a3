//! Prompt commands.

use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Current price plus the configured increment.
    Raise,
    Bid(u64),
    Start { starting_amount: u64, item_name: String },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("usage: start <amount> <item name>")]
    StartUsage,
    #[error("unknown command {0:?} (try `help`)")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() || line == "+" {
            return Ok(Command::Raise);
        }
        if let Ok(amount) = line.parse::<u64>() {
            return Ok(Command::Bid(amount));
        }

        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match word {
            "quit" | "exit" => Ok(Command::Quit),
            "help" | "?" => Ok(Command::Help),
            "start" => {
                let (amount, item) = rest
                    .trim()
                    .split_once(char::is_whitespace)
                    .ok_or(ParseCommandError::StartUsage)?;
                let starting_amount = amount.parse().map_err(|_| ParseCommandError::StartUsage)?;
                Ok(Command::Start {
                    starting_amount,
                    item_name: item.trim().to_string(),
                })
            }
            _ => Err(ParseCommandError::Unknown(line.to_string())),
        }
    }
}

pub const HELP: &str = "\
  <enter> or +            bid current price + increment
  <amount>                bid that amount
  start <amount> <item>   open a new listing
  quit                    leave";
