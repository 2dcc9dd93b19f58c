use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;

use crate::lottery::DEFAULT_WINNING_NUMBER;

/// Lottery server that collects bets from agencies and draws the winners
/// once every agency has finished sending them.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Port to listen on for agency connections.
    #[arg(long, env = "SERVER_PORT", default_value_t = 12345)]
    pub port: u16,

    /// Maximum number of pending connections.
    #[arg(long, env = "SERVER_LISTEN_BACKLOG", default_value_t = 5)]
    pub listen_backlog: u32,

    /// Number of agencies that must finish before the draw.
    #[arg(
        long,
        env = "NUM_AGENCIES",
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub agencies: u32,

    /// Number a bet has to match to win.
    #[arg(long, env = "WINNING_NUMBER", default_value_t = DEFAULT_WINNING_NUMBER)]
    pub winning_number: u32,

    /// File to keep the bets in. Bets are kept in memory when missing.
    #[arg(long, env = "BETS_FILE")]
    pub bets_file: Option<PathBuf>,

    /// Seconds open connections get to finish once a shutdown starts.
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace: u64,

    /// Default log filter, `RUST_LOG` takes precedence when set.
    #[arg(long, env = "LOGGING_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        (Ipv4Addr::UNSPECIFIED, self.port).into()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}
