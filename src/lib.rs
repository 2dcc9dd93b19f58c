//! Lottery server: agencies send batches of bets over TCP, report when
//! they are done, and ask for their winners once every agency reported.
//!
//! - [`protocol`] holds the binary wire format.
//! - [`lottery`] holds the bets, the finished agencies and the draw,
//!   owned by a single [`lottery::coordinator::Coordinator`] task.
//! - [`connection`] serves one agency connection.
//! - [`server`] accepts connections and handles shutdown.

pub mod config;
pub mod connection;
pub mod lottery;
pub mod protocol;
pub mod server;
