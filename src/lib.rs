//! # Lottery Client
//!
//! A streaming client that sends an agency's bets to the central lottery
//! server in bounded batches and retrieves the agency's winners.
//!
//! ## Design Principles
//!
//! - **Streaming input**: bets are read line by line, never loaded whole
//! - **Resilient parsing**: malformed lines are logged and skipped
//! - **One exchange in flight**: each batch is acknowledged before the next is sent
//! - **Safe shutdown**: a termination request closes the connection and the
//!   source exactly once, even while a read or write is blocked
//!
//! ## Example
//!
//! ```no_run
//! use lottery_client::{Client, ClientConfig};
//!
//! let config = ClientConfig::load(None).unwrap();
//! let mut client = Client::from_config(config).unwrap();
//! let summary = client.run().unwrap();
//! println!("{} winners", summary.winners.len());
//! ```

pub mod batch_reader;
pub mod bet;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod shutdown;

pub use batch_reader::{BatchReader, ReaderStats};
pub use bet::Bet;
pub use client::{Client, ClientState, RunSummary};
pub use config::{ClientConfig, ProtocolConfig};
pub use error::{ClientError, LineError, Result};
pub use protocol::{Ack, Framer};
pub use shutdown::{install_termination_handler, CloseLatch, ShutdownHandle};
