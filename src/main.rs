//! Lottery client CLI
//!
//! Sends the agency's bets to the lottery server and logs its winners.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- config.toml
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: overrides the configured log level
//! - `CLI_ID`, `CLI_SERVER_ADDRESS`, `CLI_DATA_FILE`, `CLI_LOG_LEVEL`,
//!   `CLI_BATCH_MAXAMOUNT`: override the matching configuration values

use env_logger::Env;
use lottery_client::{install_termination_handler, Client, ClientConfig, ClientError, Result};
use std::env;
use std::path::PathBuf;
use std::process;
use std::thread;

fn main() {
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = match ClientConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    match run(config) {
        Ok(()) => {}
        // The termination handler owns the exit once it has closed the session.
        Err(ClientError::Cancelled) => loop {
            thread::park();
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run(config: ClientConfig) -> Result<()> {
    log::debug!(
        "action: config | result: success | client_id: {} | server_address: {} | batch_size: {} | log_level: {}",
        config.id,
        config.server_address,
        config.protocol.batch_size,
        config.log_level
    );

    let mut client = Client::from_config(config)?;
    install_termination_handler(client.shutdown_handle())?;
    client.run()?;
    Ok(())
}
