//! Client and protocol configuration.
//!
//! Configuration is read once at startup from an optional TOML file, then
//! environment overrides are applied and the result is validated. Nothing is
//! mutated after that point.

use crate::bet::reserved_token;
use crate::error::{ClientError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Message protocol tokens and batching limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Maximum number of bets per batch
    pub batch_size: usize,

    /// Joins the fields of one bet
    pub field_separator: String,

    /// Joins bets within a batch, and winner ids within the winners body
    pub batch_separator: String,

    /// Terminates every protocol line
    pub message_delimiter: String,

    /// Acknowledgement sent by the server for an accepted batch
    pub success_response: String,

    /// Notification sent once every batch has been acknowledged
    pub finished_message: String,

    /// Tag prefix of the winners header line
    pub winners_prefix: String,

    /// Winners body when the agency has no winners
    pub no_winners_body: String,

    /// Longest response line accepted from the server, delimiter excluded
    pub max_line_length: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            batch_size: 100,
            field_separator: ";".to_string(),
            batch_separator: "~".to_string(),
            message_delimiter: "\n".to_string(),
            success_response: "OK".to_string(),
            finished_message: "FINISHED".to_string(),
            winners_prefix: "W:".to_string(),
            no_winners_body: "N".to_string(),
            max_line_length: 1024 * 1024,
        }
    }
}

impl ProtocolConfig {
    /// Checks the invariants the framer and batch reader rely on.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClientError::Config(
                "protocol.batch_size must be greater than zero".to_string(),
            ));
        }

        if self.max_line_length == 0 {
            return Err(ClientError::Config(
                "protocol.max_line_length must be greater than zero".to_string(),
            ));
        }

        for (name, value) in [
            ("field_separator", &self.field_separator),
            ("batch_separator", &self.batch_separator),
            ("message_delimiter", &self.message_delimiter),
            ("success_response", &self.success_response),
            ("finished_message", &self.finished_message),
            ("winners_prefix", &self.winners_prefix),
        ] {
            if value.is_empty() {
                return Err(ClientError::Config(format!(
                    "protocol.{} must not be empty",
                    name
                )));
            }
        }

        if self.field_separator == self.batch_separator {
            return Err(ClientError::Config(
                "protocol.field_separator and protocol.batch_separator must differ".to_string(),
            ));
        }

        Ok(())
    }
}

/// Everything a client run needs besides the protocol tokens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client id, also the agency tag stamped on every bet
    pub id: String,

    /// Server address as `host:port`
    pub server_address: String,

    /// Bets source; defaults to `agency-{id}.csv`
    pub source_path: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,

    pub protocol: ProtocolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            id: "1".to_string(),
            server_address: "127.0.0.1:12345".to_string(),
            source_path: None,
            log_level: "info".to_string(),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads the configuration the binary runs with.
    ///
    /// An explicit path must exist; without one, `config.toml` is used only if
    /// present. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new("config.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CLI_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("CLI_ID") {
            self.id = id;
        }
        if let Some(address) = lookup("CLI_SERVER_ADDRESS") {
            self.server_address = address;
        }
        if let Some(path) = lookup("CLI_DATA_FILE") {
            self.source_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup("CLI_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(raw) = lookup("CLI_BATCH_MAXAMOUNT") {
            self.protocol.batch_size = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("CLI_BATCH_MAXAMOUNT '{}' is not a number", raw))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ClientError::Config("id must not be empty".to_string()));
        }
        if self.server_address.trim().is_empty() {
            return Err(ClientError::Config(
                "server_address must not be empty".to_string(),
            ));
        }
        self.protocol.validate()?;

        // The id is stamped on every bet as its agency.
        if let Some(token) = reserved_token(&self.id, &self.protocol) {
            return Err(ClientError::Config(format!(
                "id must not contain protocol token {:?}",
                token
            )));
        }
        Ok(())
    }

    /// Path of the bets source for this agency.
    pub fn source_path(&self) -> PathBuf {
        self.source_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("agency-{}.csv", self.id)))
    }
}
