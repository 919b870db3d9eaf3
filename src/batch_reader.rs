//! Streaming batch reader over a bets source.
//!
//! Lines are read one at a time and grouped into batches of at most
//! `batch_size` bets. Malformed lines are logged and skipped; only I/O faults
//! from the underlying source abort reading.

use crate::bet::Bet;
use crate::config::ProtocolConfig;
use crate::error::{ClientError, LineError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const BOM: &str = "\u{feff}";

/// Reading progress of a [`BatchReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Lines consumed so far, skipped ones included
    pub line_number: usize,

    /// Bets parsed and returned in batches
    pub total_read: usize,

    /// Lines that failed to parse
    pub lines_skipped: usize,
}

/// Reads bets from a line-oriented source in bounded batches.
pub struct BatchReader<R> {
    /// `None` once closed.
    source: Option<R>,
    agency: String,
    protocol: ProtocolConfig,
    stats: ReaderStats,
    line: Vec<u8>,
}

impl BatchReader<BufReader<File>> {
    /// Opens a bets file for the given agency.
    pub fn open(path: &Path, agency: &str, protocol: ProtocolConfig) -> Result<Self> {
        let file = File::open(path).map_err(|source| ClientError::SourceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "action: open_source | result: success | path: {}",
            path.display()
        );
        Ok(Self::from_reader(BufReader::new(file), agency, protocol))
    }
}

impl<R: BufRead> BatchReader<R> {
    /// Wraps an already-open source.
    pub fn from_reader(reader: R, agency: &str, protocol: ProtocolConfig) -> Self {
        BatchReader {
            source: Some(reader),
            agency: agency.to_string(),
            protocol,
            stats: ReaderStats::default(),
            line: Vec::new(),
        }
    }

    /// Reads the next batch.
    ///
    /// Returns at most `batch_size` bets. An empty batch means the source is
    /// exhausted (or the reader was closed).
    pub fn next_batch(&mut self) -> Result<Vec<Bet>> {
        let mut batch = Vec::with_capacity(self.protocol.batch_size);

        while batch.len() < self.protocol.batch_size {
            let Some(source) = self.source.as_mut() else {
                break;
            };

            self.line.clear();
            let read = source
                .read_until(b'\n', &mut self.line)
                .map_err(|source| ClientError::SourceRead {
                    line: self.stats.line_number + 1,
                    source,
                })?;
            if read == 0 {
                break;
            }

            self.stats.line_number += 1;
            match parse_line(&self.agency, &self.line, &self.protocol) {
                Ok(bet) => batch.push(bet),
                Err(e) => {
                    self.stats.lines_skipped += 1;
                    warn!(
                        "action: read_bet | result: skipped | line: {} | error: {}",
                        self.stats.line_number, e
                    );
                }
            }
        }

        self.stats.total_read += batch.len();
        Ok(batch)
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Releases the underlying source. Safe to call more than once.
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!(
                "action: close_source | result: success | lines: {}",
                self.stats.line_number
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Joins serialized bets with the batch separator, preserving order.
    pub fn serialize_batch(&self, bets: &[Bet]) -> String {
        serialize_batch(bets, &self.protocol)
    }
}

/// Serializes a batch into its wire payload (without the message delimiter).
pub fn serialize_batch(bets: &[Bet], protocol: &ProtocolConfig) -> String {
    bets.iter()
        .map(|bet| bet.serialize(&protocol.field_separator))
        .collect::<Vec<_>>()
        .join(&protocol.batch_separator)
}

/// Parses one raw source line (terminator included) into a bet.
fn parse_line(
    agency: &str,
    raw: &[u8],
    protocol: &ProtocolConfig,
) -> std::result::Result<Bet, LineError> {
    let raw = raw.strip_prefix(BOM.as_bytes()).unwrap_or(raw);
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(LineError::Empty);
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(raw);

    let mut record = StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Bet::from_source_record(agency, &record, protocol),
        Ok(false) => Err(LineError::Empty),
        Err(e) => Err(LineError::Csv(e.to_string())),
    }
}
