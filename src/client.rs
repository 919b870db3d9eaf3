//! Client protocol state machine.
//!
//! A run opens one connection, sends every batch and waits for its
//! acknowledgement before reading the next one, then sends the finished
//! notification and reads the agency's winners on the same connection.

use crate::batch_reader::{serialize_batch, BatchReader};
use crate::bet::Bet;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{Ack, Framer};
use crate::shutdown::{Session, ShutdownHandle};
use log::{error, info};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;

/// Where a client is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
    SendingBatch,
    AwaitingAck,
    SendingFinished,
    AwaitingWinners,
    /// The run finished, successfully or not, and resources were released.
    Closed,
    /// A termination request released the resources.
    ShuttingDown,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches_sent: usize,
    pub bets_sent: usize,
    pub lines_read: usize,
    pub lines_skipped: usize,
    /// Documents of this agency's winning bets, in server order
    pub winners: Vec<String>,
}

/// Sends an agency's bets to the lottery server.
pub struct Client<R = BufReader<File>> {
    config: ClientConfig,
    framer: Framer,
    session: Arc<Session<R>>,
}

impl Client<BufReader<File>> {
    /// Opens the configured bets source and builds a disconnected client.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let reader = BatchReader::open(&config.source_path(), &config.id, config.protocol.clone())?;
        Ok(Self::new(config, reader))
    }
}

impl<R: BufRead> Client<R> {
    pub fn new(config: ClientConfig, reader: BatchReader<R>) -> Self {
        let session = Arc::new(Session::new(&config.id, reader));
        Client {
            framer: Framer::new(config.protocol.clone()),
            config,
            session,
        }
    }

    /// Handle that can stop this client from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle<R> {
        ShutdownHandle::new(Arc::clone(&self.session))
    }

    pub fn state(&self) -> ClientState {
        self.session.state()
    }

    /// Runs the whole exchange: connect, send every batch, finish, read winners.
    ///
    /// The connection and the reader are released before returning. A
    /// termination request during the run yields [`ClientError::Cancelled`].
    pub fn run(&mut self) -> Result<RunSummary> {
        let result = self.connect().and_then(|stream| self.exchange(&stream));
        self.session.close(ClientState::Closed);

        match &result {
            Ok(summary) => info!(
                "action: client_run | result: success | client_id: {} | batches: {} | bets: {} | skipped_lines: {} | winners: {}",
                self.config.id,
                summary.batches_sent,
                summary.bets_sent,
                summary.lines_skipped,
                summary.winners.len()
            ),
            Err(ClientError::Cancelled) => info!(
                "action: client_run | result: cancelled | client_id: {}",
                self.config.id
            ),
            Err(e) => error!(
                "action: client_run | result: fail | client_id: {} | error: {}",
                self.config.id, e
            ),
        }
        result
    }

    fn connect(&self) -> Result<TcpStream> {
        self.ensure_running()?;

        let address = &self.config.server_address;
        let connect_error = |source| ClientError::Connect {
            address: address.clone(),
            source,
        };
        let stream = TcpStream::connect(address.as_str()).map_err(connect_error)?;
        let closer = stream.try_clone().map_err(connect_error)?;
        self.session.attach(closer)?;

        self.session.transition(ClientState::Connected);
        info!(
            "action: connect | result: success | client_id: {} | server: {}",
            self.config.id, address
        );
        Ok(stream)
    }

    fn exchange(&self, stream: &TcpStream) -> Result<RunSummary> {
        let mut reader = BufReader::new(stream);
        let mut writer = stream;
        let mut summary = RunSummary::default();

        loop {
            self.ensure_running()?;
            let batch = self.session.with_reader(|r| r.next_batch())?;
            if batch.is_empty() {
                break;
            }

            summary.batches_sent += 1;
            self.send_batch(&mut reader, &mut writer, summary.batches_sent, &batch)?;
            summary.bets_sent += batch.len();
        }

        self.ensure_running()?;
        summary.winners = self.finish(&mut reader, &mut writer)?;

        let stats = self.session.reader_stats();
        summary.lines_read = stats.line_number;
        summary.lines_skipped = stats.lines_skipped;
        Ok(summary)
    }

    /// Sends one batch and waits for its acknowledgement.
    fn send_batch(
        &self,
        reader: &mut impl BufRead,
        writer: &mut impl Write,
        number: usize,
        batch: &[Bet],
    ) -> Result<()> {
        self.session.transition(ClientState::SendingBatch);
        let payload = serialize_batch(batch, self.framer.config());
        self.framer
            .send(writer, &self.framer.frame(&payload))
            .map_err(|e| self.io_failure(e, |source| ClientError::Write { source }))?;

        self.session.transition(ClientState::AwaitingAck);
        let line = self
            .framer
            .read_line(reader)
            .map_err(|e| self.io_failure(e, |source| ClientError::Read { source }))?;

        match self.framer.parse_ack(&line) {
            Ack::Accepted => {
                info!(
                    "action: batch_sent | result: success | client_id: {} | batch: {} | bets: {}",
                    self.config.id,
                    number,
                    batch.len()
                );
                Ok(())
            }
            Ack::Rejected(response) => {
                error!(
                    "action: batch_sent | result: fail | client_id: {} | batch: {} | bets: {} | server_response: {}",
                    self.config.id,
                    number,
                    batch.len(),
                    response
                );
                Err(ClientError::RejectedBatch {
                    batch: number,
                    records: batch.len(),
                    response,
                })
            }
        }
    }

    /// Sends the finished notification and reads the winners response.
    fn finish(&self, reader: &mut impl BufRead, writer: &mut impl Write) -> Result<Vec<String>> {
        self.session.transition(ClientState::SendingFinished);
        self.framer
            .send(writer, &self.framer.finished_message())
            .map_err(|e| self.io_failure(e, |source| ClientError::Write { source }))?;

        self.session.transition(ClientState::AwaitingWinners);
        let (header, body) = self
            .framer
            .read_two_lines(reader)
            .map_err(|e| self.io_failure(e, |source| ClientError::Read { source }))?;

        let winners = self.framer.parse_winners(&header, &body)?;
        info!(
            "action: consulta_ganadores | result: success | client_id: {} | cant_ganadores: {}",
            self.config.id,
            winners.len()
        );
        Ok(winners)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.session.is_closed() {
            Err(ClientError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// I/O failures after a shutdown request are the shutdown itself.
    fn io_failure(&self, err: io::Error, wrap: fn(io::Error) -> ClientError) -> ClientError {
        if self.session.is_closed() {
            ClientError::Cancelled
        } else {
            wrap(err)
        }
    }
}
