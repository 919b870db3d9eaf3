//! Cooperative shutdown.
//!
//! The connection and the batch reader are reachable from two flows: the
//! client run and the termination handler. Both close them through the same
//! [`Session`], whose [`CloseLatch`] lets exactly one caller do the work.

use crate::batch_reader::{BatchReader, ReaderStats};
use crate::client::ClientState;
use crate::error::{ClientError, Result};
use log::{debug, info, warn};
use std::io::{self, BufRead};
use std::net::{Shutdown, TcpStream};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One-shot latch guarding a close operation.
#[derive(Debug, Default)]
pub struct CloseLatch {
    closed: AtomicBool,
}

impl CloseLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the first caller only.
    pub fn close_once(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resources of one client run shared with the termination handler.
pub(crate) struct Session<R> {
    client_id: String,
    latch: CloseLatch,
    /// Clone of the live connection, kept only to shut it down.
    connection: Mutex<Option<TcpStream>>,
    reader: Mutex<BatchReader<R>>,
    state: Mutex<ClientState>,
}

impl<R: BufRead> Session<R> {
    pub(crate) fn new(client_id: &str, reader: BatchReader<R>) -> Self {
        Session {
            client_id: client_id.to_string(),
            latch: CloseLatch::new(),
            connection: Mutex::new(None),
            reader: Mutex::new(reader),
            state: Mutex::new(ClientState::Disconnected),
        }
    }

    pub(crate) fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.latch.is_closed()
    }

    pub(crate) fn state(&self) -> ClientState {
        *lock(&self.state)
    }

    /// Moves to `next` unless the session has already been closed.
    pub(crate) fn transition(&self, next: ClientState) {
        let mut state = lock(&self.state);
        if self.latch.is_closed() {
            return;
        }
        debug!(
            "action: transition | client_id: {} | from: {:?} | to: {:?}",
            self.client_id, *state, next
        );
        *state = next;
    }

    /// Registers the connection so the shutdown path can close it.
    ///
    /// Fails with `Cancelled` if the session was closed before the connection
    /// was attached; the connection is shut down in that case.
    pub(crate) fn attach(&self, connection: TcpStream) -> Result<()> {
        let mut slot = lock(&self.connection);
        if self.latch.is_closed() {
            shutdown_stream(&self.client_id, &connection);
            return Err(ClientError::Cancelled);
        }
        *slot = Some(connection);
        Ok(())
    }

    pub(crate) fn with_reader<T>(&self, f: impl FnOnce(&mut BatchReader<R>) -> T) -> T {
        f(&mut lock(&self.reader))
    }

    pub(crate) fn reader_stats(&self) -> ReaderStats {
        lock(&self.reader).stats()
    }

    /// Closes the connection and the reader, once.
    ///
    /// Returns `false` if another caller already did.
    pub(crate) fn close(&self, final_state: ClientState) -> bool {
        if !self.latch.close_once() {
            return false;
        }
        *lock(&self.state) = final_state;

        if let Some(connection) = lock(&self.connection).take() {
            shutdown_stream(&self.client_id, &connection);
        }
        lock(&self.reader).close();
        true
    }
}

/// Shuts both directions down, unblocking any read or write in progress.
fn shutdown_stream(client_id: &str, connection: &TcpStream) {
    match connection.shutdown(Shutdown::Both) {
        Ok(()) => info!(
            "action: close_connection | result: success | client_id: {}",
            client_id
        ),
        // The peer may have closed first.
        Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
        Err(e) => warn!(
            "action: close_connection | result: fail | client_id: {} | error: {}",
            client_id, e
        ),
    }
}

/// Handle the termination handler uses to stop a running client.
pub struct ShutdownHandle<R> {
    session: Arc<Session<R>>,
}

impl<R> Clone for ShutdownHandle<R> {
    fn clone(&self) -> Self {
        ShutdownHandle {
            session: Arc::clone(&self.session),
        }
    }
}

impl<R: BufRead> ShutdownHandle<R> {
    pub(crate) fn new(session: Arc<Session<R>>) -> Self {
        ShutdownHandle { session }
    }

    /// Closes the connection and the batch reader.
    ///
    /// Safe to call concurrently with a blocked read or write in the client
    /// run, which then ends with [`ClientError::Cancelled`]. Returns `true` if
    /// this call released the resources.
    pub fn shutdown(&self) -> bool {
        let client_id = self.session.client_id();
        info!(
            "action: client_shutdown | result: in_progress | client_id: {}",
            client_id
        );
        let closed = self.session.close(ClientState::ShuttingDown);
        info!(
            "action: client_shutdown | result: {} | client_id: {}",
            shutdown_result(closed),
            client_id
        );
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub fn state(&self) -> ClientState {
        self.session.state()
    }

    pub fn client_id(&self) -> &str {
        self.session.client_id()
    }
}

/// Log label for a shutdown call.
fn shutdown_result(closed: bool) -> &'static str {
    if closed {
        "success"
    } else {
        "already_closed"
    }
}

/// Registers a handler for SIGINT, SIGTERM and SIGHUP.
///
/// The handler runs on its own thread. It shuts the client down and exits the
/// process with status 0; it never returns to the interrupted run.
pub fn install_termination_handler<R>(handle: ShutdownHandle<R>) -> Result<()>
where
    R: BufRead + Send + 'static,
{
    ctrlc::set_handler(move || {
        info!(
            "action: sigterm_received | result: success | client_id: {}",
            handle.client_id()
        );
        handle.shutdown();
        process::exit(0);
    })?;
    Ok(())
}
