//! Background writer: a single worker thread applies queued payloads in order

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;
use rotalog_core::{Error, Result};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::rotation::RotationEngine;

/// Queue entries. A flush is a sentinel that the worker acknowledges once
/// everything queued ahead of it has been applied.
enum Command {
    Write(Vec<u8>),
    Flush(Sender<()>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Running,
    Draining,
    Closed,
}

/// Bounded queue in front of a [`RotationEngine`], drained by one thread
pub struct BufferedWriter {
    tx: Sender<Command>,
    state: Mutex<WriterState>,
    worker: Mutex<Option<JoinHandle<()>>>,
    flush_timeout: Duration,
}

impl BufferedWriter {
    /// Start the worker thread with a queue of `depth` payloads
    pub fn spawn(
        engine: Arc<Mutex<RotationEngine>>,
        depth: usize,
        flush_timeout: Duration,
    ) -> Result<Self> {
        let (tx, rx) = bounded(depth);

        let worker = std::thread::Builder::new()
            .name("rotalog-writer".to_string())
            .spawn(move || run_worker(engine, rx))?;

        Ok(Self {
            tx,
            state: Mutex::new(WriterState::Running),
            worker: Mutex::new(Some(worker)),
            flush_timeout,
        })
    }

    /// Queue a payload, blocking while the queue is full
    pub fn write(&self, payload: Vec<u8>) -> Result<usize> {
        if self.state() != WriterState::Running {
            return Err(Error::Closed);
        }

        let len = payload.len();
        self.tx
            .send(Command::Write(payload))
            .map_err(|_| Error::Closed)?;
        Ok(len)
    }

    /// Wait until every payload queued before this call has been applied.
    ///
    /// Waits at most the flush timeout, queueing included. Returns `Ok(false)`
    /// when the wait timed out: the earlier payloads are still applied later,
    /// but nothing is guaranteed at return time.
    pub fn flush(&self) -> Result<bool> {
        if self.state() != WriterState::Running {
            return Err(Error::Closed);
        }

        let deadline = Instant::now() + self.flush_timeout;
        let (ack_tx, ack_rx) = bounded(1);

        match self.tx.send_timeout(Command::Flush(ack_tx), self.flush_timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                warn!("Flush timed out waiting for queue space");
                return Ok(false);
            }
            Err(SendTimeoutError::Disconnected(_)) => return Err(Error::Closed),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match ack_rx.recv_timeout(remaining) {
            Ok(()) => Ok(true),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Flush did not complete within {}ms",
                    self.flush_timeout.as_millis()
                );
                Ok(false)
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Closed),
        }
    }

    /// Stop accepting work, apply everything queued, and join the worker
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != WriterState::Running {
                return Ok(());
            }
            *state = WriterState::Draining;
        }

        if self.tx.send(Command::Shutdown).is_err() {
            debug!("Writer thread already gone");
        }

        let joined = match self.worker.lock().take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        };

        *self.state.lock() = WriterState::Closed;

        joined.map_err(|_| {
            Error::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "log writer thread panicked",
            ))
        })
    }

    pub fn state(&self) -> WriterState {
        *self.state.lock()
    }
}

fn apply(engine: &Mutex<RotationEngine>, payload: &[u8]) {
    if let Err(e) = engine.lock().write(payload) {
        warn!("Error applying queued log payload: {}", e);
    }
}

fn run_worker(engine: Arc<Mutex<RotationEngine>>, rx: Receiver<Command>) {
    for command in rx.iter() {
        match command {
            Command::Write(payload) => apply(&engine, &payload),
            Command::Flush(ack) => {
                // The flusher may have given up already
                let _ = ack.send(());
            }
            Command::Shutdown => break,
        }
    }

    // Payloads accepted while shutdown was being requested
    for command in rx.try_iter() {
        if let Command::Write(payload) = command {
            apply(&engine, &payload);
        }
    }

    debug!("Log writer thread exiting");
}
