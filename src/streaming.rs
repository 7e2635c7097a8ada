//! Background receive loop for handler-mode streaming.
//!
//! One worker thread owns the socket while the handler runs. It decodes every
//! datagram, applies the current calibration offset and publishes the result
//! as the latest measurement. Readers take a copy of the whole snapshot under
//! an `RwLock`, so a six-axis value is never observed half written.
//!
//! Malformed datagrams are logged and skipped. A transport error ends the
//! loop, drops the session back to idle and leaves the reason in the fault
//! slot for the owning sensor to report.

use crate::calibration::Calibration;
use crate::measurement::Measurement;
use crate::session::Session;
use log::{debug, error, info, warn};
use rdt_protocol::{decode_response, Transport};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receive buffer size; anything longer than a response record is malformed anyway
pub const RECEIVE_BUFFER_LEN: usize = 1024;

/// Counters describing one handler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub published: u64,
    pub skipped: u64,
}

/// Latest-measurement cell written by the handler and read by everyone else
#[derive(Debug, Default)]
pub struct Published {
    running: AtomicBool,
    owned: AtomicBool,
    latest: RwLock<Option<Measurement>>,
    fault: Mutex<Option<String>>,
    published: AtomicU64,
    skipped: AtomicU64,
}

impl Published {
    /// True while a handler is consuming the stream
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True from spawn until the handler's socket is handed back to manual use
    ///
    /// Outlives `is_running`: a halted loop may still be blocked in a receive,
    /// and the sensor keeps the socket through STOP and the drain that follows.
    pub fn owns_socket(&self) -> bool {
        self.owned.load(Ordering::Acquire)
    }

    pub(crate) fn release_socket(&self) {
        self.owned.store(false, Ordering::Release);
    }

    pub fn latest(&self) -> Option<Measurement> {
        *self.latest.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fault(&self) -> Option<String> {
        self.fault.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            published: self.published.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn publish(&self, measurement: Measurement) {
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(measurement);
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    fn skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fault(&self, reason: String) {
        *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
    }

    /// Forget everything from a previous run
    pub(crate) fn reset(&self) {
        self.running.store(false, Ordering::Release);
        self.owned.store(false, Ordering::Release);
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = None;
        *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.published.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
    }
}

/// Handle to a running receive loop
pub(crate) struct StreamCoordinator {
    published: Arc<Published>,
    handle: Option<JoinHandle<()>>,
}

struct Worker<T: Transport> {
    transport: Arc<T>,
    calibration: Arc<Calibration>,
    session: Arc<Mutex<Session>>,
    published: Arc<Published>,
    poll_interval: Duration,
}

impl StreamCoordinator {
    pub fn spawn<T: Transport>(
        transport: Arc<T>,
        calibration: Arc<Calibration>,
        session: Arc<Mutex<Session>>,
        published: Arc<Published>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        published.owned.store(true, Ordering::Release);
        published.running.store(true, Ordering::Release);
        let worker = Worker {
            transport,
            calibration,
            session,
            published: published.clone(),
            poll_interval,
        };

        let handle = match thread::Builder::new()
            .name("netft-stream".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                published.running.store(false, Ordering::Release);
                published.release_socket();
                return Err(e);
            }
        };

        info!("🔄 Streaming handler started");
        Ok(Self {
            published,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.published.is_running()
    }

    /// Ask the loop to stop; it notices within one poll interval
    pub fn halt(&self) {
        self.published.running.store(false, Ordering::Release);
    }

    /// Stop the loop and wait for the worker to exit
    pub fn join(mut self) {
        self.halt();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("❌ Streaming handler thread panicked");
            }
        }
        debug!("Streaming handler joined");
    }
}

impl<T: Transport> Worker<T> {
    fn run(self) {
        while self.published.is_running() {
            let bytes = match self
                .transport
                .receive_timeout(RECEIVE_BUFFER_LEN, self.poll_interval)
            {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    error!("❌ Transport lost while streaming: {}", e);
                    self.published.record_fault(e.to_string());
                    self.session
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .end();
                    self.published.running.store(false, Ordering::Release);
                    self.published.release_socket();
                    return;
                }
            };

            match decode_response(&bytes) {
                Ok(raw) => {
                    // A stop request may have landed while we were blocked in receive
                    if !self.published.is_running() {
                        break;
                    }
                    self.published.publish(self.calibration.apply(&raw));
                }
                Err(e) => {
                    warn!("⚠️ Skipping malformed datagram: {}", e);
                    self.published.skip();
                }
            }
        }
        debug!("Streaming handler loop exited");
    }
}

impl Drop for StreamCoordinator {
    fn drop(&mut self) {
        self.halt();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
