use crate::calibration::{Calibration, Offset, TareAccumulator};
use crate::config::SensorConfig;
use crate::error::{NetFtError, Result};
use crate::measurement::Measurement;
use crate::session::{Session, SessionState};
use crate::streaming::{Published, StreamCoordinator, StreamStats, RECEIVE_BUFFER_LEN};
use log::{debug, info, warn};
use rdt_protocol::{decode_response, encode_command, Command, RawSample, Transport, UdpTransport};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// Upper bound on datagrams discarded after STOP, in case the box never goes quiet
const MAX_DRAINED_DATAGRAMS: usize = 10_000;

/// Client for one Net F/T box
///
/// Two ways of consuming data are supported and must not be mixed:
///
/// - manual: issue a request (`get_measurements`, `start_streaming(false)`)
///   and call `receive` once per expected sample, or use the one-shot
///   `get_measurement` family and `tare`;
/// - handler: `start_streaming(true)` hands the socket to a background
///   thread and `measurement`/`force`/`torque` return the latest sample it
///   published without touching the network.
///
/// Every manual operation fails with `InvalidState` while the handler owns the
/// socket. All methods take `&self`, so a sensor can be shared behind an `Arc`
/// and `stop_streaming` may be called from any thread.
pub struct Sensor<T: Transport = UdpTransport> {
    transport: Arc<T>,
    config: SensorConfig,
    calibration: Arc<Calibration>,
    session: Arc<Mutex<Session>>,
    published: Arc<Published>,
    coordinator: Mutex<Option<StreamCoordinator>>,
}

impl Sensor<UdpTransport> {
    /// Open a UDP socket to the box at `ip` on the standard RDT port
    pub fn connect(ip: &str) -> Result<Self> {
        Self::from_config(SensorConfig::new(ip))
    }

    pub fn from_config(config: SensorConfig) -> Result<Self> {
        let transport = UdpTransport::connect(&config.ip, config.port)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> Sensor<T> {
    pub fn new(transport: T, config: SensorConfig) -> Self {
        info!("🔧 Net F/T client ready for {}:{}", config.ip, config.port);
        Self {
            transport: Arc::new(transport),
            config,
            calibration: Arc::new(Calibration::new()),
            session: Arc::new(Mutex::new(Session::default())),
            published: Arc::new(Published::default()),
            coordinator: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn ip(&self) -> &str {
        &self.config.ip
    }

    pub fn session_state(&self) -> SessionState {
        self.session().state()
    }

    /// The calibration offset currently subtracted from every sample, in counts
    pub fn offset(&self) -> Offset {
        self.calibration.current()
    }

    pub fn is_handler_running(&self) -> bool {
        self.published.is_running()
    }

    /// Why the last streaming handler died, if it died of a transport error
    pub fn transport_fault(&self) -> Option<String> {
        self.published.fault()
    }

    /// Counters for the current (or last) handler run
    pub fn stream_stats(&self) -> StreamStats {
        self.published.stats()
    }

    /// The latest value published by the handler, regardless of session state
    pub fn last_published(&self) -> Option<Measurement> {
        self.published.latest()
    }

    // --- manual acquisition ---

    /// Request a single sample and wait for it
    pub fn get_measurement(&self) -> Result<Measurement> {
        self.ensure_manual("get_measurement")?;
        // REQUEST 1 replaces whatever the box was streaming
        self.send(Command::StartRealtime, 1)?;
        self.session().begin(1);
        let bytes = self.transport.receive(RECEIVE_BUFFER_LEN)?;
        self.session().consumed();
        let raw = decode_response(&bytes)?;
        Ok(self.calibration.apply(&raw))
    }

    /// Request a single sample and return its force in newtons
    pub fn get_force(&self) -> Result<[f64; 3]> {
        Ok(self.get_measurement()?.force())
    }

    /// Request a single sample and return its torque in newton-meters
    pub fn get_torque(&self) -> Result<[f64; 3]> {
        Ok(self.get_measurement()?.torque())
    }

    /// Ask the box for `n` samples (0 = until STOP); collect them with `receive`
    pub fn get_measurements(&self, n: u32) -> Result<()> {
        self.ensure_manual("get_measurements")?;
        self.send(Command::StartRealtime, n)?;
        self.session().begin(n);
        Ok(())
    }

    /// Block until the next response arrives and decode it
    pub fn receive(&self) -> Result<Measurement> {
        self.ensure_manual("receive")?;
        let bytes = self.transport.receive(RECEIVE_BUFFER_LEN)?;
        self.session().consumed();
        let raw = decode_response(&bytes)?;
        Ok(self.calibration.apply(&raw))
    }

    // --- handler acquisition ---

    /// Latest sample published by the streaming handler
    pub fn measurement(&self) -> Result<Measurement> {
        if let Some(reason) = self.published.fault() {
            return Err(NetFtError::TransportLost(reason));
        }
        if !self.is_handler_running() {
            return Err(NetFtError::InvalidState(
                "no streaming handler is running".to_string(),
            ));
        }
        self.published.latest().ok_or_else(|| {
            NetFtError::InvalidState("no sample has been published yet".to_string())
        })
    }

    pub fn force(&self) -> Result<[f64; 3]> {
        Ok(self.measurement()?.force())
    }

    pub fn torque(&self) -> Result<[f64; 3]> {
        Ok(self.measurement()?.torque())
    }

    // --- calibration ---

    /// Average `n` fresh samples and subtract that mean from all future readings
    ///
    /// The new offset is installed only after all `n` samples arrived; on any
    /// error the previous offset stays in place.
    pub fn tare(&self, n: usize) -> Result<Offset> {
        if n == 0 {
            return Err(NetFtError::InvalidArgument(
                "tare needs at least one sample".to_string(),
            ));
        }
        let count = u32::try_from(n).map_err(|_| {
            NetFtError::InvalidArgument(format!("tare sample count {} is too large", n))
        })?;
        self.ensure_manual("tare")?;

        info!("⚖️  Taring with {} samples", n);
        self.send(Command::StartRealtime, count)?;
        self.session().begin(count);

        let mut accumulator = TareAccumulator::new(n);
        while accumulator.seen() < n {
            match self.receive_raw() {
                Ok(raw) => {
                    accumulator.push(&raw);
                    self.session().consumed();
                }
                Err(e) => {
                    warn!(
                        "⚠️ Tare aborted after {} of {} samples: {}",
                        accumulator.seen(),
                        n,
                        e
                    );
                    self.session().end();
                    if matches!(e, NetFtError::MalformedResponse { .. }) {
                        // The box is still sending the rest of the batch
                        if let Err(stop_err) = self.send(Command::Stop, 0) {
                            warn!("⚠️ Could not stop aborted tare batch: {}", stop_err);
                        }
                    }
                    return Err(e);
                }
            }
        }

        let offset = accumulator.finish().ok_or_else(|| {
            NetFtError::InvalidState("tare batch ended early".to_string())
        })?;
        self.calibration.install(offset);
        info!("✅ Tare complete: offset {:?}", offset);
        Ok(offset)
    }

    /// Drop the tare offset and report raw values again
    pub fn zero(&self) {
        self.calibration.reset();
        debug!("Calibration offset cleared");
    }

    // --- streaming control ---

    /// Ask the box to stream continuously
    ///
    /// With `use_handler` a background thread consumes the stream and
    /// publishes the latest sample; without it the caller must `receive`.
    pub fn start_streaming(&self, use_handler: bool) -> Result<()> {
        let mut coordinator = self.coordinator();
        if coordinator.as_ref().is_some_and(|c| c.is_running()) {
            return Err(NetFtError::InvalidState(
                "a streaming handler is already running".to_string(),
            ));
        }
        // Reap a handler that died of a transport error
        if let Some(dead) = coordinator.take() {
            dead.join();
        }

        self.send(Command::StartRealtime, 0)?;
        self.session().begin(0);

        if !use_handler {
            info!("▶️  Streaming started (manual receive)");
            return Ok(());
        }

        self.published.reset();
        match StreamCoordinator::spawn(
            self.transport.clone(),
            self.calibration.clone(),
            self.session.clone(),
            self.published.clone(),
            self.config.poll_interval,
        ) {
            Ok(handler) => {
                *coordinator = Some(handler);
                info!("▶️  Streaming started with background handler");
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ Could not spawn streaming handler: {}", e);
                if let Err(stop_err) = self.send(Command::Stop, 0) {
                    warn!("⚠️ Could not stop stream after spawn failure: {}", stop_err);
                }
                self.session().end();
                Err(NetFtError::Transport(e))
            }
        }
    }

    /// Stop the handler, let in-flight samples drain, then send STOP
    ///
    /// Returns once STOP was sent and the handler thread has exited; no
    /// background read happens after that. Manual operations keep failing
    /// with `InvalidState` until this returns.
    pub fn stop_streaming(&self) -> Result<()> {
        let mut coordinator = self.coordinator();
        let handler = coordinator.take();
        if let Some(handler) = handler.as_ref() {
            handler.halt();
        }

        thread::sleep(self.config.settle_delay);
        let sent = self.send(Command::Stop, 0);

        if let Some(handler) = handler {
            handler.join();
        }
        self.session().end();
        let drained = sent.map(|()| self.drain_stale());
        self.published.release_socket();
        drop(coordinator);

        let drained = drained?;
        if drained > 0 {
            debug!("Discarded {} samples still in flight after STOP", drained);
        }
        info!("⏹️  Streaming stopped");
        Ok(())
    }

    // --- internals ---

    fn send(&self, command: Command, count: u32) -> Result<()> {
        debug!("📤 Sending {:?} (count {})", command, count);
        self.transport.send(&encode_command(command, count))?;
        Ok(())
    }

    fn receive_raw(&self) -> Result<RawSample> {
        let bytes = self.transport.receive(RECEIVE_BUFFER_LEN)?;
        Ok(decode_response(&bytes)?)
    }

    /// Throw away datagrams the box sent before it saw STOP
    fn drain_stale(&self) -> usize {
        let mut drained = 0;
        while drained < MAX_DRAINED_DATAGRAMS {
            match self
                .transport
                .receive_timeout(RECEIVE_BUFFER_LEN, self.config.poll_interval)
            {
                Ok(Some(_)) => drained += 1,
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped draining after transport error: {}", e);
                    break;
                }
            }
        }
        drained
    }

    fn ensure_manual(&self, operation: &str) -> Result<()> {
        if self.published.owns_socket() {
            return Err(NetFtError::InvalidState(format!(
                "{} cannot run while the streaming handler owns the socket",
                operation
            )));
        }
        Ok(())
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn coordinator(&self) -> MutexGuard<'_, Option<StreamCoordinator>> {
        self.coordinator.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Transport> Drop for Sensor<T> {
    fn drop(&mut self) {
        let handler = self.coordinator().take();
        if let Some(handler) = handler {
            if handler.is_running() {
                debug!("Sensor dropped while streaming, stopping the box");
                handler.halt();
                let _ = self.send(Command::Stop, 0);
            }
            handler.join();
        }
        self.published.release_socket();
    }
}
