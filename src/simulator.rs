use log::{debug, info, warn};
use rdt_protocol::{decode_command, Command, RawSample};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for the simulated Net F/T box
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Address to bind the UDP socket to (use "127.0.0.1:0" for a random port)
    pub bind_address: String,
    /// Time between two streamed samples
    pub sample_period: Duration,
    /// Counts reported on every sample, fx..tz
    pub counts: [i32; 6],
    /// Status word reported on every sample
    pub status: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            sample_period: Duration::from_millis(1),
            counts: [0; 6],
            status: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    /// `None` streams until STOP
    Streaming { remaining: Option<u32> },
}

/// UDP stand-in for a Net F/T box, answering RDT commands on a local socket
pub struct SimulatedBox {
    config: SimulatorConfig,
    counts: Arc<Mutex<[i32; 6]>>,
    should_stop: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedBox {
    pub fn new(config: SimulatorConfig) -> Self {
        info!("🎛️  Simulated Net F/T box configured:");
        info!("  📍 Bind: {}", config.bind_address);
        info!("  ⏱️ Period: {:?}", config.sample_period);
        info!("  📊 Counts: {:?}", config.counts);

        let counts = Arc::new(Mutex::new(config.counts));
        Self {
            config,
            counts,
            should_stop: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            thread: None,
        }
    }

    /// Bind the socket, start answering commands and return the bound address
    pub fn start(&mut self) -> io::Result<SocketAddr> {
        let socket = UdpSocket::bind(&self.config.bind_address)?;
        socket.set_read_timeout(Some(self.config.sample_period.max(Duration::from_millis(1))))?;
        let local_addr = socket.local_addr()?;
        self.local_addr = Some(local_addr);
        self.should_stop.store(false, Ordering::Relaxed);

        info!("🎛️  Simulated box listening on {}", local_addr);

        let should_stop = self.should_stop.clone();
        let counts = self.counts.clone();
        let status = self.config.status;
        self.thread = Some(
            thread::Builder::new()
                .name("netft-sim".to_string())
                .spawn(move || serve(socket, should_stop, counts, status))?,
        );

        Ok(local_addr)
    }

    /// Change the counts reported from the next sample on
    pub fn set_counts(&self, counts: [i32; 6]) {
        *self.counts.lock().unwrap_or_else(|e| e.into_inner()) = counts;
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            info!("🛑 Simulated box stopped");
        }
    }
}

impl Drop for SimulatedBox {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(
    socket: UdpSocket,
    should_stop: Arc<AtomicBool>,
    counts: Arc<Mutex<[i32; 6]>>,
    status: u32,
) {
    let mut buffer = [0u8; 64];
    let mut mode = Mode::Idle;
    let mut peer: Option<SocketAddr> = None;
    let mut sequence: u32 = 0;
    let mut sample_index: u32 = 0;

    while !should_stop.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buffer) {
            Ok((len, from)) => match decode_command(&buffer[..len]) {
                Ok((Command::StartRealtime, count)) => {
                    debug!("📥 {} requested {} samples", from, count);
                    peer = Some(from);
                    sample_index = 0;
                    mode = Mode::Streaming {
                        remaining: (count > 0).then_some(count),
                    };
                }
                Ok((Command::Stop, _)) => {
                    debug!("📥 {} sent STOP", from);
                    mode = Mode::Idle;
                }
                Ok((other, count)) => {
                    debug!("Ignoring {:?} (count {}) from {}", other, count, from);
                }
                Err(e) => warn!("⚠️ Ignoring bad command from {}: {}", from, e),
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => warn!("⚠️ Simulator receive error: {}", e),
        }

        let Mode::Streaming { remaining } = mode else {
            continue;
        };
        let Some(target) = peer else {
            continue;
        };

        sequence = sequence.wrapping_add(1);
        sample_index = sample_index.wrapping_add(1);
        let sample = RawSample {
            sequence,
            status,
            sample_index,
            counts: *counts.lock().unwrap_or_else(|e| e.into_inner()),
        };
        if let Err(e) = socket.send_to(&sample.to_bytes(), target) {
            warn!("⚠️ Failed to send sample to {}: {}", target, e);
        }

        mode = match remaining {
            Some(1) => Mode::Idle,
            Some(left) => Mode::Streaming {
                remaining: Some(left - 1),
            },
            None => mode,
        };
    }
}
