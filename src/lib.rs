//! Client library for ATI Net F/T force/torque sensor boxes.
//!
//! The [`Sensor`] type speaks RDT over UDP: one-shot and batch reads, tare
//! calibration, and continuous streaming with an optional background handler
//! that keeps the latest measurement available to any thread.
//!
//! ```rust,no_run
//! use netft::Sensor;
//!
//! # fn main() -> netft::Result<()> {
//! let sensor = Sensor::connect("192.168.1.1")?;
//! sensor.tare(10)?;
//!
//! sensor.start_streaming(true)?;
//! std::thread::sleep(std::time::Duration::from_millis(50));
//! println!("force: {:?} N", sensor.force()?);
//! sensor.stop_streaming()?;
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod config;
pub mod error;
pub mod measurement;
pub mod sensor;
pub mod session;
pub mod simulator;
pub mod streaming;

pub use calibration::{Calibration, Offset};
pub use config::{load_config, ConfigError, SensorConfig};
pub use error::{NetFtError, Result};
pub use measurement::Measurement;
pub use sensor::Sensor;
pub use session::SessionState;
pub use simulator::{SimulatedBox, SimulatorConfig};
pub use streaming::StreamStats;
