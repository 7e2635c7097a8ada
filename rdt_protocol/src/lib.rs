//! # RDT Protocol
//!
//! Wire codec and datagram transport for the RDT (Raw Data Transfer) protocol
//! spoken by ATI Net F/T interface boxes.
//!
//! This crate provides:
//! - Command and response record encoding (fixed size, network byte order)
//! - A `Transport` seam with a UDP implementation and an in-memory mock
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use rdt_protocol::{decode_response, encode_command, Command, Transport, UdpTransport, RDT_PORT};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = UdpTransport::connect("192.168.1.1", RDT_PORT)?;
//!
//! // Ask for exactly one sample
//! transport.send(&encode_command(Command::StartRealtime, 1))?;
//! let sample = decode_response(&transport.receive(1024)?)?;
//! println!("fz = {} counts", sample.counts[2]);
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use mock::{MockBoxHandle, MockTransport};
pub use protocol::{
    decode_command, decode_response, encode_command, Command, ProtocolError, RawSample,
    COMMAND_LEN, COUNTS_PER_UNIT, RDT_HEADER, RDT_PORT, RESPONSE_LEN,
};
pub use transport::{Transport, UdpTransport};
