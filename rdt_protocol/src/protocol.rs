use thiserror::Error;

/// Magic header carried by every command record
pub const RDT_HEADER: u16 = 0x1234;

/// UDP port the Net F/T box listens on for RDT commands
pub const RDT_PORT: u16 = 49152;

/// Size of a command record: [header:u16][command:u16][sample_count:u32]
pub const COMMAND_LEN: usize = 8;

/// Size of a response record: three u32 header words followed by six i32 counts
pub const RESPONSE_LEN: usize = 36;

/// Device counts per engineering unit (N for force, Nm for torque)
pub const COUNTS_PER_UNIT: f64 = 1_000_000.0;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: expected {expected} bytes, got {actual}")]
    MalformedResponse { expected: usize, actual: usize },

    #[error("Malformed command: {0}")]
    MalformedCommand(String),
}

/// RDT command codes
///
/// Only `Stop` and `StartRealtime` are issued by the sensor client. The other
/// codes are defined by RDT and pass through the codec untouched, as does any
/// code the box might understand that is not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Stop,
    StartRealtime,
    StartBuffered,
    StartMultiUnit,
    ResetThresholdLatch,
    SetSoftwareBias,
    Other(u16),
}

impl Command {
    pub fn code(self) -> u16 {
        match self {
            Command::Stop => 0x0000,
            Command::StartRealtime => 0x0002,
            Command::StartBuffered => 0x0003,
            Command::StartMultiUnit => 0x0004,
            Command::ResetThresholdLatch => 0x0041,
            Command::SetSoftwareBias => 0x0042,
            Command::Other(code) => code,
        }
    }
}

impl From<u16> for Command {
    fn from(code: u16) -> Self {
        match code {
            0x0000 => Command::Stop,
            0x0002 => Command::StartRealtime,
            0x0003 => Command::StartBuffered,
            0x0004 => Command::StartMultiUnit,
            0x0041 => Command::ResetThresholdLatch,
            0x0042 => Command::SetSoftwareBias,
            other => Command::Other(other),
        }
    }
}

/// One decoded RDT response record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    /// Increments with every record the box sends
    pub sequence: u32,
    /// Status / error word reported by the box
    pub status: u32,
    /// Position of this record inside the requested batch
    pub sample_index: u32,
    /// Raw fx, fy, fz, tx, ty, tz in device counts
    pub counts: [i32; 6],
}

impl RawSample {
    /// Serialize to a response record (network byte order)
    pub fn to_bytes(&self) -> [u8; RESPONSE_LEN] {
        let mut bytes = [0u8; RESPONSE_LEN];
        bytes[0..4].copy_from_slice(&self.sequence.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.status.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.sample_index.to_be_bytes());
        for (axis, value) in self.counts.iter().enumerate() {
            let start = 12 + axis * 4;
            bytes[start..start + 4].copy_from_slice(&value.to_be_bytes());
        }
        bytes
    }
}

/// Encode a command record: [0x1234:u16][command:u16][sample_count:u32], big-endian
pub fn encode_command(command: Command, sample_count: u32) -> [u8; COMMAND_LEN] {
    let mut bytes = [0u8; COMMAND_LEN];
    bytes[0..2].copy_from_slice(&RDT_HEADER.to_be_bytes());
    bytes[2..4].copy_from_slice(&command.code().to_be_bytes());
    bytes[4..8].copy_from_slice(&sample_count.to_be_bytes());
    bytes
}

/// Decode a command record back into its command and sample count
pub fn decode_command(bytes: &[u8]) -> Result<(Command, u32), ProtocolError> {
    if bytes.len() != COMMAND_LEN {
        return Err(ProtocolError::MalformedCommand(format!(
            "expected {} bytes, got {}",
            COMMAND_LEN,
            bytes.len()
        )));
    }

    let header = u16::from_be_bytes([bytes[0], bytes[1]]);
    if header != RDT_HEADER {
        return Err(ProtocolError::MalformedCommand(format!(
            "bad header 0x{:04x}",
            header
        )));
    }

    let command = Command::from(u16::from_be_bytes([bytes[2], bytes[3]]));
    let sample_count = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok((command, sample_count))
}

/// Decode a response record; the length must match exactly
pub fn decode_response(bytes: &[u8]) -> Result<RawSample, ProtocolError> {
    if bytes.len() != RESPONSE_LEN {
        return Err(ProtocolError::MalformedResponse {
            expected: RESPONSE_LEN,
            actual: bytes.len(),
        });
    }

    let word = |offset: usize| {
        [
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]
    };

    let mut counts = [0i32; 6];
    for (axis, value) in counts.iter_mut().enumerate() {
        *value = i32::from_be_bytes(word(12 + axis * 4));
    }

    Ok(RawSample {
        sequence: u32::from_be_bytes(word(0)),
        status: u32::from_be_bytes(word(4)),
        sample_index: u32::from_be_bytes(word(8)),
        counts,
    })
}
