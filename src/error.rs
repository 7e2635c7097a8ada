use crate::config::ConfigError;
use rdt_protocol::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetFtError>;

#[derive(Error, Debug)]
pub enum NetFtError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Malformed response: expected {expected} bytes, got {actual}")]
    MalformedResponse { expected: usize, actual: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Transport lost while streaming: {0}")]
    TransportLost(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ProtocolError> for NetFtError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => NetFtError::Transport(e),
            ProtocolError::MalformedResponse { expected, actual } => {
                NetFtError::MalformedResponse { expected, actual }
            }
            ProtocolError::MalformedCommand(reason) => NetFtError::InvalidArgument(reason),
        }
    }
}
