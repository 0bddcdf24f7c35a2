use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Capacity already estimated for server {0}")]
    CapacityAlreadySet(String),

    #[error("Duplicate job id: {0}")]
    DuplicateJob(String),

    #[error("Malformed record {record:?}: {reason}")]
    MalformedRecord { record: String, reason: String },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
