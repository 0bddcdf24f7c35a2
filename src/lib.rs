pub mod config;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod shutdown;
pub mod transport;
