//! Scheduling engine.
//!
//! - [`ServerRegistry`]: per-server capacity, committed work and wait estimate
//! - [`JobAssigner`]: bootstrap ramp and steady-state server selection
//! - [`PendingQueue`]: FIFO of requests that found no idle server
//! - [`Dispatcher`]: ties the above together and handles completions

pub mod assigner;
pub mod dispatcher;
pub mod job;
pub mod queue;
pub mod registry;

pub use assigner::JobAssigner;
pub use dispatcher::{Completion, Dispatcher, DispatcherSnapshot};
pub use job::{Assignment, Event, JobId, JobRecord, JobRequest, JobSize};
pub use queue::PendingQueue;
pub use registry::{ServerRegistry, ServerState};
