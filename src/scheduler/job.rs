use std::fmt;
use std::time::Instant;

/// Job identifier as it appears on the wire (the file name of the request).
pub type JobId = String;

/// Declared size of a job request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSize {
    Known(u64),
    Unknown,
}

impl JobSize {
    /// Interpret a declared size. Non-positive values mean the size is unknown.
    pub fn from_declared(declared: i64) -> Self {
        if declared > 0 {
            JobSize::Known(declared as u64)
        } else {
            JobSize::Unknown
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, JobSize::Known(_))
    }

    /// Size used for bookkeeping, substituting `default` for unknown sizes.
    pub fn or_default(&self, default: u64) -> u64 {
        match self {
            JobSize::Known(size) => *size,
            JobSize::Unknown => default,
        }
    }
}

impl fmt::Display for JobSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSize::Known(size) => write!(f, "{}", size),
            JobSize::Unknown => write!(f, "unknown"),
        }
    }
}

/// A job request as received from the event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub id: JobId,
    pub size: JobSize,
    /// Original record text, echoed back in the assignment
    pub raw: String,
}

impl JobRequest {
    pub fn new(id: impl Into<JobId>, size: JobSize) -> Self {
        let id = id.into();
        let declared = match size {
            JobSize::Known(size) => size.to_string(),
            JobSize::Unknown => "-1".to_string(),
        };
        let raw = format!("{},{}", id, declared);
        Self { id, size, raw }
    }

    pub fn with_raw(id: impl Into<JobId>, size: JobSize, raw: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            size,
            raw: raw.into(),
        }
    }
}

/// One inbound record from the event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Request(JobRequest),
    Completed(JobId),
}

/// Bookkeeping for a job that has been routed and not yet completed.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub server_id: String,
    /// Size booked on the server (the default size for unknown-size jobs)
    pub size: u64,
    pub size_unknown: bool,
    pub submitted_at: Instant,
}

impl JobRecord {
    pub fn new(server_id: String, size: JobSize, default_size: u64, submitted_at: Instant) -> Self {
        Self {
            server_id,
            size: size.or_default(default_size),
            size_unknown: !size.is_known(),
            submitted_at,
        }
    }
}

/// Routing decision handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub server_id: String,
    pub request: JobRequest,
}

impl Assignment {
    /// Wire form: `<server>,<original request>\n`
    pub fn to_line(&self) -> String {
        format!("{},{}\n", self.server_id, self.request.raw)
    }
}
