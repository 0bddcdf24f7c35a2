use std::collections::{HashSet, VecDeque};

use crate::scheduler::job::{JobId, JobRequest};

/// FIFO of requests waiting for an idle server
#[derive(Debug, Default)]
pub struct PendingQueue {
    requests: VecDeque<JobRequest>,
    ids: HashSet<JobId>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request to the back of the queue
    pub fn push(&mut self, request: JobRequest) {
        self.ids.insert(request.id.clone());
        self.requests.push_back(request);
    }

    /// Take the oldest request
    pub fn pop(&mut self) -> Option<JobRequest> {
        let request = self.requests.pop_front()?;
        self.ids.remove(&request.id);
        Some(request)
    }

    pub fn peek(&self) -> Option<&JobRequest> {
        self.requests.front()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
