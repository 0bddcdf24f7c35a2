use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

use crate::config::{CapacityStrategy, DrainStrategy, SchedulerConfig};
use crate::error::{DispatchError, Result};
use crate::scheduler::assigner::JobAssigner;
use crate::scheduler::job::{Assignment, Event, JobId, JobRecord, JobRequest};
use crate::scheduler::queue::PendingQueue;
use crate::scheduler::registry::{ServerRegistry, ServerState};

/// Outcome of a completion event
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// No live job with that id; nothing changed
    NotFound,
    Retired {
        server_id: String,
        /// Whether the server has no remaining work
        server_idle: bool,
        /// Queued requests routed as a result of the server freeing up
        assignments: Vec<Assignment>,
    },
}

/// Point-in-time view of the engine, logged on status ticks
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherSnapshot {
    pub servers: Vec<ServerState>,
    pub in_flight: usize,
    pub pending: usize,
    pub bootstrapping: bool,
}

/// The scheduling engine.
///
/// Owns the server registry, the in-flight job table and the pending queue.
/// All mutation happens through [`Dispatcher::process_batch`] or the
/// per-event methods it is built from; callers supply the clock.
#[derive(Debug)]
pub struct Dispatcher {
    config: SchedulerConfig,
    registry: ServerRegistry,
    assigner: JobAssigner,
    jobs: HashMap<JobId, JobRecord>,
    queue: PendingQueue,
}

impl Dispatcher {
    pub fn new<I, S>(server_ids: I, config: SchedulerConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = ServerRegistry::new(server_ids)?;
        let assigner = JobAssigner::new(&registry);
        tracing::info!(
            servers = registry.len(),
            drain = %config.drain_strategy,
            capacity = %config.capacity_strategy,
            default_job_size = config.default_job_size,
            "Dispatcher initialized"
        );
        Ok(Self {
            config,
            registry,
            assigner,
            jobs: HashMap::new(),
            queue: PendingQueue::new(),
        })
    }

    /// Handle one inbound batch and return every assignment it produced.
    ///
    /// Completions are applied before requests so servers they free are
    /// available to the same batch. Bad records are logged and skipped.
    pub fn process_batch<I>(&mut self, events: I, now: Instant) -> Vec<Assignment>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut completions = Vec::new();
        let mut requests = Vec::new();
        for event in events {
            match event {
                Event::Completed(job_id) => completions.push(job_id),
                Event::Request(request) => requests.push(request),
            }
        }

        let mut assignments = Vec::new();

        for job_id in completions {
            match self.complete(&job_id, now) {
                Completion::NotFound => {
                    tracing::warn!(job_id = %job_id, "Completion for unknown job ignored");
                }
                Completion::Retired {
                    assignments: drained,
                    ..
                } => assignments.extend(drained),
            }
        }

        for request in requests {
            match self.submit(request, now) {
                Ok(Some(assignment)) => assignments.push(assignment),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Request dropped"),
            }
        }

        assignments
    }

    /// Route a new request, or queue it when no server is idle.
    pub fn submit(&mut self, request: JobRequest, now: Instant) -> Result<Option<Assignment>> {
        if self.jobs.contains_key(&request.id) || self.queue.contains(&request.id) {
            return Err(DispatchError::DuplicateJob(request.id));
        }

        if let Some(server_id) = self.assigner.next_untouched() {
            tracing::debug!(server_id = %server_id, job_id = %request.id, "Bootstrap assignment");
            return self.assign(server_id, request, now).map(Some);
        }

        let size = request.size.or_default(self.config.default_job_size);
        match self.assigner.select_idle(&self.registry, size) {
            Some(server_id) => self.assign(server_id, request, now).map(Some),
            None => {
                tracing::debug!(
                    job_id = %request.id,
                    pending = self.queue.len() + 1,
                    "No idle server, request queued"
                );
                self.queue.push(request);
                Ok(None)
            }
        }
    }

    /// Retire a finished job and drain the queue if its server became idle.
    pub fn complete(&mut self, job_id: &str, now: Instant) -> Completion {
        let Some(record) = self.jobs.remove(job_id) else {
            return Completion::NotFound;
        };

        if !record.size_unknown {
            self.estimate_capacity(&record, now);
        }

        if let Err(e) = self
            .registry
            .remove_job(&record.server_id, record.size)
            .and_then(|_| self.registry.record_completion(&record.server_id))
        {
            tracing::error!(job_id, error = %e, "Completed job points at unregistered server");
        }

        let server_idle = self.registry.is_idle(&record.server_id);
        tracing::info!(job_id, server_id = %record.server_id, server_idle, "Job completed");

        let assignments = if server_idle {
            self.drain(now)
        } else {
            Vec::new()
        };

        Completion::Retired {
            server_id: record.server_id,
            server_idle,
            assignments,
        }
    }

    /// Assign queued requests to idle servers according to the drain strategy.
    pub fn drain(&mut self, now: Instant) -> Vec<Assignment> {
        let limit = match self.config.drain_strategy {
            DrainStrategy::DrainOne => 1,
            DrainStrategy::DrainAll => usize::MAX,
        };

        let mut assignments = Vec::new();
        while assignments.len() < limit {
            let Some(next) = self.queue.peek() else {
                break;
            };
            let size = next.size.or_default(self.config.default_job_size);
            let Some(server_id) = self.assigner.select_idle(&self.registry, size) else {
                break;
            };
            let Some(request) = self.queue.pop() else {
                break;
            };
            match self.assign(server_id, request, now) {
                Ok(assignment) => assignments.push(assignment),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to assign queued request");
                    break;
                }
            }
        }

        if !assignments.is_empty() {
            tracing::debug!(
                drained = assignments.len(),
                pending = self.queue.len(),
                "Pending queue drained"
            );
        }
        assignments
    }

    fn assign(
        &mut self,
        server_id: String,
        request: JobRequest,
        now: Instant,
    ) -> Result<Assignment> {
        let record = JobRecord::new(
            server_id.clone(),
            request.size,
            self.config.default_job_size,
            now,
        );
        self.registry.add_job(&server_id, record.size)?;
        tracing::info!(
            job_id = %request.id,
            server_id = %server_id,
            size = %request.size,
            "Job assigned"
        );
        self.jobs.insert(request.id.clone(), record);
        Ok(Assignment { server_id, request })
    }

    fn estimate_capacity(&mut self, record: &JobRecord, now: Instant) {
        let elapsed = now.saturating_duration_since(record.submitted_at).as_secs_f64();
        if elapsed <= 0.0 {
            tracing::debug!(
                server_id = %record.server_id,
                "Zero elapsed time, capacity not estimated"
            );
            return;
        }
        let sample = (record.size as f64 / elapsed) as u64;

        let result = match self.config.capacity_strategy {
            CapacityStrategy::FirstSample => {
                let known = self
                    .registry
                    .get(&record.server_id)
                    .and_then(|s| s.capacity)
                    .is_some();
                if known {
                    return;
                }
                self.registry.update_capacity(&record.server_id, sample)
            }
            CapacityStrategy::RunningAverage => self
                .registry
                .refine_capacity(&record.server_id, sample)
                .map(|_| ()),
        };

        if let Err(e) = result {
            tracing::warn!(server_id = %record.server_id, error = %e, "Capacity update rejected");
        }
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn job(&self, job_id: &str) -> Option<&JobRecord> {
        self.jobs.get(job_id)
    }

    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.assigner.is_bootstrapping()
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            servers: self.registry.iter().cloned().collect(),
            in_flight: self.jobs.len(),
            pending: self.queue.len(),
            bootstrapping: self.assigner.is_bootstrapping(),
        }
    }
}
