use std::collections::HashMap;

use serde::Serialize;

use crate::error::{DispatchError, Result};

/// Per-server throughput and load tracking
#[derive(Debug, Clone, Serialize)]
pub struct ServerState {
    pub id: String,
    /// Estimated throughput in size units per second, `None` until estimated
    pub capacity: Option<u64>,
    /// Sum of booked sizes of jobs not yet completed
    pub committed_size: u64,
    /// Estimated seconds until all committed work is done
    pub estimated_wait: f64,
    pub completed_jobs: u64,
    #[serde(skip)]
    capacity_samples: u64,
}

impl ServerState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capacity: None,
            committed_size: 0,
            estimated_wait: 0.0,
            completed_jobs: 0,
            capacity_samples: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.committed_size == 0
    }

    pub fn add_job(&mut self, size: u64) {
        self.committed_size = self.committed_size.saturating_add(size);
        if let Some(capacity) = self.capacity {
            self.estimated_wait += size as f64 / capacity as f64;
        }
    }

    pub fn remove_job(&mut self, size: u64) {
        self.committed_size = self.committed_size.saturating_sub(size);
        if let Some(capacity) = self.capacity {
            self.estimated_wait = (self.estimated_wait - size as f64 / capacity as f64).max(0.0);
        }
        if self.committed_size == 0 {
            // drop accumulated float error
            self.estimated_wait = 0.0;
        }
    }

    /// Wait time if a job of `size` were added now. `None` when capacity is unknown.
    pub fn estimated_wait_if_added(&self, size: u64) -> Option<f64> {
        self.capacity
            .map(|capacity| self.estimated_wait + size as f64 / capacity as f64)
    }

    fn set_capacity(&mut self, capacity: u64) {
        let capacity = capacity.max(1);
        self.capacity = Some(capacity);
        self.estimated_wait = self.committed_size as f64 / capacity as f64;
    }
}

/// Owns every server's state, in handshake order
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: HashMap<String, ServerState>,
    order: Vec<String>,
}

impl ServerRegistry {
    /// Build the registry from the handshake worker list.
    ///
    /// Fails on an empty list or a repeated id.
    pub fn new<I, S>(server_ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::default();
        for id in server_ids {
            let id = id.into();
            if registry.servers.contains_key(&id) {
                return Err(DispatchError::Handshake(format!(
                    "server {id} listed twice"
                )));
            }
            registry.order.push(id.clone());
            registry.servers.insert(id.clone(), ServerState::new(id));
        }
        if registry.order.is_empty() {
            return Err(DispatchError::Handshake("no servers announced".to_string()));
        }
        Ok(registry)
    }

    pub fn get(&self, server_id: &str) -> Option<&ServerState> {
        self.servers.get(server_id)
    }

    fn get_mut(&mut self, server_id: &str) -> Result<&mut ServerState> {
        self.servers
            .get_mut(server_id)
            .ok_or_else(|| DispatchError::ServerNotFound(server_id.to_string()))
    }

    pub fn add_job(&mut self, server_id: &str, size: u64) -> Result<()> {
        self.get_mut(server_id)?.add_job(size);
        Ok(())
    }

    /// Inverse of [`ServerRegistry::add_job`]; pass the size that was booked.
    pub fn remove_job(&mut self, server_id: &str, size: u64) -> Result<()> {
        self.get_mut(server_id)?.remove_job(size);
        Ok(())
    }

    pub fn estimated_wait_if_added(&self, server_id: &str, size: u64) -> Result<Option<f64>> {
        self.servers
            .get(server_id)
            .map(|server| server.estimated_wait_if_added(size))
            .ok_or_else(|| DispatchError::ServerNotFound(server_id.to_string()))
    }

    /// Set the capacity estimate. Only the first call per server takes effect.
    pub fn update_capacity(&mut self, server_id: &str, capacity: u64) -> Result<()> {
        let server = self.get_mut(server_id)?;
        if server.capacity.is_some() {
            return Err(DispatchError::CapacityAlreadySet(server_id.to_string()));
        }
        server.set_capacity(capacity);
        server.capacity_samples = 1;
        tracing::info!(server_id, capacity = ?server.capacity, "Capacity estimated");
        Ok(())
    }

    /// Fold another throughput sample into the server's mean capacity.
    pub fn refine_capacity(&mut self, server_id: &str, sample: u64) -> Result<u64> {
        let server = self.get_mut(server_id)?;
        let samples = server.capacity_samples;
        let mean = match server.capacity {
            Some(current) if samples > 0 => {
                let total = current as u128 * samples as u128 + sample as u128;
                (total / (samples as u128 + 1)) as u64
            }
            _ => sample,
        };
        server.set_capacity(mean);
        server.capacity_samples = samples.saturating_add(1);
        tracing::debug!(
            server_id,
            capacity = ?server.capacity,
            samples = server.capacity_samples,
            "Capacity refined"
        );
        Ok(server.capacity.unwrap_or(mean))
    }

    pub fn record_completion(&mut self, server_id: &str) -> Result<()> {
        self.get_mut(server_id)?.completed_jobs += 1;
        Ok(())
    }

    pub fn is_idle(&self, server_id: &str) -> bool {
        self.servers
            .get(server_id)
            .map(ServerState::is_idle)
            .unwrap_or(false)
    }

    /// Idle servers in handshake order
    pub fn idle_servers(&self) -> Vec<&ServerState> {
        self.iter().filter(|s| s.is_idle()).collect()
    }

    /// All servers in handshake order
    pub fn iter(&self) -> impl Iterator<Item = &ServerState> {
        self.order.iter().filter_map(|id| self.servers.get(id))
    }

    pub fn server_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
