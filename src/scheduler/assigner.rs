use std::collections::VecDeque;

use crate::scheduler::registry::ServerRegistry;

/// Picks the server for each request.
///
/// Until every server has been handed a job, requests go to the next
/// untouched server in handshake order so its capacity can be measured.
/// After that, an idle server with unknown capacity is preferred, and among
/// servers with known capacity the one with the lowest resulting wait wins.
#[derive(Debug, Default)]
pub struct JobAssigner {
    untouched: VecDeque<String>,
}

impl JobAssigner {
    pub fn new(registry: &ServerRegistry) -> Self {
        Self {
            untouched: registry.server_ids().iter().cloned().collect(),
        }
    }

    /// True while some server has never been assigned a job
    pub fn is_bootstrapping(&self) -> bool {
        !self.untouched.is_empty()
    }

    /// Take the next bootstrap target, if any remain.
    pub fn next_untouched(&mut self) -> Option<String> {
        self.untouched.pop_front()
    }

    /// Steady-state choice among idle servers for a job of `size`.
    ///
    /// Returns `None` when no server is idle. Ties go to the server listed
    /// first in the handshake.
    pub fn select_idle(&self, registry: &ServerRegistry, size: u64) -> Option<String> {
        let mut best: Option<(&str, f64)> = None;

        for server in registry.idle_servers() {
            let Some(wait) = server.estimated_wait_if_added(size) else {
                // Unknown capacity: keep learning before optimizing
                return Some(server.id.clone());
            };
            match best {
                Some((_, best_wait)) if best_wait <= wait => {}
                _ => best = Some((server.id.as_str(), wait)),
            }
        }

        best.map(|(id, _)| id.to_string())
    }
}
