//! Process health: the two external dependencies plus partition coverage.
//!
//! Losing Kafka or Elasticsearch makes the process unhealthy. Losing some
//! partition workers while the rest keep consuming only degrades it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of the latest check against one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub name: String,
    pub healthy: bool,
    pub detail: Option<String>,
    /// `None` until the first check ran
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct ProbeState {
    healthy: bool,
    detail: Option<String>,
    checked_at: Option<DateTime<Utc>>,
}

/// Latest outcome of a connectivity check. Unchecked probes count as down.
#[derive(Debug)]
pub struct Probe {
    name: &'static str,
    state: RwLock<ProbeState>,
}

impl Probe {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(ProbeState::default()),
        }
    }

    /// Records a check outcome.
    pub fn record(&self, healthy: bool, detail: Option<String>) {
        let mut state = self.state.write();
        state.healthy = healthy;
        state.detail = detail;
        state.checked_at = Some(Utc::now());
    }

    pub fn set_healthy(&self) {
        self.record(true, None);
    }

    pub fn set_unhealthy(&self, detail: impl Into<String>) {
        self.record(false, Some(detail.into()));
    }

    pub fn is_healthy(&self) -> bool {
        self.state.read().healthy
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn result(&self) -> ProbeResult {
        let state = self.state.read();
        ProbeResult {
            name: self.name.to_string(),
            healthy: state.healthy,
            detail: state.detail.clone(),
            checked_at: state.checked_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub probes: Vec<ProbeResult>,
    pub partitions_assigned: u64,
    pub partitions_active: u64,
}

impl HealthReport {
    pub fn log(&self) {
        let down: Vec<&str> = self
            .probes
            .iter()
            .filter(|p| !p.healthy)
            .map(|p| p.name.as_str())
            .collect();

        if self.status == HealthStatus::Healthy {
            info!(partitions = self.partitions_active, "Health: healthy");
        } else {
            warn!(
                status = ?self.status,
                down = ?down,
                partitions_assigned = self.partitions_assigned,
                partitions_active = self.partitions_active,
                "Health: not healthy"
            );
        }
    }
}

pub struct HealthRegistry {
    pub kafka: Probe,
    pub elastic: Probe,
    partitions_assigned: AtomicU64,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            kafka: Probe::new("kafka"),
            elastic: Probe::new("elastic"),
            partitions_assigned: AtomicU64::new(0),
        }
    }

    /// Number of partitions the pipeline started workers for.
    pub fn set_partitions_assigned(&self, n: u64) {
        self.partitions_assigned.store(n, Ordering::Relaxed);
    }

    /// Combines the probes with the number of workers still running.
    pub fn report_with(&self, partitions_active: u64) -> HealthReport {
        let probes = vec![self.kafka.result(), self.elastic.result()];
        let partitions_assigned = self.partitions_assigned.load(Ordering::Relaxed);

        let status = if probes.iter().any(|p| !p.healthy) {
            HealthStatus::Unhealthy
        } else if partitions_active < partitions_assigned {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            probes,
            partitions_assigned,
            partitions_active,
        }
    }

    /// Report using the live `partitions_active` gauge.
    pub fn report(&self) -> HealthReport {
        self.report_with(crate::metrics().partitions_active.get())
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static HEALTH: std::sync::LazyLock<HealthRegistry> = std::sync::LazyLock::new(HealthRegistry::new);

pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
