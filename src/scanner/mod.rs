//! Scanner module containing the host scanner and the sweep coordinator

pub mod engine;
pub mod host;

use crate::utils::target_parser::TargetRange;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;

pub use engine::{RunPhase, ScanCoordinator};
pub use host::scan_host;

/// Open ports found on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostResult {
    pub address: IpAddr,
    pub source_range: String,
    /// Open ports in configured probe order
    pub open_ports: Vec<u16>,
}

impl HostResult {
    pub fn has_open_ports(&self) -> bool {
        !self.open_ports.is_empty()
    }
}

/// Announcement for the first completed host of a range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeProgress {
    pub range: String,
    pub first_address: IpAddr,
    pub last_address: IpAddr,
    /// Usable addresses in the range, saturating at `u64::MAX`
    pub total_addresses: u64,
    pub started_at: DateTime<Local>,
}

impl RangeProgress {
    pub fn for_range(range: &TargetRange, started_at: DateTime<Local>) -> Self {
        let span = range.span();
        Self {
            range: range.spec.clone(),
            first_address: span.first,
            last_address: span.last,
            total_addresses: u64::try_from(span.total).unwrap_or(u64::MAX),
            started_at,
        }
    }
}

/// What a finished sweep reports back to its caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Specs that were rejected during expansion
    pub invalid_specs: usize,
    /// Hosts dispatched to the worker pool
    pub targets: usize,
    /// Hosts whose scan ran to completion
    pub completed: usize,
    /// Hosts whose scan task failed
    pub failed: usize,
    /// Completed hosts with at least one open port
    pub hosts_with_open_ports: usize,
    /// Total open ports across all hosts
    pub open_ports: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Hosts per second over the whole run
    pub fn scan_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.completed + self.failed) as f64 / secs
        } else {
            0.0
        }
    }
}
