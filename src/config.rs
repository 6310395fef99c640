//! Configuration module for the tcpsweep scanner

use crate::ScanError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default number of concurrent host workers
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default per-port connect timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: f64 = 0.5;

/// Default cap on usable hosts a single CIDR spec may expand to
pub const DEFAULT_MAX_HOSTS_PER_RANGE: u64 = 65_536;

/// Largest accepted worker pool; also the job queue capacity
pub const MAX_CONCURRENCY: usize = 65_536;

/// Main configuration structure for a sweep
///
/// Built once before the engine starts and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Ports probed on every host, in probe order
    pub ports: Vec<u16>,

    /// Single addresses or CIDR blocks to sweep
    pub address_specs: Vec<String>,

    /// Number of hosts scanned in parallel
    pub concurrency: usize,

    /// Timeout for each connection attempt in seconds
    pub timeout_secs: f64,

    /// Largest number of usable hosts accepted from one CIDR spec
    pub max_hosts_per_range: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            address_specs: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_hosts_per_range: DEFAULT_MAX_HOSTS_PER_RANGE,
        }
    }
}

/// On-disk layout of a target file.
///
/// Both keys are required; anything else in the file is ignored.
#[derive(Debug, Deserialize)]
struct TargetFile {
    #[serde(alias = "ports")]
    tcp_ports: Vec<u16>,
    #[serde(alias = "address_specs")]
    ip_ranges: Vec<String>,
}

impl ScanConfig {
    /// Create a new scan configuration
    pub fn new(ports: Vec<u16>, address_specs: Vec<String>) -> Self {
        Self::default()
            .with_ports(ports)
            .with_address_specs(address_specs)
    }

    /// Set the ports to scan, dropping repeats
    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = dedup_ports(ports);
        self
    }

    /// Set the address specs to expand
    pub fn with_address_specs(mut self, address_specs: Vec<String>) -> Self {
        self.address_specs = address_specs;
        self
    }

    /// Set the worker pool size
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the per-port timeout in seconds
    pub fn with_timeout_secs(mut self, timeout_secs: f64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the per-range host cap
    pub fn with_max_hosts_per_range(mut self, max_hosts: u64) -> Self {
        self.max_hosts_per_range = max_hosts;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> crate::Result<Duration> {
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(ScanError::config(format!(
                "Timeout must be a positive number of seconds, got {}",
                self.timeout_secs
            )));
        }

        Duration::try_from_secs_f64(self.timeout_secs).map_err(|e| {
            ScanError::config(format!(
                "Timeout of {} seconds is out of range: {}",
                self.timeout_secs, e
            ))
        })
    }

    /// Load ports and address specs from a file.
    ///
    /// `.json` files are read as JSON, `.yaml` and `.yml` as YAML, everything
    /// else as TOML. The remaining settings keep their defaults and are
    /// usually set from the command line.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Self::from_json_str(&content),
            "yaml" | "yml" => Self::from_yaml_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Parse a YAML target file
    pub fn from_yaml_str(content: &str) -> crate::Result<Self> {
        let file: TargetFile = serde_yaml::from_str(content)
            .map_err(|e| ScanError::config(format!("Failed to parse YAML: {}", e)))?;
        Ok(Self::new(file.tcp_ports, file.ip_ranges))
    }

    /// Parse a TOML target file
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let file: TargetFile = toml::from_str(content)
            .map_err(|e| ScanError::config(format!("Failed to parse TOML: {}", e)))?;
        Ok(Self::new(file.tcp_ports, file.ip_ranges))
    }

    /// Parse a JSON target file
    pub fn from_json_str(content: &str) -> crate::Result<Self> {
        let file: TargetFile = serde_json::from_str(content)
            .map_err(|e| ScanError::config(format!("Failed to parse JSON: {}", e)))?;
        Ok(Self::new(file.tcp_ports, file.ip_ranges))
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.ports.is_empty() {
            return Err(ScanError::config("No ports specified"));
        }

        if self.concurrency == 0 {
            return Err(ScanError::config("Worker count must be greater than 0"));
        }

        if self.concurrency > MAX_CONCURRENCY {
            return Err(ScanError::config(format!(
                "Worker count must be at most {}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }

        self.timeout_duration()?;

        if self.max_hosts_per_range == 0 {
            return Err(ScanError::config("Per-range host limit must be greater than 0"));
        }

        Ok(())
    }
}

/// Remove repeated ports, keeping the first occurrence of each
fn dedup_ports(ports: Vec<u16>) -> Vec<u16> {
    let mut seen = HashSet::with_capacity(ports.len());
    let deduped: Vec<u16> = ports.into_iter().filter(|port| seen.insert(*port)).collect();
    deduped
}
