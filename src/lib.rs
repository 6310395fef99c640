//! tcpsweep - concurrent TCP connect sweeps over hosts and CIDR ranges
//!
//! The engine expands address specs into targets, probes every configured
//! port on each target with a bounded pool of workers and reports progress
//! as a stream of [`output::ScanEvent`]s.

pub mod config;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;
pub mod utils;

// Re-export commonly used types
pub use config::ScanConfig;
pub use error::{ScanError, ScanResult};
pub use network::{PortProber, ProbeOutcome, TcpConnectProber};
pub use output::{EventSink, LogSink, MemorySink, ScanEvent};
pub use scanner::{HostResult, RangeProgress, RunSummary, ScanCoordinator};
pub use utils::target_parser::{AddressExpander, ScanTarget};

pub type Result<T> = std::result::Result<T, ScanError>;
