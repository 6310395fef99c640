//! Network module: connect probing and outcome classification

pub mod socket;

use crate::output::{EventSink, ScanEvent};
use async_trait::async_trait;
use serde::Serialize;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub use socket::TcpConnectProber;

/// What a single connect attempt ended in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The handshake completed
    Open,
    /// The peer actively refused the connection
    Closed,
    /// No answer within the timeout
    TimedOut,
    /// Any other connect-level failure (unreachable, reset, ...)
    Failed(String),
}

impl ProbeOutcome {
    /// Classify the result of a timeout-bounded connect.
    ///
    /// `None` means the timeout elapsed before the connect finished.
    pub fn classify<T>(result: Option<io::Result<T>>) -> Self {
        match result {
            Some(Ok(_)) => ProbeOutcome::Open,
            Some(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => ProbeOutcome::Closed,
            Some(Err(e)) => ProbeOutcome::Failed(e.to_string()),
            None => ProbeOutcome::TimedOut,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ProbeOutcome::Open)
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Open => write!(f, "open"),
            ProbeOutcome::Closed => write!(f, "closed"),
            ProbeOutcome::TimedOut => write!(f, "timed out"),
            ProbeOutcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Single-port presence probe
///
/// Implementors only have to provide [`PortProber::attempt`]; the boolean
/// [`PortProber::probe`] contract and its trace events come for free.
#[async_trait]
pub trait PortProber: Send + Sync {
    /// Make one connection attempt bounded by `timeout` and classify it
    async fn attempt(&self, target: SocketAddr, timeout: Duration) -> ProbeOutcome;

    /// Probe one port, reporting the attempt to `sink`.
    ///
    /// Returns true only if the port accepted a connection. Every failure
    /// mode is folded into `false`.
    async fn probe(
        &self,
        address: IpAddr,
        port: u16,
        timeout: Duration,
        sink: &dyn EventSink,
    ) -> bool {
        sink.emit(&ScanEvent::ProbeStarted { address, port });

        let outcome = self.attempt(SocketAddr::new(address, port), timeout).await;
        let open = outcome.is_open();

        sink.emit(&ScanEvent::ProbeFinished {
            address,
            port,
            outcome,
        });
        open
    }
}
