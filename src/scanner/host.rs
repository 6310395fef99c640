//! Per-host port loop

use super::HostResult;
use crate::network::PortProber;
use crate::output::EventSink;
use crate::utils::target_parser::ScanTarget;
use std::time::Duration;

/// Probe every port of one target, one after another, in the given order.
///
/// Never fails: a host with nothing open yields an empty `open_ports`.
pub async fn scan_host(
    prober: &dyn PortProber,
    target: &ScanTarget,
    ports: &[u16],
    timeout: Duration,
    sink: &dyn EventSink,
) -> HostResult {
    let mut open_ports = Vec::new();

    for &port in ports {
        if prober.probe(target.address, port, timeout, sink).await {
            open_ports.push(port);
        }
    }

    HostResult {
        address: target.address,
        source_range: target.source_range().to_string(),
        open_ports,
    }
}
