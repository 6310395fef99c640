//! Scan events and the sinks that consume them
//!
//! The engine never logs its progress directly. It emits [`ScanEvent`]s into
//! an [`EventSink`] handed to it at construction; the sink decides whether
//! they end up in a log file, a JSON stream or a test buffer.

use crate::network::ProbeOutcome;
use crate::scanner::RangeProgress;
use chrono::{DateTime, Local};
use log::Level;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Everything the engine reports while a sweep runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    RunStarted { at: DateTime<Local> },
    TargetInvalid { spec: String, reason: String },
    RangeStarted(RangeProgress),
    ProbeStarted { address: IpAddr, port: u16 },
    ProbeFinished { address: IpAddr, port: u16, outcome: ProbeOutcome },
    HostOpenPorts { address: IpAddr, ports: Vec<u16> },
    HostCompleted { address: IpAddr },
    HostFailed { address: IpAddr, reason: String },
    RunFinished { at: DateTime<Local>, elapsed: Duration },
}

impl ScanEvent {
    /// Log level the event is reported at
    pub fn level(&self) -> Level {
        match self {
            ScanEvent::ProbeStarted { .. } | ScanEvent::ProbeFinished { .. } => Level::Trace,
            ScanEvent::TargetInvalid { .. } => Level::Warn,
            ScanEvent::HostFailed { .. } => Level::Error,
            _ => Level::Info,
        }
    }

    /// Whether this is a per-attempt trace event
    pub fn is_trace(&self) -> bool {
        self.level() == Level::Trace
    }
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanEvent::RunStarted { at } => {
                write!(f, "Scan started at {}", at.format("%Y-%m-%d %H:%M:%S"))
            }
            ScanEvent::TargetInvalid { spec, reason } => {
                write!(f, "Skipping invalid address spec '{}': {}", spec, reason)
            }
            ScanEvent::RangeStarted(progress) => write!(
                f,
                "Scanning {}: {} - {} ({} addresses)",
                progress.range,
                progress.first_address,
                progress.last_address,
                progress.total_addresses
            ),
            ScanEvent::ProbeStarted { address, port } => {
                write!(f, "Probing {}", std::net::SocketAddr::new(*address, *port))
            }
            ScanEvent::ProbeFinished { address, port, outcome } => write!(
                f,
                "{} -> {}",
                std::net::SocketAddr::new(*address, *port),
                outcome
            ),
            ScanEvent::HostOpenPorts { address, ports } => {
                write!(f, "IP {} has open ports: {:?}", address, ports)
            }
            ScanEvent::HostCompleted { address } => write!(f, "Finished scanning {}", address),
            ScanEvent::HostFailed { address, reason } => {
                write!(f, "IP {} generated an error: {}", address, reason)
            }
            ScanEvent::RunFinished { at, elapsed } => write!(
                f,
                "Scan finished at {} after {:.2?}",
                at.format("%Y-%m-%d %H:%M:%S"),
                elapsed
            ),
        }
    }
}

/// Destination for scan events.
///
/// Sinks are shared between workers, so `emit` takes `&self` and must be
/// callable from any thread. Lifecycle is construct, `emit` any number of
/// times, then `flush` once when the run is done.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ScanEvent);

    fn flush(&self) {}
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: &ScanEvent) {
        (**self).emit(event)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

/// Forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &ScanEvent) {
        log::log!(event.level(), "{}", event);
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

/// Writes one JSON object per event
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
    include_trace: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            include_trace: false,
        }
    }

    /// Also write per-attempt probe events
    pub fn with_trace(mut self, include_trace: bool) -> Self {
        self.include_trace = include_trace;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn writer(&self) -> MutexGuard<'_, W> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: &ScanEvent) {
        if event.is_trace() && !self.include_trace {
            return;
        }

        let mut writer = self.writer();
        let written = serde_json::to_writer(&mut *writer, event)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = written {
            log::warn!("Failed to write JSON event: {}", e);
        }
    }

    fn flush(&self) {
        if let Err(e) = self.writer().flush() {
            log::warn!("Failed to flush JSON events: {}", e);
        }
    }
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ScanEvent>>,
    flushed: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of events matching `predicate`
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ScanEvent) -> bool,
    {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|event| predicate(event))
            .count()
    }

    /// How many times `flush` was called
    pub fn flush_count(&self) -> usize {
        *self.flushed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ScanEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }

    fn flush(&self) {
        *self.flushed.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
    }
}

/// Sends every event to several sinks in turn
#[derive(Default)]
pub struct TeeSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl TeeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for TeeSink {
    fn emit(&self, event: &ScanEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn test_levels() {
        let probe = ScanEvent::ProbeStarted { address: localhost(), port: 22 };
        assert_eq!(probe.level(), Level::Trace);
        assert!(probe.is_trace());

        let invalid = ScanEvent::TargetInvalid { spec: "x".into(), reason: "bad".into() };
        assert_eq!(invalid.level(), Level::Warn);

        let failed = ScanEvent::HostFailed { address: localhost(), reason: "boom".into() };
        assert_eq!(failed.level(), Level::Error);

        let done = ScanEvent::HostCompleted { address: localhost() };
        assert_eq!(done.level(), Level::Info);
    }

    #[test]
    fn test_open_ports_message() {
        let event = ScanEvent::HostOpenPorts { address: localhost(), ports: vec![22, 80] };
        assert_eq!(event.to_string(), "IP 127.0.0.1 has open ports: [22, 80]");
    }

    #[test]
    fn test_json_lines_skip_trace_by_default() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.emit(&ScanEvent::ProbeStarted { address: localhost(), port: 80 });
        sink.emit(&ScanEvent::HostCompleted { address: localhost() });
        sink.flush();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 1);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["event"], "host_completed");
        assert_eq!(value["address"], "127.0.0.1");
    }

    #[test]
    fn test_json_lines_with_trace() {
        let sink = JsonLinesSink::new(Vec::new()).with_trace(true);
        sink.emit(&ScanEvent::ProbeFinished {
            address: localhost(),
            port: 80,
            outcome: ProbeOutcome::Closed,
        });

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["event"], "probe_finished");
        assert_eq!(value["outcome"], "closed");
    }

    #[test]
    fn test_memory_and_tee_sinks() {
        let memory = Arc::new(MemorySink::new());
        let tee = TeeSink::new().with(memory.clone()).with(Arc::new(LogSink));

        tee.emit(&ScanEvent::HostCompleted { address: localhost() });
        tee.emit(&ScanEvent::HostCompleted { address: localhost() });
        tee.flush();

        assert_eq!(memory.events().len(), 2);
        assert_eq!(memory.count(|e| matches!(e, ScanEvent::HostCompleted { .. })), 2);
        assert_eq!(memory.flush_count(), 1);
    }
}
