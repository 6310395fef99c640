//! Sweep coordinator
//!
//! Expands the configured specs, feeds one host task per target to a fixed
//! pool of workers and turns their completions into the event stream.
//!
//! Completions are handled in the order they arrive, not the order targets
//! were submitted. The "range started" announcement fires whenever a
//! completion's range differs from the last announced one, so hosts from
//! ranges scanned side by side can make the announcement alternate.

use crate::config::ScanConfig;
use crate::network::{PortProber, TcpConnectProber};
use crate::output::{EventSink, ScanEvent};
use crate::scanner::{scan_host, HostResult, RangeProgress, RunSummary};
use crate::utils::target_parser::{AddressExpander, ScanTarget, TargetRange};
use crate::ScanError;
use chrono::Local;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinError;

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Expanding,
    Dispatching,
    Draining,
    Done,
}

/// A finished host task as seen by the coordinator
#[derive(Debug)]
struct Completion {
    target: ScanTarget,
    outcome: crate::Result<HostResult>,
}

/// Last announced range. Updated by one completion at a time.
#[derive(Debug, Default)]
struct RangeTracker {
    current: Mutex<Option<Arc<TargetRange>>>,
}

impl RangeTracker {
    /// Returns a progress record when `range` is not the current one
    fn enter(&self, range: &Arc<TargetRange>) -> Option<RangeProgress> {
        let mut current = self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if current.as_ref().map_or(false, |c| c.spec == range.spec) {
            return None;
        }

        *current = Some(Arc::clone(range));
        Some(RangeProgress::for_range(range, Local::now()))
    }
}

/// Bounded-concurrency sweep over every expanded target
pub struct ScanCoordinator {
    ports: Arc<[u16]>,
    address_specs: Vec<String>,
    concurrency: usize,
    timeout: Duration,
    expander: AddressExpander,
    prober: Arc<dyn PortProber>,
    sink: Arc<dyn EventSink>,
    phase: Mutex<RunPhase>,
}

impl ScanCoordinator {
    /// Create a coordinator with the TCP connect prober
    pub fn new(config: &ScanConfig, sink: Arc<dyn EventSink>) -> crate::Result<Self> {
        config.validate()?;

        Ok(Self {
            ports: Arc::from(config.ports.as_slice()),
            address_specs: config.address_specs.clone(),
            concurrency: config.concurrency,
            timeout: config.timeout_duration()?,
            expander: AddressExpander::new(config.max_hosts_per_range),
            prober: Arc::new(TcpConnectProber::new()),
            sink,
            phase: Mutex::new(RunPhase::Idle),
        })
    }

    /// Swap in a different prober
    pub fn with_prober(mut self, prober: Arc<dyn PortProber>) -> Self {
        self.prober = prober;
        self
    }

    /// Phase of the current (or last) run
    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn advance(&self, next: RunPhase) {
        let mut phase = self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        log::debug!("Run phase {:?} -> {:?}", *phase, next);
        *phase = next;
    }

    /// Run the sweep to completion.
    ///
    /// Must be called from within a tokio runtime. Invalid specs and failed
    /// host tasks are reported as events and counted in the summary; they do
    /// not stop the run.
    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        self.advance(RunPhase::Idle);
        self.sink.emit(&ScanEvent::RunStarted { at: Local::now() });

        self.advance(RunPhase::Expanding);
        let expansion = self.expander.expand(&self.address_specs);

        summary.invalid_specs = expansion.rejected.len();
        for error in &expansion.rejected {
            self.sink.emit(&invalid_target_event(error));
        }

        summary.targets = expansion.targets.len();
        if summary.targets > 0 {
            self.advance(RunPhase::Dispatching);
            let mut completions = self.dispatch(expansion.targets);

            self.advance(RunPhase::Draining);
            let ranges = RangeTracker::default();
            while let Some(completion) = completions.recv().await {
                self.handle_completion(completion, &ranges, &mut summary);
            }
        } else {
            log::debug!("No targets to scan");
        }

        summary.elapsed = started.elapsed();
        self.advance(RunPhase::Done);
        self.sink.emit(&ScanEvent::RunFinished {
            at: Local::now(),
            elapsed: summary.elapsed,
        });
        self.sink.flush();

        summary
    }

    /// Start the worker pool and the feeder.
    ///
    /// The job queue holds at most `concurrency` queued targets; the feeder
    /// waits for a free slot before submitting the next one.
    fn dispatch(&self, targets: Vec<ScanTarget>) -> mpsc::UnboundedReceiver<Completion> {
        let workers = self.concurrency.min(targets.len());
        let (job_tx, job_rx) = mpsc::channel::<ScanTarget>(self.concurrency);
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        for id in 0..workers {
            let worker = Worker {
                id,
                jobs: Arc::clone(&job_rx),
                done: done_tx.clone(),
                prober: Arc::clone(&self.prober),
                sink: Arc::clone(&self.sink),
                ports: Arc::clone(&self.ports),
                timeout: self.timeout,
            };
            tokio::spawn(worker.run());
        }

        // The receiver closes once every worker has dropped its sender.
        drop(done_tx);

        log::debug!("Dispatching {} targets to {} workers", targets.len(), workers);
        tokio::spawn(async move {
            for target in targets {
                if job_tx.send(target).await.is_err() {
                    log::warn!("Worker pool shut down before all targets were dispatched");
                    break;
                }
            }
        });

        done_rx
    }

    fn handle_completion(
        &self,
        completion: Completion,
        ranges: &RangeTracker,
        summary: &mut RunSummary,
    ) {
        let Completion { target, outcome } = completion;

        if let Some(progress) = ranges.enter(&target.range) {
            self.sink.emit(&ScanEvent::RangeStarted(progress));
        }

        match outcome {
            Ok(result) => {
                summary.completed += 1;
                if result.has_open_ports() {
                    summary.hosts_with_open_ports += 1;
                    summary.open_ports += result.open_ports.len();
                    self.sink.emit(&ScanEvent::HostOpenPorts {
                        address: result.address,
                        ports: result.open_ports,
                    });
                }
                self.sink.emit(&ScanEvent::HostCompleted {
                    address: result.address,
                });
            }
            Err(ScanError::TaskFailed { address, reason }) => {
                summary.failed += 1;
                self.sink.emit(&ScanEvent::HostFailed { address, reason });
            }
            Err(other) => {
                summary.failed += 1;
                self.sink.emit(&ScanEvent::HostFailed {
                    address: target.address,
                    reason: other.to_string(),
                });
            }
        }
    }
}

/// One pool slot: pulls targets until the queue is closed and drained
struct Worker {
    id: usize,
    jobs: Arc<tokio::sync::Mutex<mpsc::Receiver<ScanTarget>>>,
    done: mpsc::UnboundedSender<Completion>,
    prober: Arc<dyn PortProber>,
    sink: Arc<dyn EventSink>,
    ports: Arc<[u16]>,
    timeout: Duration,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = self.jobs.lock().await.recv().await;
            let Some(target) = next else {
                break;
            };

            let outcome = self.scan(target.clone()).await;
            if self.done.send(Completion { target, outcome }).is_err() {
                break;
            }
        }
        log::trace!("Worker {} exiting", self.id);
    }

    /// Scan one host in its own task so a panic is contained to that host
    async fn scan(&self, target: ScanTarget) -> crate::Result<HostResult> {
        let address = target.address;
        let prober = Arc::clone(&self.prober);
        let sink = Arc::clone(&self.sink);
        let ports = Arc::clone(&self.ports);
        let timeout = self.timeout;

        tokio::spawn(async move { scan_host(&*prober, &target, &ports, timeout, &*sink).await })
            .await
            .map_err(|e| ScanError::TaskFailed {
                address,
                reason: failure_reason(e),
            })
    }
}

fn failure_reason(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }

    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("task panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("task panicked: {}", message)
    } else {
        "task panicked".to_string()
    }
}

fn invalid_target_event(error: &ScanError) -> ScanEvent {
    match error {
        ScanError::AddressParse { spec, reason } => ScanEvent::TargetInvalid {
            spec: spec.clone(),
            reason: reason.clone(),
        },
        other => ScanEvent::TargetInvalid {
            spec: String::new(),
            reason: other.to_string(),
        },
    }
}
