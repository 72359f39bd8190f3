//! Dispatch coordinator.
//!
//! Owns the run-state machine and the single-flight dispatch path: select a
//! batch, render it, hand it to the notification sink, and only then mark
//! it delivered. Scheduled ticks and manual triggers funnel through the
//! same mutex, so a reconciliation pass can never interleave with another
//! selection.
//!
//! Dispatching requires the coordinator to be running: `dispatch_now` on a
//! stopped coordinator returns [`CoordinatorError::NotRunning`] instead of
//! sending. Scheduled ticks that land while stopped are skipped.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::catalog::PhraseCatalogService;
use crate::application::digest::DigestFormatter;
use crate::application::engine::{CycleEngine, CycleOverview, EngineError};
use crate::application::settings::DigestSettingsService;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink transport error: {0}")]
    Transport(String),
    #[error("sink rejected message: {0}")]
    Rejected(String),
}

/// Outbound message channel. `send` resolving to `Ok` is the signal that
/// the rendered digest was accepted and the batch may be marked delivered.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, rendered: &str) -> Result<(), SinkError>;
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// `start` on a coordinator that is already running. An idempotency
    /// signal, not a failure.
    #[error("coordinator is already running")]
    AlreadyRunning,
    /// `stop` or `dispatch_now` on a stopped coordinator.
    #[error("coordinator is not running")]
    NotRunning,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// What a single dispatch did. Distinguishes "no work" from "broke" so a
/// CLI or scheduler can react differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { count: usize, cycle: i32 },
    NothingToSend,
    SinkFailed { count: usize, reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    pub batch_size: usize,
}

impl DispatchReport {
    /// The sink-success boolean callers key off.
    pub fn delivered(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Delivered { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorStatus {
    pub running: bool,
    pub last_dispatch_at: Option<OffsetDateTime>,
    pub last_result: Option<DispatchOutcome>,
    pub cycle: CycleOverview,
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    last_dispatch_at: Option<OffsetDateTime>,
    last_result: Option<DispatchOutcome>,
}

pub struct DispatchCoordinator {
    engine: CycleEngine,
    sink: Arc<dyn NotificationSink>,
    formatter: Arc<dyn DigestFormatter>,
    settings: DigestSettingsService,
    catalog: PhraseCatalogService,
    batch_size: usize,
    state: Mutex<RunState>,
    dispatch_gate: tokio::sync::Mutex<()>,
}

impl DispatchCoordinator {
    pub fn new(
        engine: CycleEngine,
        sink: Arc<dyn NotificationSink>,
        formatter: Arc<dyn DigestFormatter>,
        settings: DigestSettingsService,
        catalog: PhraseCatalogService,
        batch_size: usize,
    ) -> Self {
        Self {
            engine,
            sink,
            formatter,
            settings,
            catalog,
            batch_size,
            state: Mutex::new(RunState::default()),
            dispatch_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn start(&self) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock().expect("run state lock poisoned");
        if state.running {
            return Err(CoordinatorError::AlreadyRunning);
        }
        state.running = true;
        info!(target = "application::dispatch", "coordinator started");
        Ok(())
    }

    pub fn stop(&self) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock().expect("run state lock poisoned");
        if !state.running {
            return Err(CoordinatorError::NotRunning);
        }
        state.running = false;
        info!(target = "application::dispatch", "coordinator stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().expect("run state lock poisoned").running
    }

    pub async fn status(&self) -> Result<CoordinatorStatus, CoordinatorError> {
        let cycle = self.engine.overview().await?;
        let state = self.state.lock().expect("run state lock poisoned");
        Ok(CoordinatorStatus {
            running: state.running,
            last_dispatch_at: state.last_dispatch_at,
            last_result: state.last_result.clone(),
            cycle,
        })
    }

    /// Run one dispatch. Serialized against concurrent triggers; records
    /// the dispatch time and result whatever the outcome.
    pub async fn dispatch_now(&self) -> Result<DispatchReport, CoordinatorError> {
        if !self.is_running() {
            return Err(CoordinatorError::NotRunning);
        }

        let _in_flight = self.dispatch_gate.lock().await;

        match self.run_dispatch().await {
            Ok(report) => {
                self.record(report.outcome.clone());
                Ok(report)
            }
            Err(err) => {
                self.record(DispatchOutcome::Failed {
                    reason: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    async fn run_dispatch(&self) -> Result<DispatchReport, EngineError> {
        metrics::counter!("rondo_dispatch_total").increment(1);

        let Some(pending) = self.engine.select_next_batch(self.batch_size).await? else {
            info!(target = "application::dispatch", "nothing eligible to send");
            return Ok(DispatchReport {
                outcome: DispatchOutcome::NothingToSend,
                batch_size: 0,
            });
        };

        let settings = self.settings.get_or_default().await;
        let rendered = self.formatter.render(pending.phrases(), &settings);
        let count = pending.phrases().len();
        let cycle = pending.cycle();
        let touched_unselected = pending.touched_unselected();

        match self.sink.send(&rendered).await {
            Ok(()) => {
                let ids = pending.confirm().await?;
                // Delivery bookkeeping just changed under these rows; drop
                // their cached snapshots before reporting success.
                if touched_unselected {
                    self.catalog.all_phrases_changed().await;
                } else {
                    self.catalog.phrases_changed(&ids).await;
                }
                metrics::counter!("rondo_dispatch_phrases_total").increment(count as u64);
                info!(
                    target = "application::dispatch",
                    count, cycle, "digest delivered"
                );
                Ok(DispatchReport {
                    outcome: DispatchOutcome::Delivered { count, cycle },
                    batch_size: count,
                })
            }
            Err(err) => {
                warn!(
                    target = "application::dispatch",
                    count,
                    error = %err,
                    "sink rejected digest, batch rolled back"
                );
                if let Err(abandon_err) = pending.abandon().await {
                    warn!(
                        target = "application::dispatch",
                        error = %abandon_err,
                        "rollback after sink failure also failed"
                    );
                }
                Ok(DispatchReport {
                    outcome: DispatchOutcome::SinkFailed {
                        count,
                        reason: err.to_string(),
                    },
                    batch_size: count,
                })
            }
        }
    }

    fn record(&self, outcome: DispatchOutcome) {
        let mut state = self.state.lock().expect("run state lock poisoned");
        state.last_dispatch_at = Some(OffsetDateTime::now_utc());
        state.last_result = Some(outcome);
    }
}
