//! Phase executor: plans a batch, runs it in order, persists each judgment and
//! decides whether to continue.
//!
//! Per phase: `pending -> running -> {succeeded | skipped | failed}`, or
//! `not_attempted` when the batch stopped first or a dependency failed.
//! Per batch: `planning -> running -> {completed | aborted | interrupted}`, or
//! `refused` when planning or a pre-flight gate stops it before any phase runs.

use crate::dag::{ForceRerun, PhaseRegistry, PlanAction, RunPlan};
use crate::errors::{BatchError, ConfigurationError, PhaseExecutionError};
use crate::gates::{PreflightCheck, run_preflight};
use crate::orchestrator::batch::{BatchResult, BatchState, ExecutionTimer, PhaseOutcome};
use crate::orchestrator::sequencer::{Judgment, Sequencer};
use crate::orchestrator::state::{ExecutionRecord, StateStore};
use crate::primer_config::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::{mpsc, watch};

/// Options for one batch.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    pub dry_run: bool,
    pub policy: FailurePolicy,
    pub force: ForceRerun,
}

/// Events emitted as a batch moves through its states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Planned {
        run: Vec<String>,
        skip: Vec<String>,
        dry_run: bool,
    },
    Skip {
        phase: String,
    },
    Start {
        phase: String,
        position: usize,
        total: usize,
    },
    Success {
        phase: String,
        detail: String,
        duration_ms: u64,
    },
    Failure {
        phase: String,
        detail: String,
        duration_ms: u64,
    },
    Timeout {
        phase: String,
        secs: u64,
        duration_ms: u64,
    },
    NotAttempted {
        phase: String,
        reason: String,
    },
    BatchCompleted {
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
    BatchAborted {
        failed_phase: String,
        not_attempted: Vec<String>,
    },
    BatchInterrupted {
        phase: Option<String>,
    },
    /// Planning or a pre-flight gate stopped the batch before any phase ran
    BatchRefused {
        stage: RefusalStage,
        error: String,
    },
}

/// Where a batch was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalStage {
    Planning,
    Preflight,
}

impl std::fmt::Display for RefusalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefusalStage::Planning => write!(f, "planning"),
            RefusalStage::Preflight => write!(f, "pre-flight"),
        }
    }
}

pub struct PhaseExecutor {
    registry: PhaseRegistry,
    store: StateStore,
    sequencer: Sequencer,
    options: ExecutorOptions,
    gates: Vec<Box<dyn PreflightCheck>>,
    event_tx: Option<mpsc::Sender<BatchEvent>>,
    interrupt: Option<watch::Receiver<bool>>,
}

impl PhaseExecutor {
    pub fn new(
        registry: PhaseRegistry,
        store: StateStore,
        sequencer: Sequencer,
        options: ExecutorOptions,
    ) -> Self {
        let sequencer = sequencer.dry_run(options.dry_run);
        Self {
            registry,
            store,
            sequencer,
            options,
            gates: Vec::new(),
            event_tx: None,
            interrupt: None,
        }
    }

    /// Gates consulted after planning and before the first phase.
    pub fn with_preflight(mut self, gates: Vec<Box<dyn PreflightCheck>>) -> Self {
        self.gates = gates;
        self
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<BatchEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Stop the batch when the flag flips to `true`.
    pub fn with_interrupt(mut self, rx: watch::Receiver<bool>) -> Self {
        self.sequencer = self.sequencer.with_interrupt(rx.clone());
        self.interrupt = Some(rx);
        self
    }

    /// Resolve the plan for `requested`, or every phase when it is empty.
    pub fn plan(&self, requested: &[String]) -> Result<RunPlan, ConfigurationError> {
        if requested.is_empty() {
            self.registry.resolve_all(&self.store, &self.options.force)
        } else {
            self.registry
                .resolve(requested, &self.store, &self.options.force)
        }
    }

    /// Run every declared phase.
    pub async fn execute_all(&mut self) -> Result<BatchResult, BatchError> {
        self.execute(&[]).await
    }

    /// Plan, check gates, then run the plan.
    pub async fn execute(&mut self, requested: &[String]) -> Result<BatchResult, BatchError> {
        let timer = ExecutionTimer::start();
        let dry_run = self.options.dry_run;

        let plan = match self.plan(requested) {
            Ok(plan) => plan,
            Err(e) => {
                self.emit_event(BatchEvent::BatchRefused {
                    stage: RefusalStage::Planning,
                    error: e.to_string(),
                })
                .await;
                return Err(e.into());
            }
        };
        self.emit_event(BatchEvent::Planned {
            run: plan.to_run().iter().map(|s| s.to_string()).collect(),
            skip: plan.to_skip().iter().map(|s| s.to_string()).collect(),
            dry_run,
        })
        .await;

        let preflight = run_preflight(&self.gates).await;
        // Ctrl-C during a gate command is an interrupt, not a refusal.
        if self.is_interrupted() {
            let mut outcomes = Vec::with_capacity(plan.len());
            self.emit_event(BatchEvent::BatchInterrupted { phase: None })
                .await;
            self.abandon(plan.entries.iter(), "interrupted", &mut outcomes)
                .await;
            return Ok(BatchResult::new(
                BatchState::Interrupted,
                dry_run,
                outcomes,
                timer.elapsed(),
            ));
        }
        if let Err(e) = preflight {
            self.emit_event(BatchEvent::BatchRefused {
                stage: RefusalStage::Preflight,
                error: e.to_string(),
            })
            .await;
            return Err(e.into());
        }

        let total = plan.len();
        let mut outcomes: Vec<PhaseOutcome> = Vec::with_capacity(total);
        let mut blocked: HashSet<String> = HashSet::new();
        let mut state = BatchState::Completed;

        let mut entries = plan.entries.iter().enumerate();
        while let Some((position, entry)) = entries.next() {
            if self.is_interrupted() {
                state = BatchState::Interrupted;
                self.emit_event(BatchEvent::BatchInterrupted { phase: None })
                    .await;
                self.abandon(
                    std::iter::once(entry).chain(entries.by_ref().map(|(_, e)| e)),
                    "interrupted",
                    &mut outcomes,
                )
                .await;
                break;
            }

            let Some(phase) = self.registry.get(&entry.id).cloned() else {
                return Err(ConfigurationError::UnknownPhase {
                    id: entry.id.clone(),
                }
                .into());
            };

            if entry.action == PlanAction::Skip {
                self.emit_event(BatchEvent::Skip {
                    phase: phase.id.clone(),
                })
                .await;
                outcomes.push(PhaseOutcome::skipped(&phase.id));
                continue;
            }

            if let Some(dep) = phase.depends_on.iter().find(|d| blocked.contains(*d)) {
                let reason = format!("blocked by {}", dep);
                self.emit_event(BatchEvent::NotAttempted {
                    phase: phase.id.clone(),
                    reason: reason.clone(),
                })
                .await;
                outcomes.push(PhaseOutcome::not_attempted(&phase.id, &reason));
                blocked.insert(phase.id.clone());
                continue;
            }

            self.emit_event(BatchEvent::Start {
                phase: phase.id.clone(),
                position: position + 1,
                total,
            })
            .await;

            let phase_timer = ExecutionTimer::start();
            let judgment = self.sequencer.run_and_judge(&phase).await;
            let duration = phase_timer.elapsed();
            let duration_ms = duration.as_millis() as u64;

            match judgment {
                Judgment::Succeeded { detail } => {
                    if !dry_run {
                        self.store
                            .put(
                                ExecutionRecord::succeeded(&phase.id, &detail)
                                    .with_fingerprint(phase.fingerprint()),
                            )
                            .map_err(BatchError::Other)?;
                    }
                    self.emit_event(BatchEvent::Success {
                        phase: phase.id.clone(),
                        detail: detail.clone(),
                        duration_ms,
                    })
                    .await;
                    outcomes.push(PhaseOutcome::succeeded(&phase.id, &detail, duration));
                }
                Judgment::Failed(error) => {
                    if !dry_run {
                        self.store
                            .put(
                                ExecutionRecord::failed(&phase.id, &error.to_string())
                                    .with_fingerprint(phase.fingerprint()),
                            )
                            .map_err(BatchError::Other)?;
                    }
                    self.emit_event(failure_event(&phase.id, &error, duration_ms))
                        .await;
                    outcomes.push(PhaseOutcome::failed(&phase.id, &error, duration));
                    blocked.insert(phase.id.clone());

                    if self.options.policy == FailurePolicy::FailFast {
                        state = BatchState::Aborted;
                        let reason = format!("batch aborted after {} failed", phase.id);
                        let first_skipped = outcomes.len();
                        self.abandon(entries.by_ref().map(|(_, e)| e), &reason, &mut outcomes)
                            .await;
                        let not_attempted = outcomes[first_skipped..]
                            .iter()
                            .map(|o| o.phase.clone())
                            .collect();
                        self.emit_event(BatchEvent::BatchAborted {
                            failed_phase: phase.id.clone(),
                            not_attempted,
                        })
                        .await;
                        break;
                    }
                }
                Judgment::Interrupted => {
                    // The record is left as it was before this attempt
                    state = BatchState::Interrupted;
                    outcomes.push(PhaseOutcome::interrupted(&phase.id, duration));
                    self.emit_event(BatchEvent::BatchInterrupted {
                        phase: Some(phase.id.clone()),
                    })
                    .await;
                    self.abandon(entries.by_ref().map(|(_, e)| e), "interrupted", &mut outcomes)
                        .await;
                    break;
                }
            }
        }

        let result = BatchResult::new(state, dry_run, outcomes, timer.elapsed());
        if state == BatchState::Completed {
            self.emit_event(BatchEvent::BatchCompleted {
                succeeded: result.succeeded().len(),
                failed: result.failed().len(),
                skipped: result.skipped().len(),
            })
            .await;
        }
        Ok(result)
    }

    async fn abandon<'a>(
        &self,
        entries: impl Iterator<Item = &'a crate::dag::PlannedPhase>,
        reason: &str,
        outcomes: &mut Vec<PhaseOutcome>,
    ) {
        for entry in entries {
            self.emit_event(BatchEvent::NotAttempted {
                phase: entry.id.clone(),
                reason: reason.to_string(),
            })
            .await;
            outcomes.push(PhaseOutcome::not_attempted(&entry.id, reason));
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Log the event and forward it to the channel if configured.
    async fn emit_event(&self, event: BatchEvent) {
        log_event(&event);
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}

fn failure_event(phase: &str, error: &PhaseExecutionError, duration_ms: u64) -> BatchEvent {
    match error {
        PhaseExecutionError::Timeout { secs } => BatchEvent::Timeout {
            phase: phase.to_string(),
            secs: *secs,
            duration_ms,
        },
        other => BatchEvent::Failure {
            phase: phase.to_string(),
            detail: other.to_string(),
            duration_ms,
        },
    }
}

fn log_event(event: &BatchEvent) {
    match event {
        BatchEvent::Planned { run, skip, dry_run } => {
            tracing::info!(run = ?run, skip = ?skip, dry_run, "Batch planned")
        }
        BatchEvent::Skip { phase } => tracing::info!(phase = %phase, "Skipping phase, already succeeded"),
        BatchEvent::Start {
            phase,
            position,
            total,
        } => tracing::info!(phase = %phase, position, total, "Starting phase"),
        BatchEvent::Success {
            phase,
            detail,
            duration_ms,
        } => tracing::info!(phase = %phase, detail = %detail, duration_ms, "Phase succeeded"),
        BatchEvent::Failure {
            phase,
            detail,
            duration_ms,
        } => tracing::error!(phase = %phase, detail = %detail, duration_ms, "Phase failed"),
        BatchEvent::Timeout {
            phase,
            secs,
            duration_ms,
        } => tracing::error!(phase = %phase, timeout_secs = secs, duration_ms, "Phase timed out"),
        BatchEvent::NotAttempted { phase, reason } => {
            tracing::warn!(phase = %phase, reason = %reason, "Phase not attempted")
        }
        BatchEvent::BatchCompleted {
            succeeded,
            failed,
            skipped,
        } => tracing::info!(succeeded, failed, skipped, "Batch completed"),
        BatchEvent::BatchAborted {
            failed_phase,
            not_attempted,
        } => tracing::error!(failed_phase = %failed_phase, not_attempted = ?not_attempted, "Batch aborted"),
        BatchEvent::BatchInterrupted { phase } => {
            tracing::warn!(phase = ?phase, "Batch interrupted")
        }
        BatchEvent::BatchRefused { stage, error } => {
            tracing::error!(stage = %stage, error = %error, "Batch refused")
        }
    }
}
