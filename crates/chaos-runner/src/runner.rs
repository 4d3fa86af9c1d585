//! Orchestration of one engine activation
//!
//! Experiments run strictly one after another, in the order the engine lists
//! them. For each one:
//!
//! 1. status `Waiting for Job Creation`
//! 2. fetch and resolve the ChaosExperiment (missing: `Not Found`, skip)
//! 3. validate ConfigMap / Secret / host-path dependencies
//! 4. build and submit the Job
//! 5. settle, then watch until the Job finishes
//! 6. record the verdict from the ChaosResult
//! 7. apply the engine's job cleanup policy
//!
//! A failure in steps 3-6 ends that experiment with `Execution Aborted`.
//! Cleanup runs for every Job that finished, even when its verdict could not
//! be read; Jobs that failed to launch or were still running are kept.
//! Whether the run moves on is decided by [`FailurePolicy`]; a missing
//! definition is always skipped and a status desync always stops the run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chaos_common::crd::EngineState;

use crate::client::ChaosKubeClient;
use crate::config::{FailurePolicy, RunnerConfig};
use crate::dependencies::patch_dependencies;
use crate::engine::EngineContext;
use crate::error::RunnerError;
use crate::events::{EventPublisher, ExperimentEvent};
use crate::job::{build_experiment_job, launch};
use crate::resolver::resolve_experiment;
use crate::status::{StatusReconciler, StatusUpdate};
use crate::watcher::watch_completion;

/// How one experiment ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExperimentOutcome {
    /// Ran to completion with the verdict from its ChaosResult
    Completed {
        /// `Pass`, `Fail` or `Awaited`
        verdict: String,
    },
    /// ChaosExperiment definition missing; not launched
    Skipped,
    /// Stopped by an error
    Failed {
        /// Rendered error
        error: String,
    },
    /// Never started because the run stopped first
    NotRun,
}

/// Outcome of one experiment within a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExperimentReport {
    /// Experiment name
    pub name: String,
    /// How it ended
    pub outcome: ExperimentOutcome,
}

/// Outcomes of every experiment in the activation, in run order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// One report per listed experiment
    pub experiments: Vec<ExperimentReport>,
    /// The run was stopped by its cancellation token
    pub cancelled: bool,
}

impl RunSummary {
    /// Outcome of the named experiment, if it was listed
    pub fn outcome_of(&self, name: &str) -> Option<&ExperimentOutcome> {
        self.experiments
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    /// Number of experiments that ended in an error
    pub fn failed(&self) -> usize {
        self.experiments
            .iter()
            .filter(|r| matches!(r.outcome, ExperimentOutcome::Failed { .. }))
            .count()
    }

    /// No experiment failed and the run was not cancelled
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.cancelled
    }
}

/// Drives every experiment of one engine activation
pub struct Runner {
    client: Arc<dyn ChaosKubeClient>,
    events: Arc<dyn EventPublisher>,
    config: RunnerConfig,
}

impl Runner {
    /// Runner over `client`, reporting progress through `events`
    pub fn new(
        client: Arc<dyn ChaosKubeClient>,
        events: Arc<dyn EventPublisher>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            client,
            events,
            config,
        }
    }

    /// Run every experiment of `engine` in order.
    ///
    /// Per-experiment failures are reported in the summary. Errors are
    /// returned only when the status array cannot be initialized.
    pub async fn run(
        &self,
        engine: &EngineContext,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunnerError> {
        let mut reconciler = StatusReconciler::new(
            self.client.as_ref(),
            &engine.name,
            &engine.namespace,
            &self.config.runner_name,
            self.config.status_retry.clone(),
        );
        reconciler.initialize(&engine.experiments).await?;

        info!(
            engine = %engine.name,
            namespace = %engine.namespace,
            experiments = engine.experiments.len(),
            "starting chaos run"
        );

        let mut summary = RunSummary::default();
        let mut names = engine.experiments.iter();

        for name in names.by_ref() {
            if cancel.is_cancelled() {
                summary.experiments.push(ExperimentReport {
                    name: name.clone(),
                    outcome: ExperimentOutcome::NotRun,
                });
                break;
            }

            let mut job_name = None;
            let result = self
                .run_experiment(&mut reconciler, engine, name, &mut job_name, cancel)
                .await;

            let (outcome, stop) = match result {
                Ok(outcome) => (outcome, false),
                Err(e) => {
                    let stop = self
                        .fail_experiment(&mut reconciler, engine, name, job_name, &e)
                        .await;
                    (
                        ExperimentOutcome::Failed {
                            error: e.to_string(),
                        },
                        stop,
                    )
                }
            };

            summary.experiments.push(ExperimentReport {
                name: name.clone(),
                outcome,
            });
            if stop {
                break;
            }
        }

        summary
            .experiments
            .extend(names.map(|name| ExperimentReport {
                name: name.clone(),
                outcome: ExperimentOutcome::NotRun,
            }));
        summary.cancelled = cancel.is_cancelled();

        let state = if summary.cancelled {
            EngineState::Stopped
        } else {
            EngineState::Completed
        };
        if let Err(e) = reconciler.mark_engine_state(state).await {
            warn!(engine = %engine.name, error = %e, "failed to update engine state");
        }

        info!(
            engine = %engine.name,
            failed = summary.failed(),
            cancelled = summary.cancelled,
            "chaos run finished"
        );
        Ok(summary)
    }

    async fn run_experiment(
        &self,
        reconciler: &mut StatusReconciler<'_>,
        engine: &EngineContext,
        name: &str,
        job_name: &mut Option<String>,
        cancel: &CancellationToken,
    ) -> Result<ExperimentOutcome, RunnerError> {
        let client = self.client.as_ref();
        let config = &self.config;

        reconciler
            .patch_status(StatusUpdate::waiting_for_job(name))
            .await?;

        let (ctx, definition) =
            match resolve_experiment(client, engine, name, &config.status_retry).await {
                Ok(resolved) => resolved,
                Err(e @ RunnerError::ExperimentNotFound { .. }) => {
                    warn!(engine = %engine.name, experiment = %name, "skipping experiment: {e}");
                    reconciler
                        .patch_status(StatusUpdate::not_found(name))
                        .await?;
                    let event = ExperimentEvent::NotFound {
                        experiment: name.to_string(),
                    };
                    self.publish(engine, event).await;
                    return Ok(ExperimentOutcome::Skipped);
                }
                Err(e) => return Err(e),
            };

        let mounts = match patch_dependencies(
            client,
            &ctx.namespace,
            name,
            &definition,
            engine.overrides_for(name),
            &config.status_retry,
        )
        .await
        {
            Ok(mounts) => mounts,
            Err(e) => {
                self.publish(
                    engine,
                    ExperimentEvent::DependencyCheckFailed {
                        experiment: name.to_string(),
                        error: e.to_string(),
                    },
                )
                .await;
                return Err(e);
            }
        };
        self.publish(
            engine,
            ExperimentEvent::DependenciesReady {
                experiment: name.to_string(),
            },
        )
        .await;

        let ctx = ctx.with_mounts(mounts);
        let job = build_experiment_job(&ctx, engine);
        launch(client, &job).await?;
        *job_name = Some(ctx.job_name.clone());
        self.publish(
            engine,
            ExperimentEvent::JobCreated {
                experiment: name.to_string(),
                job: ctx.job_name.clone(),
            },
        )
        .await;

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RunnerError::Cancelled { job: ctx.job_name.clone() });
            }
            _ = tokio::time::sleep(config.settle_delay) => {}
        }

        watch_completion(client, reconciler, &ctx, config, cancel).await?;

        let completed = reconciler.complete(&ctx).await;
        if let Ok(verdict) = &completed {
            let event = ExperimentEvent::Summary {
                experiment: name.to_string(),
                verdict: verdict.clone(),
            };
            self.publish(engine, event).await;
        }
        self.clean_up(reconciler, engine, &ctx.job_name).await;

        Ok(ExperimentOutcome::Completed {
            verdict: completed?,
        })
    }

    /// Apply the cleanup policy to a Job that ran to completion
    async fn clean_up(&self, reconciler: &StatusReconciler<'_>, engine: &EngineContext, job: &str) {
        match reconciler.apply_cleanup(engine.cleanup_policy, job).await {
            Ok(deleted) => {
                let job = job.to_string();
                self.publish(engine, ExperimentEvent::JobCleanedUp { job, deleted })
                    .await;
            }
            Err(e) => {
                warn!(job = %job, error = %e, "failed to clean up experiment job");
            }
        }
    }

    /// Record a failed experiment and decide whether the run stops
    async fn fail_experiment(
        &self,
        reconciler: &mut StatusReconciler<'_>,
        engine: &EngineContext,
        name: &str,
        job_name: Option<String>,
        err: &RunnerError,
    ) -> bool {
        error!(engine = %engine.name, experiment = %name, error = %err, "experiment failed");

        if !err.is_desync() {
            let update = StatusUpdate::aborted(name, job_name.as_deref());
            if let Err(e) = reconciler.patch_status(update).await {
                warn!(experiment = %name, error = %e, "failed to record aborted experiment");
            }
        }
        self.publish(
            engine,
            ExperimentEvent::Skipped {
                experiment: name.to_string(),
                error: err.to_string(),
            },
        )
        .await;

        err.is_desync()
            || matches!(err, RunnerError::Cancelled { .. })
            || self.config.failure_policy == FailurePolicy::Halt
    }

    async fn publish(&self, engine: &EngineContext, event: ExperimentEvent) {
        self.events.publish(&engine.reference, event).await;
    }
}
