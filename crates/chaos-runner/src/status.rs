//! Experiment status reconciliation on the ChaosEngine
//!
//! The engine's `status.experiments` array is shared with anything else that
//! writes the engine, so every change is a read-modify-write carrying the
//! `resourceVersion` it was derived from. A 409 re-reads and tries again, up
//! to the configured attempt count.
//!
//! Records are looked up by experiment name (first match). A name that has no
//! record is a desync: the initial write was skipped or lost to another
//! writer. It is reported as [`RunnerError::StatusIndexNotFound`] and nothing
//! is written.
//!
//! Within one run each experiment moves forward only:
//!
//! ```text
//! Waiting -> Waiting for Job Creation -> Running (repeated) -> terminal
//! ```
//!
//! where terminal is one of `Execution Successful`, `ChaosExperiment Not
//! Found` or `Execution Aborted`. The reconciler keeps a ledger of the last
//! phase it wrote per name and refuses to move backwards.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use chaos_common::crd::{
    result_name, ChaosEngineStatus, CleanupPolicy, EngineState, ExperimentStatus,
};
use chaos_common::retry::{retry_with_backoff_if, RetryConfig};

use crate::client::{ChaosKubeClient, StatusWrite};
use crate::error::RunnerError;
use crate::resolver::ExperimentContext;

/// Verdict strings written next to a phase
pub mod verdicts {
    /// Recorded when the status array is built
    pub const WAIT_FOR_COMPLETION: &str = "Wait for Completion";
    /// Recorded while the Job is being prepared
    pub const WAITING: &str = "Waiting";
    /// Recorded on every poll while the experiment runs
    pub const AWAITED: &str = "Awaited";
    /// Recorded when the experiment never produced a verdict
    pub const FAILED: &str = "Failed";
}

/// Lifecycle phase of one experiment, as written to `status`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExperimentPhase {
    /// Listed, not started
    Waiting,
    /// Being resolved and launched
    WaitingForJob,
    /// Job active
    Running,
    /// Job finished and the verdict was recorded
    Completed,
    /// No ChaosExperiment definition
    NotFound,
    /// Stopped by an error
    Aborted,
}

impl ExperimentPhase {
    /// Text written to the record's `status` field
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::WaitingForJob => "Waiting for Job Creation",
            Self::Running => "Running",
            Self::Completed => "Execution Successful",
            Self::NotFound => "ChaosExperiment Not Found",
            Self::Aborted => "Execution Aborted",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::WaitingForJob => 1,
            Self::Running => 2,
            Self::Completed | Self::NotFound | Self::Aborted => 3,
        }
    }

    /// No further writes are accepted after this phase
    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    /// Whether a record in this phase may next be written as `next`
    pub fn can_advance_to(self, next: ExperimentPhase) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl std::fmt::Display for ExperimentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status record write
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Experiment whose record is written
    pub experiment: String,
    /// Phase to record
    pub phase: ExperimentPhase,
    /// Verdict to record
    pub verdict: String,
    /// Job name; `None` keeps whatever the record already holds
    pub experiment_pod: Option<String>,
}

impl StatusUpdate {
    /// Experiment picked up, Job not created yet
    pub fn waiting_for_job(experiment: &str) -> Self {
        Self {
            experiment: experiment.to_string(),
            phase: ExperimentPhase::WaitingForJob,
            verdict: verdicts::WAITING.to_string(),
            experiment_pod: None,
        }
    }

    /// Job active; records the Job name
    pub fn running(ctx: &ExperimentContext) -> Self {
        Self {
            experiment: ctx.name.clone(),
            phase: ExperimentPhase::Running,
            verdict: verdicts::AWAITED.to_string(),
            experiment_pod: Some(ctx.job_name.clone()),
        }
    }

    /// Definition missing
    pub fn not_found(experiment: &str) -> Self {
        Self {
            experiment: experiment.to_string(),
            phase: ExperimentPhase::NotFound,
            verdict: verdicts::FAILED.to_string(),
            experiment_pod: None,
        }
    }

    /// Job finished with `verdict`
    pub fn completed(ctx: &ExperimentContext, verdict: &str) -> Self {
        Self {
            experiment: ctx.name.clone(),
            phase: ExperimentPhase::Completed,
            verdict: verdict.to_string(),
            experiment_pod: Some(ctx.job_name.clone()),
        }
    }

    /// Experiment failed; `job_name` is set once a Job was submitted
    pub fn aborted(experiment: &str, job_name: Option<&str>) -> Self {
        Self {
            experiment: experiment.to_string(),
            phase: ExperimentPhase::Aborted,
            verdict: verdicts::FAILED.to_string(),
            experiment_pod: job_name.map(str::to_string),
        }
    }
}

/// Writes experiment status for one engine activation
pub struct StatusReconciler<'a> {
    client: &'a dyn ChaosKubeClient,
    engine: String,
    namespace: String,
    runner: String,
    retry: RetryConfig,
    ledger: BTreeMap<String, ExperimentPhase>,
}

impl<'a> StatusReconciler<'a> {
    /// Reconciler for `engine`, stamping `runner` on every record
    pub fn new(
        client: &'a dyn ChaosKubeClient,
        engine: &str,
        namespace: &str,
        runner: &str,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            engine: engine.to_string(),
            namespace: namespace.to_string(),
            runner: runner.to_string(),
            retry,
            ledger: BTreeMap::new(),
        }
    }

    /// Last phase this reconciler wrote for `experiment`
    pub fn phase_of(&self, experiment: &str) -> Option<ExperimentPhase> {
        self.ledger.get(experiment).copied()
    }

    /// Append a `Waiting` record for every name not yet in the status array.
    ///
    /// Existing records are left alone, so a re-run keeps its history until
    /// each experiment starts.
    pub async fn initialize(&mut self, experiments: &[String]) -> Result<(), RunnerError> {
        let runner = self.runner.clone();
        self.update_status(|status| {
            let mut appended = false;
            for name in experiments {
                if status.index_of(name).is_none() {
                    status.experiments.push(ExperimentStatus {
                        name: name.clone(),
                        runner: runner.clone(),
                        experiment_pod: String::new(),
                        status: ExperimentPhase::Waiting.as_str().to_string(),
                        verdict: verdicts::WAIT_FOR_COMPLETION.to_string(),
                        last_update_time: Utc::now(),
                    });
                    appended = true;
                }
            }
            Ok(appended)
        })
        .await?;

        for name in experiments {
            self.ledger.insert(name.clone(), ExperimentPhase::Waiting);
        }
        Ok(())
    }

    /// Replace the status record named by `update`
    pub async fn patch_status(&mut self, update: StatusUpdate) -> Result<(), RunnerError> {
        if let Some(current) = self.phase_of(&update.experiment) {
            if !current.can_advance_to(update.phase) {
                error!(
                    engine = %self.engine,
                    experiment = %update.experiment,
                    from = %current,
                    to = %update.phase,
                    "refusing to move experiment status backwards"
                );
                return Err(RunnerError::StatusRegression {
                    experiment: update.experiment,
                    from: current.to_string(),
                    to: update.phase.to_string(),
                });
            }
        }

        let engine = self.engine.clone();
        let runner = self.runner.clone();
        self.update_status(|status| {
            let Some(index) = status.index_of(&update.experiment) else {
                error!(
                    engine = %engine,
                    experiment = %update.experiment,
                    "no status record for experiment"
                );
                return Err(RunnerError::StatusIndexNotFound {
                    engine: engine.clone(),
                    experiment: update.experiment.clone(),
                });
            };

            let record = &mut status.experiments[index];
            record.status = update.phase.as_str().to_string();
            record.verdict = update.verdict.clone();
            record.runner = runner.clone();
            if let Some(pod) = &update.experiment_pod {
                record.experiment_pod = pod.clone();
            }
            record.last_update_time = Utc::now();
            Ok(true)
        })
        .await?;

        debug!(
            engine = %self.engine,
            experiment = %update.experiment,
            status = %update.phase,
            verdict = %update.verdict,
            "experiment status updated"
        );
        self.ledger.insert(update.experiment, update.phase);
        Ok(())
    }

    /// Verdict from the experiment's ChaosResult
    pub async fn fetch_verdict(&self, experiment: &str) -> Result<String, RunnerError> {
        let name = result_name(&self.engine, experiment);
        let result = retry_with_backoff_if(
            &self.retry,
            "get_result",
            RunnerError::is_transient,
            || self.client.get_result(&name, &self.namespace),
        )
        .await?
        .ok_or_else(|| RunnerError::ResultNotFound {
            name: name.clone(),
            namespace: self.namespace.clone(),
        })?;

        match result.verdict() {
            Some(verdict) => Ok(verdict.to_string()),
            None => {
                warn!(result = %name, "ChaosResult has no verdict yet");
                Ok(verdicts::AWAITED.to_string())
            }
        }
    }

    /// Record the final verdict of a finished experiment and return it
    pub async fn complete(&mut self, ctx: &ExperimentContext) -> Result<String, RunnerError> {
        let verdict = self.fetch_verdict(&ctx.name).await?;
        self.patch_status(StatusUpdate::completed(ctx, &verdict))
            .await?;
        info!(
            engine = %self.engine,
            experiment = %ctx.name,
            verdict = %verdict,
            "experiment completed"
        );
        Ok(verdict)
    }

    /// Apply the engine cleanup policy to a finished Job.
    ///
    /// Returns whether the Job was deleted.
    pub async fn apply_cleanup(
        &self,
        policy: CleanupPolicy,
        job_name: &str,
    ) -> Result<bool, RunnerError> {
        if !policy.should_delete() {
            debug!(job = %job_name, "retaining experiment job");
            return Ok(false);
        }
        self.client.delete_job(job_name, &self.namespace).await?;
        info!(job = %job_name, "experiment job deleted");
        Ok(true)
    }

    /// Set `status.engineStatus`
    pub async fn mark_engine_state(&self, state: EngineState) -> Result<(), RunnerError> {
        self.update_status(|status| {
            if status.engine_status == state {
                return Ok(false);
            }
            status.engine_status = state.clone();
            Ok(true)
        })
        .await
    }

    /// Versioned read-modify-write of the engine status.
    ///
    /// `mutate` returns whether it changed anything; an unchanged status is
    /// not written. Errors from `mutate` abort without writing. Write
    /// conflicts share the retry budget, so a budget of 0 re-reads until the
    /// write lands.
    async fn update_status<F>(&self, mut mutate: F) -> Result<(), RunnerError>
    where
        F: FnMut(&mut ChaosEngineStatus) -> Result<bool, RunnerError>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let engine = retry_with_backoff_if(
                &self.retry,
                "get_engine",
                RunnerError::is_transient,
                || self.client.get_engine(&self.engine, &self.namespace),
            )
            .await?
            .ok_or_else(|| RunnerError::EngineNotFound {
                name: self.engine.clone(),
                namespace: self.namespace.clone(),
            })?;

            let mut status = engine.status.clone().unwrap_or_default();
            if !mutate(&mut status)? {
                return Ok(());
            }

            let resource_version = engine.metadata.resource_version.clone();
            let write = retry_with_backoff_if(
                &self.retry,
                "write_engine_status",
                RunnerError::is_transient,
                || {
                    self.client.write_engine_status(
                        &self.engine,
                        &self.namespace,
                        resource_version.clone(),
                        &status,
                    )
                },
            )
            .await?;

            match write {
                StatusWrite::Applied => return Ok(()),
                StatusWrite::Conflict if self.retry.exhausted(attempt) => {
                    return Err(RunnerError::Conflict {
                        engine: self.engine.clone(),
                        attempts: attempt,
                    });
                }
                StatusWrite::Conflict => {
                    debug!(
                        engine = %self.engine,
                        attempt,
                        "engine changed during status update, re-reading"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockChaosKubeClient;
    use chaos_common::crd::{
        ChaosEngine, ChaosEngineSpec, ChaosResult, ChaosResultSpec, ChaosResultStatus,
        ResultExperimentStatus,
    };
    use std::sync::{Arc, Mutex};

    fn record(name: &str, status: &str) -> ExperimentStatus {
        ExperimentStatus {
            name: name.to_string(),
            runner: String::new(),
            experiment_pod: String::new(),
            status: status.to_string(),
            verdict: verdicts::WAIT_FOR_COMPLETION.to_string(),
            last_update_time: Utc::now(),
        }
    }

    fn engine_with(records: Vec<ExperimentStatus>, rv: &str) -> ChaosEngine {
        let mut engine = ChaosEngine::new("engine-nginx", ChaosEngineSpec::default());
        engine.metadata.namespace = Some("litmus".to_string());
        engine.metadata.resource_version = Some(rv.to_string());
        engine.status = Some(ChaosEngineStatus {
            engine_status: EngineState::Initialized,
            experiments: records,
        });
        engine
    }

    fn ctx() -> ExperimentContext {
        ExperimentContext {
            name: "pod-delete".to_string(),
            namespace: "litmus".to_string(),
            job_name: "pod-delete-x7kq2b".to_string(),
            ..Default::default()
        }
    }

    fn reconciler(mock: &MockChaosKubeClient) -> StatusReconciler<'_> {
        StatusReconciler::new(mock, "engine-nginx", "litmus", "runner-1", RetryConfig::no_retry())
    }

    #[tokio::test]
    async fn lookup_miss_performs_no_write() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine()
            .returning(|_, _| Ok(Some(engine_with(vec![record("cpu-hog", "Waiting")], "1"))));
        mock.expect_write_engine_status().never();

        let mut reconciler = reconciler(&mock);
        let err = reconciler
            .patch_status(StatusUpdate::waiting_for_job("pod-delete"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunnerError::StatusIndexNotFound { ref experiment, .. } if experiment == "pod-delete"
        ));
        assert!(err.is_desync());
        assert_eq!(reconciler.phase_of("pod-delete"), None);
    }

    #[tokio::test]
    async fn missing_engine_is_distinct_from_missing_record() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine().returning(|_, _| Ok(None));
        mock.expect_write_engine_status().never();

        let err = reconciler(&mock)
            .patch_status(StatusUpdate::waiting_for_job("pod-delete"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::EngineNotFound { .. }));
    }

    #[tokio::test]
    async fn patch_carries_resource_version_and_replaces_fields() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine().returning(|_, _| {
            Ok(Some(engine_with(
                vec![
                    record("pod-delete", "Waiting"),
                    record("pod-delete", "Waiting"),
                ],
                "42",
            )))
        });
        mock.expect_write_engine_status()
            .withf(|name, ns, rv, status| {
                name == "engine-nginx"
                    && ns == "litmus"
                    && rv.as_deref() == Some("42")
                    && status.experiments[0].status == "Running"
                    && status.experiments[0].verdict == "Awaited"
                    && status.experiments[0].experiment_pod == "pod-delete-x7kq2b"
                    && status.experiments[0].runner == "runner-1"
                    && status.experiments[1].status == "Waiting"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(StatusWrite::Applied));

        let mut reconciler = reconciler(&mock);
        reconciler
            .patch_status(StatusUpdate::running(&ctx()))
            .await
            .unwrap();
        assert_eq!(reconciler.phase_of("pod-delete"), Some(ExperimentPhase::Running));
    }

    #[tokio::test]
    async fn conflict_rereads_and_retries() {
        let reads = Arc::new(Mutex::new(0u32));
        let counter = reads.clone();

        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine().returning(move |_, _| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            Ok(Some(engine_with(vec![record("pod-delete", "Waiting")], &n.to_string())))
        });
        let mut seq = mockall::Sequence::new();
        mock.expect_write_engine_status()
            .withf(|_, _, rv, _| rv.as_deref() == Some("1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(StatusWrite::Conflict));
        mock.expect_write_engine_status()
            .withf(|_, _, rv, _| rv.as_deref() == Some("2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(StatusWrite::Applied));

        let mut reconciler = StatusReconciler::new(
            &mock,
            "engine-nginx",
            "litmus",
            "runner-1",
            RetryConfig::with_max_attempts(3),
        );
        reconciler
            .patch_status(StatusUpdate::waiting_for_job("pod-delete"))
            .await
            .unwrap();
        assert_eq!(*reads.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn persistent_conflict_gives_up() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine()
            .returning(|_, _| Ok(Some(engine_with(vec![record("pod-delete", "Waiting")], "1"))));
        mock.expect_write_engine_status()
            .times(2)
            .returning(|_, _, _, _| Ok(StatusWrite::Conflict));

        let mut reconciler = StatusReconciler::new(
            &mock,
            "engine-nginx",
            "litmus",
            "runner-1",
            RetryConfig::with_max_attempts(2),
        );
        let err = reconciler
            .patch_status(StatusUpdate::waiting_for_job("pod-delete"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Conflict { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn zero_budget_rereads_until_the_write_lands() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine()
            .times(5)
            .returning(|_, _| Ok(Some(engine_with(vec![record("pod-delete", "Waiting")], "1"))));
        let mut seq = mockall::Sequence::new();
        mock.expect_write_engine_status()
            .times(4)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(StatusWrite::Conflict));
        mock.expect_write_engine_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(StatusWrite::Applied));

        let mut reconciler = StatusReconciler::new(
            &mock,
            "engine-nginx",
            "litmus",
            "runner-1",
            RetryConfig::with_max_attempts(0),
        );
        reconciler
            .patch_status(StatusUpdate::waiting_for_job("pod-delete"))
            .await
            .unwrap();
        assert_eq!(reconciler.phase_of("pod-delete"), Some(ExperimentPhase::WaitingForJob));
    }

    #[tokio::test]
    async fn running_after_terminal_is_rejected() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine()
            .returning(|_, _| Ok(Some(engine_with(vec![record("pod-delete", "Waiting")], "1"))));
        mock.expect_write_engine_status()
            .times(2)
            .returning(|_, _, _, _| Ok(StatusWrite::Applied));

        let mut reconciler = reconciler(&mock);
        reconciler
            .patch_status(StatusUpdate::running(&ctx()))
            .await
            .unwrap();
        reconciler
            .patch_status(StatusUpdate::completed(&ctx(), "Pass"))
            .await
            .unwrap();

        let err = reconciler
            .patch_status(StatusUpdate::running(&ctx()))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::StatusRegression { .. }));
        assert_eq!(reconciler.phase_of("pod-delete"), Some(ExperimentPhase::Completed));
    }

    #[test]
    fn phase_ordering() {
        use ExperimentPhase::*;
        assert!(Waiting.can_advance_to(WaitingForJob));
        assert!(Running.can_advance_to(Running));
        assert!(WaitingForJob.can_advance_to(NotFound));
        assert!(!Running.can_advance_to(Waiting));
        assert!(!NotFound.can_advance_to(Running));
        assert!(!Completed.can_advance_to(Aborted));
        assert_eq!(NotFound.as_str(), "ChaosExperiment Not Found");
        assert_eq!(Completed.to_string(), "Execution Successful");
    }

    #[tokio::test]
    async fn initialize_appends_only_missing_names() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine().returning(|_, _| {
            Ok(Some(engine_with(vec![record("pod-delete", "Execution Successful")], "7")))
        });
        mock.expect_write_engine_status()
            .withf(|_, _, _, status| {
                status.experiments.len() == 2
                    && status.experiments[0].status == "Execution Successful"
                    && status.experiments[1].name == "cpu-hog"
                    && status.experiments[1].status == "Waiting"
                    && status.experiments[1].verdict == "Wait for Completion"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(StatusWrite::Applied));

        let mut reconciler = reconciler(&mock);
        reconciler
            .initialize(&["pod-delete".to_string(), "cpu-hog".to_string()])
            .await
            .unwrap();
        assert_eq!(reconciler.phase_of("cpu-hog"), Some(ExperimentPhase::Waiting));
    }

    #[tokio::test]
    async fn initialize_skips_write_when_nothing_is_missing() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine()
            .returning(|_, _| Ok(Some(engine_with(vec![record("pod-delete", "Waiting")], "1"))));
        mock.expect_write_engine_status().never();

        reconciler(&mock)
            .initialize(&["pod-delete".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn verdict_comes_from_named_result() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_result()
            .withf(|name, ns| name == "engine-nginx-pod-delete" && ns == "litmus")
            .returning(|name, _| {
                let mut result = ChaosResult::new(name, ChaosResultSpec::default());
                result.status = Some(ChaosResultStatus {
                    experiment_status: ResultExperimentStatus {
                        phase: "Completed".to_string(),
                        verdict: "Pass".to_string(),
                    },
                });
                Ok(Some(result))
            });

        assert_eq!(
            reconciler(&mock).fetch_verdict("pod-delete").await.unwrap(),
            "Pass"
        );
    }

    #[tokio::test]
    async fn missing_result_is_not_found() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_result().returning(|_, _| Ok(None));

        let err = reconciler(&mock)
            .fetch_verdict("pod-delete")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::ResultNotFound { ref name, .. } if name == "engine-nginx-pod-delete"
        ));
    }

    #[tokio::test]
    async fn cleanup_follows_policy() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_delete_job()
            .withf(|name, ns| name == "pod-delete-x7kq2b" && ns == "litmus")
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = reconciler(&mock);
        assert!(reconciler
            .apply_cleanup(CleanupPolicy::Delete, "pod-delete-x7kq2b")
            .await
            .unwrap());
        assert!(!reconciler
            .apply_cleanup(CleanupPolicy::Retain, "pod-delete-x7kq2b")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn engine_state_is_written_once() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_engine()
            .returning(|_, _| Ok(Some(engine_with(vec![], "1"))));
        mock.expect_write_engine_status()
            .withf(|_, _, _, status| status.engine_status == EngineState::Completed)
            .times(1)
            .returning(|_, _, _, _| Ok(StatusWrite::Applied));

        let reconciler = reconciler(&mock);
        reconciler
            .mark_engine_state(EngineState::Completed)
            .await
            .unwrap();
        reconciler
            .mark_engine_state(EngineState::Initialized)
            .await
            .unwrap();
    }
}
