//! Completion watch for a launched experiment
//!
//! The watcher polls on a fixed interval until the experiment finishes.
//! While it is observed running the status record is patched to
//! `Running`/`Awaited` on every tick. Each watch is bounded by
//! [`RunnerConfig::watch_timeout`] and stops early when the cancellation
//! token fires.
//!
//! Two completion signals are supported:
//! - [`WatchMode::Job`]: the Job's active count. Active means exactly one
//!   active pod; leaving that state after it was seen ends the watch.
//! - [`WatchMode::Pod`]: the experiment pod's phase and the termination
//!   reason of the experiment container.

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use chaos_common::retry::retry_with_backoff_if;

use crate::client::ChaosKubeClient;
use crate::config::{RunnerConfig, WatchMode};
use crate::error::RunnerError;
use crate::job::{active_count, is_job_finished};
use crate::resolver::ExperimentContext;
use crate::status::{StatusReconciler, StatusUpdate};

/// Container termination reason for a clean exit
const TERMINATED_COMPLETED: &str = "Completed";

/// Where a watched experiment is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchState {
    /// Submitted, not yet observed running
    Waiting,
    /// Observed running at least once
    Running,
    /// Finished, successfully or not
    Completed,
}

/// What a single poll saw
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Observation {
    Pending,
    Active,
    Finished,
}

impl WatchState {
    fn next(self, observation: Observation) -> Self {
        match (self, observation) {
            (_, Observation::Finished) => Self::Completed,
            (_, Observation::Active) => Self::Running,
            (Self::Running, Observation::Pending) => Self::Completed,
            (state, Observation::Pending) => state,
        }
    }
}

fn observe_job(job: &Job) -> Observation {
    if active_count(job) == 1 {
        Observation::Active
    } else if is_job_finished(job) {
        Observation::Finished
    } else {
        Observation::Pending
    }
}

fn observe_pod(pod: &Pod, container: &str) -> Observation {
    let Some(status) = pod.status.as_ref() else {
        return Observation::Pending;
    };
    let phase = status.phase.as_deref().unwrap_or_default();

    let container_completed = status
        .container_statuses
        .as_ref()
        .and_then(|cs| cs.iter().find(|c| c.name == container))
        .and_then(|c| c.state.as_ref())
        .and_then(|s| s.terminated.as_ref())
        .is_some_and(|t| t.reason.as_deref() == Some(TERMINATED_COMPLETED));

    match phase {
        "Failed" => Observation::Finished,
        "Running" if container_completed => Observation::Finished,
        "Succeeded" => Observation::Finished,
        "Running" => Observation::Active,
        _ => Observation::Pending,
    }
}

async fn poll(
    client: &dyn ChaosKubeClient,
    ctx: &ExperimentContext,
    config: &RunnerConfig,
    mode: WatchMode,
) -> Result<Observation, RunnerError> {
    match mode {
        WatchMode::Job => {
            let job = retry_with_backoff_if(
                &config.status_retry,
                "get_job",
                RunnerError::is_transient,
                || client.get_job(&ctx.job_name, &ctx.namespace),
            )
            .await?
            .ok_or_else(|| RunnerError::JobNotFound {
                name: ctx.job_name.clone(),
                namespace: ctx.namespace.clone(),
            })?;
            Ok(observe_job(&job))
        }
        WatchMode::Pod => {
            let pods = retry_with_backoff_if(
                &config.status_retry,
                "list_job_pods",
                RunnerError::is_transient,
                || client.list_job_pods(&ctx.job_name, &ctx.namespace),
            )
            .await?;
            Ok(pods
                .first()
                .map(|pod| observe_pod(pod, &ctx.name))
                .unwrap_or(Observation::Pending))
        }
    }
}

async fn watch_with(
    client: &dyn ChaosKubeClient,
    reconciler: &mut StatusReconciler<'_>,
    ctx: &ExperimentContext,
    config: &RunnerConfig,
    mode: WatchMode,
    cancel: &CancellationToken,
) -> Result<WatchState, RunnerError> {
    let deadline = Instant::now() + config.watch_timeout;
    let mut state = WatchState::Waiting;

    loop {
        let observation = poll(client, ctx, config, mode).await?;
        state = state.next(observation);
        debug!(job = %ctx.job_name, ?observation, ?state, "polled experiment");

        match state {
            WatchState::Completed => {
                info!(experiment = %ctx.name, job = %ctx.job_name, "experiment job finished");
                return Ok(state);
            }
            WatchState::Running if observation == Observation::Active => {
                reconciler.patch_status(StatusUpdate::running(ctx)).await?;
            }
            _ => {}
        }

        if Instant::now() >= deadline {
            return Err(RunnerError::WatchTimeout {
                job: ctx.job_name.clone(),
                timeout: config.watch_timeout,
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RunnerError::Cancelled { job: ctx.job_name.clone() });
            }
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }
}

/// Watch the Job's active count until it leaves the running state
pub async fn watch_job(
    client: &dyn ChaosKubeClient,
    reconciler: &mut StatusReconciler<'_>,
    ctx: &ExperimentContext,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<WatchState, RunnerError> {
    watch_with(client, reconciler, ctx, config, WatchMode::Job, cancel).await
}

/// Watch the experiment pod until its container terminates
pub async fn watch_pod(
    client: &dyn ChaosKubeClient,
    reconciler: &mut StatusReconciler<'_>,
    ctx: &ExperimentContext,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<WatchState, RunnerError> {
    watch_with(client, reconciler, ctx, config, WatchMode::Pod, cancel).await
}

/// Watch using the configured completion signal
pub async fn watch_completion(
    client: &dyn ChaosKubeClient,
    reconciler: &mut StatusReconciler<'_>,
    ctx: &ExperimentContext,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<WatchState, RunnerError> {
    watch_with(client, reconciler, ctx, config, config.watch_mode, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chaos_common::crd::{ChaosEngine, ChaosEngineSpec, ChaosEngineStatus, ExperimentStatus};
    use chaos_common::retry::RetryConfig;
    use chrono::Utc;
    use k8s_openapi::api::batch::v1::JobStatus;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStatus, PodStatus,
    };

    use crate::client::{MockChaosKubeClient, StatusWrite};

    fn ctx() -> ExperimentContext {
        ExperimentContext {
            name: "pod-delete".to_string(),
            namespace: "litmus".to_string(),
            job_name: "pod-delete-x7kq2b".to_string(),
            ..Default::default()
        }
    }

    fn config() -> RunnerConfig {
        RunnerConfig {
            poll_interval: Duration::from_secs(5),
            watch_timeout: Duration::from_secs(60),
            status_retry: RetryConfig::no_retry(),
            ..Default::default()
        }
    }

    fn job(active: Option<i32>) -> Job {
        Job {
            status: Some(JobStatus {
                active,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn engine() -> ChaosEngine {
        let mut engine = ChaosEngine::new("engine-nginx", ChaosEngineSpec::default());
        engine.metadata.resource_version = Some("1".to_string());
        engine.status = Some(ChaosEngineStatus {
            experiments: vec![ExperimentStatus {
                name: "pod-delete".to_string(),
                runner: String::new(),
                experiment_pod: String::new(),
                status: "Waiting for Job Creation".to_string(),
                verdict: "Waiting".to_string(),
                last_update_time: Utc::now(),
            }],
            ..Default::default()
        });
        engine
    }

    fn reconciler(mock: &MockChaosKubeClient) -> StatusReconciler<'_> {
        StatusReconciler::new(mock, "engine-nginx", "litmus", "runner", RetryConfig::no_retry())
    }

    /// Mock whose Job reports the given active counts, one per poll
    fn mock_with_active_counts(
        counts: Vec<Option<i32>>,
        running_patches: usize,
    ) -> MockChaosKubeClient {
        let counts = Arc::new(Mutex::new(counts.into_iter()));
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_job()
            .returning(move |_, _| Ok(Some(job(counts.lock().unwrap().next().flatten()))));
        mock.expect_get_engine()
        .returning(|_, _| Ok(Some(engine())));
        mock.expect_write_engine_status()
            .withf(|_, _, _, status| status.experiments[0].status == "Running")
            .times(running_patches)
            .returning(|_, _, _, _| Ok(StatusWrite::Applied));
        mock
    }

    #[tokio::test(start_paused = true)]
    async fn three_active_polls_issue_three_running_patches() {
        let mock = mock_with_active_counts(vec![Some(1), Some(1), Some(1), Some(0)], 3);
        let mut reconciler = reconciler(&mock);

        let state = watch_job(&mock, &mut reconciler, &ctx(), &config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(state, WatchState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn job_not_yet_active_keeps_waiting() {
        let mock = mock_with_active_counts(vec![None, Some(0), Some(1), None], 1);
        let mut reconciler = reconciler(&mock);

        let state = watch_job(&mock, &mut reconciler, &ctx(), &config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(state, WatchState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_gives_up_at_deadline() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_job().returning(|_, _| Ok(Some(job(None))));
        mock.expect_write_engine_status().never();
        let mut reconciler = reconciler(&mock);

        let err = watch_job(&mock, &mut reconciler, &ctx(), &config(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::WatchTimeout { timeout, .. } if timeout == Duration::from_secs(60)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_watch() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_job().returning(|_, _| Ok(Some(job(None))));
        let mut reconciler = reconciler(&mock);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = watch_job(&mock, &mut reconciler, &ctx(), &config(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn vanished_job_is_an_error() {
        let mut mock = MockChaosKubeClient::new();
        mock.expect_get_job().returning(|_, _| Ok(None));
        let mut reconciler = reconciler(&mock);

        let err = watch_job(&mock, &mut reconciler, &ctx(), &config(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::JobNotFound { .. }));
    }

    fn pod(phase: &str, terminated_reason: Option<&str>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "pod-delete".to_string(),
                    state: terminated_reason.map(|reason| ContainerState {
                        terminated: Some(ContainerStateTerminated {
                            reason: Some(reason.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pod_observations() {
        assert_eq!(
            observe_pod(&pod("Pending", None), "pod-delete"),
            Observation::Pending
        );
        assert_eq!(
            observe_pod(&pod("Running", None), "pod-delete"),
            Observation::Active
        );
        assert_eq!(
            observe_pod(&pod("Running", Some("Completed")), "pod-delete"),
            Observation::Finished
        );
        assert_eq!(
            observe_pod(&pod("Succeeded", Some("Completed")), "pod-delete"),
            Observation::Finished
        );
        assert_eq!(
            observe_pod(&pod("Failed", Some("Error")), "pod-delete"),
            Observation::Finished
        );
        assert_eq!(
            observe_pod(&pod("Running", Some("Completed")), "other-container"),
            Observation::Active
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pod_watch_ends_on_completed_container() {
        let pods = Arc::new(Mutex::new(
            vec![
                vec![],
                vec![pod("Running", None)],
                vec![pod("Succeeded", Some("Completed"))],
            ]
            .into_iter(),
        ));
        let mut mock = MockChaosKubeClient::new();
        mock.expect_list_job_pods()
            .withf(|job, ns| job == "pod-delete-x7kq2b" && ns == "litmus")
            .returning(move |_, _| Ok(pods.lock().unwrap().next().unwrap_or_default()));
        mock.expect_get_engine()
        .returning(|_, _| Ok(Some(engine())));
        mock.expect_write_engine_status()
            .times(1)
            .returning(|_, _, _, _| Ok(StatusWrite::Applied));
        let mut reconciler = reconciler(&mock);

        let state = watch_pod(&mock, &mut reconciler, &ctx(), &config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(state, WatchState::Completed);
    }

    #[test]
    fn state_transitions() {
        use Observation::*;
        assert_eq!(WatchState::Waiting.next(Pending), WatchState::Waiting);
        assert_eq!(WatchState::Waiting.next(Active), WatchState::Running);
        assert_eq!(WatchState::Running.next(Active), WatchState::Running);
        assert_eq!(WatchState::Running.next(Pending), WatchState::Completed);
        assert_eq!(WatchState::Waiting.next(Finished), WatchState::Completed);
    }
}
