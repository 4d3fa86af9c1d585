//! Kubernetes Events recorded on the ChaosEngine
//!
//! Each step of an experiment's lifecycle is reported as an Event on the
//! engine so `kubectl describe chaosengine` shows the run's progress.
//! Publishing never fails the caller: errors are logged and dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

/// Event reason strings, shown under REASON in `kubectl get events`
pub mod reasons {
    /// ConfigMap/Secret dependencies checked
    pub const DEPENDENCY_CHECK: &str = "ExperimentDependencyCheck";
    /// Experiment Job submitted
    pub const JOB_CREATE: &str = "ExperimentJobCreate";
    /// Experiment stopped before producing a verdict
    pub const SKIPPED: &str = "ExperimentSkipped";
    /// No ChaosExperiment definition for a listed name
    pub const NOT_FOUND: &str = "ExperimentNotFound";
    /// Cleanup policy applied to a finished Job
    pub const JOB_CLEANUP: &str = "ExperimentJobCleanUp";
    /// Verdict recorded
    pub const SUMMARY: &str = "SummaryEvent";
}

/// Event action strings, shown under ACTION in `kubectl get events`
pub mod actions {
    /// Resolving and validating before launch
    pub const PREPARE: &str = "Prepare";
    /// Submitting the Job
    pub const LAUNCH: &str = "Launch";
    /// Writing results back to the engine
    pub const RECONCILE: &str = "Reconcile";
    /// Removing or retaining the Job
    pub const CLEANUP: &str = "CleanUp";
}

/// A lifecycle step of one experiment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExperimentEvent {
    /// Every declared ConfigMap and Secret exists
    DependenciesReady {
        /// Experiment name
        experiment: String,
    },
    /// A dependency was malformed or missing
    DependencyCheckFailed {
        /// Experiment name
        experiment: String,
        /// What was wrong
        error: String,
    },
    /// The experiment Job was submitted
    JobCreated {
        /// Experiment name
        experiment: String,
        /// Job name
        job: String,
    },
    /// The experiment has no ChaosExperiment definition
    NotFound {
        /// Experiment name
        experiment: String,
    },
    /// The experiment failed and was abandoned
    Skipped {
        /// Experiment name
        experiment: String,
        /// Failure that stopped it
        error: String,
    },
    /// The experiment's verdict was recorded
    Summary {
        /// Experiment name
        experiment: String,
        /// Verdict from the ChaosResult
        verdict: String,
    },
    /// The cleanup policy was applied to a finished Job
    JobCleanedUp {
        /// Job name
        job: String,
        /// Whether the Job was deleted rather than retained
        deleted: bool,
    },
}

impl ExperimentEvent {
    /// `Warning` for failures, `Normal` otherwise
    pub fn type_(&self) -> EventType {
        match self {
            Self::DependencyCheckFailed { .. } | Self::NotFound { .. } | Self::Skipped { .. } => {
                EventType::Warning
            }
            _ => EventType::Normal,
        }
    }

    /// One of [`reasons`]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::DependenciesReady { .. } | Self::DependencyCheckFailed { .. } => {
                reasons::DEPENDENCY_CHECK
            }
            Self::JobCreated { .. } => reasons::JOB_CREATE,
            Self::NotFound { .. } => reasons::NOT_FOUND,
            Self::Skipped { .. } => reasons::SKIPPED,
            Self::Summary { .. } => reasons::SUMMARY,
            Self::JobCleanedUp { .. } => reasons::JOB_CLEANUP,
        }
    }

    /// One of [`actions`]
    pub fn action(&self) -> &'static str {
        match self {
            Self::DependenciesReady { .. }
            | Self::DependencyCheckFailed { .. }
            | Self::NotFound { .. }
            | Self::Skipped { .. } => actions::PREPARE,
            Self::JobCreated { .. } => actions::LAUNCH,
            Self::Summary { .. } => actions::RECONCILE,
            Self::JobCleanedUp { .. } => actions::CLEANUP,
        }
    }

    /// Human readable message
    pub fn note(&self) -> String {
        match self {
            Self::DependenciesReady { experiment } => {
                format!("Dependencies of experiment {experiment} are available")
            }
            Self::DependencyCheckFailed { experiment, error } => {
                format!(
                    "Dependency check of experiment {experiment} failed: {error}"
                )
            }
            Self::JobCreated { experiment, job } => {
                format!("Experiment Job {job} for {experiment} created")
            }
            Self::NotFound { experiment } => {
                format!("ChaosExperiment {experiment} not found, skipping it")
            }
            Self::Skipped { experiment, error } => {
                format!("Experiment {experiment} skipped: {error}")
            }
            Self::Summary {
                experiment,
                verdict,
            } => format!("Experiment {experiment} finished with verdict {verdict}"),
            Self::JobCleanedUp { job, deleted } => {
                let outcome = if *deleted { "deleted" } else { "retained" };
                format!("Experiment Job {job} {outcome}")
            }
        }
    }
}

/// Sink for experiment lifecycle events
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record `event` on the engine behind `engine_ref`
    async fn publish(&self, engine_ref: &ObjectReference, event: ExperimentEvent);
}

/// Publishes through `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Report as `component`, optionally naming this runner instance
    pub fn new(client: Client, component: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: component.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, engine_ref: &ObjectReference, event: ExperimentEvent) {
        let reason = event.reason();
        let record = Event {
            type_: event.type_(),
            reason: reason.to_string(),
            note: Some(event.note()),
            action: event.action().to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&record, engine_ref).await {
            warn!(reason, error = %e, "failed to publish engine event");
        }
    }
}

/// Drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _engine_ref: &ObjectReference, _event: ExperimentEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_warnings() {
        let failed = ExperimentEvent::DependencyCheckFailed {
            experiment: "pod-delete".to_string(),
            error: "ConfigMap 'cm1' not found in namespace litmus".to_string(),
        };
        assert_eq!(failed.type_(), EventType::Warning);
        assert_eq!(failed.reason(), "ExperimentDependencyCheck");
        assert!(failed.note().contains("cm1"));

        let ready = ExperimentEvent::DependenciesReady {
            experiment: "pod-delete".to_string(),
        };
        assert_eq!(ready.type_(), EventType::Normal);
        assert_eq!(ready.reason(), failed.reason());
    }

    #[test]
    fn cleanup_note_reflects_decision() {
        let deleted = ExperimentEvent::JobCleanedUp {
            job: "pod-delete-x7kq2b".to_string(),
            deleted: true,
        };
        let retained = ExperimentEvent::JobCleanedUp {
            job: "pod-delete-x7kq2b".to_string(),
            deleted: false,
        };
        assert_eq!(deleted.note(), "Experiment Job pod-delete-x7kq2b deleted");
        assert_eq!(retained.note(), "Experiment Job pod-delete-x7kq2b retained");
        assert_eq!(deleted.action(), actions::CLEANUP);
    }

    #[test]
    fn summary_carries_verdict() {
        let summary = ExperimentEvent::Summary {
            experiment: "pod-delete".to_string(),
            verdict: "Pass".to_string(),
        };
        assert_eq!(summary.reason(), reasons::SUMMARY);
        assert_eq!(summary.action(), actions::RECONCILE);
        assert!(summary.note().ends_with("Pass"));
    }

    #[tokio::test]
    async fn noop_publisher_accepts_events() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                ExperimentEvent::NotFound {
                    experiment: "pod-delete".to_string(),
                },
            )
            .await;
    }
}
