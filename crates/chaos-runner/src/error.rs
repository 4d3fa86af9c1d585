//! Runner-specific error types

use std::time::Duration;

/// Errors raised while running an engine's experiments
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The ChaosEngine being run is gone
    #[error("ChaosEngine {namespace}/{name} not found")]
    EngineNotFound {
        /// Engine name
        name: String,
        /// Engine namespace
        namespace: String,
    },

    /// An experiment listed on the engine has no ChaosExperiment definition
    #[error("ChaosExperiment {namespace}/{name} not found")]
    ExperimentNotFound {
        /// Experiment name
        name: String,
        /// Namespace the definition was looked up in
        namespace: String,
    },

    /// The experiment finished without leaving a ChaosResult
    #[error("ChaosResult {namespace}/{name} not found")]
    ResultNotFound {
        /// Result name, `<engine>-<experiment>`
        name: String,
        /// Result namespace
        namespace: String,
    },

    /// A ConfigMap or Secret the experiment mounts does not exist
    #[error("{kind} '{name}' not found in namespace {namespace}")]
    MissingDependency {
        /// `ConfigMap` or `Secret`
        kind: &'static str,
        /// Name of the missing object
        name: String,
        /// Namespace it was expected in
        namespace: String,
    },

    /// The experiment Job disappeared while being watched
    #[error("job {namespace}/{name} not found")]
    JobNotFound {
        /// Job name
        name: String,
        /// Job namespace
        namespace: String,
    },

    /// The engine exists but carries no status record for a known experiment.
    /// Means the initial status write was skipped or lost to a racing writer.
    #[error("status record for experiment '{experiment}' not found on ChaosEngine {engine}")]
    StatusIndexNotFound {
        /// Engine name
        engine: String,
        /// Experiment without a record
        experiment: String,
    },

    /// A write would move a status record backwards
    #[error("experiment '{experiment}' cannot move from '{from}' to '{to}'")]
    StatusRegression {
        /// Experiment whose record was being written
        experiment: String,
        /// Phase already recorded
        from: String,
        /// Phase that was rejected
        to: String,
    },

    /// Every status write attempt lost to a concurrent writer
    #[error(
        "conflicting writes to ChaosEngine {engine} status persisted after {attempts} attempts"
    )]
    Conflict {
        /// Engine name
        engine: String,
        /// Writes attempted
        attempts: u32,
    },

    /// The watch deadline passed before the Job finished
    #[error("timed out after {timeout:?} waiting for job {job}")]
    WatchTimeout {
        /// Job being watched
        job: String,
        /// Watch bound that elapsed
        timeout: Duration,
    },

    /// The run was cancelled mid-experiment
    #[error("watch of job {job} cancelled")]
    Cancelled {
        /// Job being watched or settled
        job: String,
    },

    /// The API server refused the experiment Job
    #[error("failed to create job {job}: {source}")]
    Launch {
        /// Job name
        job: String,
        /// Create error
        source: kube::Error,
    },

    /// Any other API failure
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation, parsing and serialization errors from `chaos-common`
    #[error("{0}")]
    Common(#[from] chaos_common::Error),
}

impl RunnerError {
    /// A retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Kube(e) => chaos_common::kube_utils::is_transient(e),
            Self::Common(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The error points at a bug or a lost status write rather than at user input
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            Self::StatusIndexNotFound { .. } | Self::StatusRegression { .. }
        )
    }

    /// Malformed experiment or engine input
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Common(chaos_common::Error::Validation { .. }))
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Common(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: String::new(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn transient_classification() {
        assert!(RunnerError::Kube(api_error(503)).is_transient());
        assert!(!RunnerError::Kube(api_error(404)).is_transient());
        assert!(!RunnerError::ExperimentNotFound {
            name: "x".into(),
            namespace: "y".into()
        }
        .is_transient());
    }

    #[test]
    fn desync_is_distinct_from_engine_not_found() {
        let desync = RunnerError::StatusIndexNotFound {
            engine: "e".into(),
            experiment: "pod-delete".into(),
        };
        let missing = RunnerError::EngineNotFound {
            name: "e".into(),
            namespace: "default".into(),
        };
        assert!(desync.is_desync());
        assert!(!missing.is_desync());
        assert!(desync.to_string().contains("pod-delete"));
    }

    #[test]
    fn missing_dependency_names_the_resource() {
        let err = RunnerError::MissingDependency {
            kind: "ConfigMap",
            name: "cm1".into(),
            namespace: "litmus".into(),
        };
        assert_eq!(
            err.to_string(),
            "ConfigMap 'cm1' not found in namespace litmus"
        );
    }

    #[test]
    fn validation_errors_are_recognised() {
        let err: RunnerError =
            chaos_common::Error::validation_for("cm1", "empty mount path").into();
        assert!(err.is_validation());
        assert!(!err.is_transient());
    }
}
