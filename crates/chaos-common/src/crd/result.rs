//! ChaosResult CRD types
//!
//! Written by the experiment itself; the runner only reads the verdict.
//! Results are named `{engine}-{experiment}`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the ChaosResult produced by `experiment` under `engine`
pub fn result_name(engine: &str, experiment: &str) -> String {
    format!("{}-{}", engine, experiment)
}

/// Reference back to the engine and experiment that produced a result
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "litmuschaos.io",
    version = "v1alpha1",
    kind = "ChaosResult",
    plural = "chaosresults",
    namespaced,
    status = "ChaosResultStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosResultSpec {
    /// Engine that ran the experiment
    #[serde(default)]
    pub engine: String,
    /// Experiment name
    #[serde(default)]
    pub experiment: String,
}

/// Outcome reported by the experiment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultExperimentStatus {
    /// Experiment phase (Running, Completed, Stopped)
    #[serde(default)]
    pub phase: String,
    /// Verdict (Awaited, Pass, Fail, Stopped)
    #[serde(default)]
    pub verdict: String,
}

/// Status of a ChaosResult
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChaosResultStatus {
    /// Experiment outcome
    #[serde(default)]
    pub experiment_status: ResultExperimentStatus,
}

impl ChaosResult {
    /// Verdict string, if the experiment has reported one
    pub fn verdict(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.experiment_status.verdict.as_str())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_name_joins_engine_and_experiment() {
        assert_eq!(
            result_name("engine-nginx", "pod-delete"),
            "engine-nginx-pod-delete"
        );
    }

    #[test]
    fn verdict_is_none_until_reported() {
        let mut result = ChaosResult::new("e-x", ChaosResultSpec::default());
        assert_eq!(result.verdict(), None);

        result.status = Some(ChaosResultStatus::default());
        assert_eq!(result.verdict(), None);

        result.status = Some(ChaosResultStatus {
            experiment_status: ResultExperimentStatus {
                phase: "Completed".to_string(),
                verdict: "Pass".to_string(),
            },
        });
        assert_eq!(result.verdict(), Some("Pass"));
    }
}
