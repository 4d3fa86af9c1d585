//! ChaosExperiment CRD types
//!
//! A `ChaosExperiment` is the reusable template for one kind of chaos action.
//! Its `definition` supplies the defaults the runner starts from before
//! applying engine overrides.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::EnvVar;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::engine::SecurityContextSpec;

/// ConfigMap to mount into the experiment pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapRef {
    /// ConfigMap name
    #[serde(default)]
    pub name: String,
    /// Path the ConfigMap is mounted at
    #[serde(default)]
    pub mount_path: String,
}

/// Secret to mount into the experiment pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Secret name
    #[serde(default)]
    pub name: String,
    /// Path the Secret is mounted at
    #[serde(default)]
    pub mount_path: String,
}

/// Host path to mount into the experiment pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostFileRef {
    /// Volume name
    #[serde(default)]
    pub name: String,
    /// Path inside the container
    #[serde(default)]
    pub mount_path: String,
    /// Path on the node
    #[serde(default)]
    pub node_path: String,
}

/// Default runtime definition of an experiment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentDef {
    /// Experiment image
    #[serde(default)]
    pub image: String,

    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Container command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Container args
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Labels added to the experiment pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Default env entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// ConfigMaps to mount
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_maps: Vec<ConfigMapRef>,

    /// Secrets to mount
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretRef>,

    /// Host paths to mount
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_file_volumes: Vec<HostFileRef>,

    /// Default security contexts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContextSpec>,

    /// Run the pod in the host PID namespace
    #[serde(default, rename = "hostPID")]
    pub host_pid: bool,
}

/// Reusable template for one kind of chaos action
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "litmuschaos.io",
    version = "v1alpha1",
    kind = "ChaosExperiment",
    plural = "chaosexperiments",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentSpec {
    /// Runtime defaults
    #[serde(default)]
    pub definition: ExperimentDef,
}
