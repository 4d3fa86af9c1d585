//! ConfigMap, Secret and host-path dependencies of an experiment
//!
//! ConfigMaps and Secrets come from the experiment definition, but an engine
//! override list of the same kind replaces the definition's list wholesale
//! when it is non-empty. Host-file volumes only come from the definition.
//!
//! Every declared entry is checked for shape first; existence in the
//! experiment namespace is checked only once all entries are well formed.

use tracing::{debug, warn};

use chaos_common::crd::{ConfigMapRef, ExperimentComponents, ExperimentDef, HostFileRef, SecretRef};
use chaos_common::retry::{retry_with_backoff_if, RetryConfig};

use crate::client::ChaosKubeClient;
use crate::error::RunnerError;

/// Where a mounted volume comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountSource {
    /// ConfigMap of the same name
    ConfigMap,
    /// Secret of the same name
    Secret,
    /// Path on the node the experiment pod lands on
    HostPath(String),
}

/// A validated volume to mount into the experiment container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountDescriptor {
    /// Name of the ConfigMap, Secret or host-file entry
    pub name: String,
    /// Path inside the experiment container
    pub mount_path: String,
    /// Backing volume source
    pub source: MountSource,
}

impl MountDescriptor {
    /// Pod volume name. Kinds are prefixed so a ConfigMap and a Secret with
    /// the same name do not collide.
    pub fn volume_name(&self) -> String {
        let prefix = match self.source {
            MountSource::ConfigMap => "cm",
            MountSource::Secret => "secret",
            MountSource::HostPath(_) => "host",
        };
        format!("{}-{}", prefix, self.name)
    }
}

/// All mounts of one experiment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mounts {
    /// ConfigMap volumes
    pub config_maps: Vec<MountDescriptor>,
    /// Secret volumes
    pub secrets: Vec<MountDescriptor>,
    /// Host-path volumes
    pub host_files: Vec<MountDescriptor>,
}

impl Mounts {
    /// Every descriptor, ConfigMaps first
    pub fn iter(&self) -> impl Iterator<Item = &MountDescriptor> {
        self.config_maps
            .iter()
            .chain(self.secrets.iter())
            .chain(self.host_files.iter())
    }
}

/// ConfigMap and Secret lists after applying the engine override
fn effective_lists<'a>(
    definition: &'a ExperimentDef,
    overrides: Option<&'a ExperimentComponents>,
) -> (&'a [ConfigMapRef], &'a [SecretRef]) {
    let config_maps = match overrides {
        Some(o) if !o.config_maps.is_empty() => &o.config_maps,
        _ => &definition.config_maps,
    };
    let secrets = match overrides {
        Some(o) if !o.secrets.is_empty() => &o.secrets,
        _ => &definition.secrets,
    };
    (config_maps, secrets)
}

fn require(kind: &str, entry: &str, field: &str, value: &str) -> Result<(), RunnerError> {
    if value.trim().is_empty() {
        let label = if entry.is_empty() { "<unnamed>" } else { entry };
        return Err(chaos_common::Error::validation_for_field(
            label,
            field,
            format!("{kind} '{label}' has an empty {field}"),
        )
        .into());
    }
    Ok(())
}

fn validate_config_map(r: &ConfigMapRef) -> Result<MountDescriptor, RunnerError> {
    require("ConfigMap", &r.name, "name", &r.name)?;
    require("ConfigMap", &r.name, "mountPath", &r.mount_path)?;
    Ok(MountDescriptor {
        name: r.name.clone(),
        mount_path: r.mount_path.clone(),
        source: MountSource::ConfigMap,
    })
}

fn validate_secret(r: &SecretRef) -> Result<MountDescriptor, RunnerError> {
    require("Secret", &r.name, "name", &r.name)?;
    require("Secret", &r.name, "mountPath", &r.mount_path)?;
    Ok(MountDescriptor {
        name: r.name.clone(),
        mount_path: r.mount_path.clone(),
        source: MountSource::Secret,
    })
}

fn validate_host_file(r: &HostFileRef) -> Result<MountDescriptor, RunnerError> {
    require("host file volume", &r.name, "name", &r.name)?;
    require("host file volume", &r.name, "mountPath", &r.mount_path)?;
    require("host file volume", &r.name, "nodePath", &r.node_path)?;
    Ok(MountDescriptor {
        name: r.name.clone(),
        mount_path: r.mount_path.clone(),
        source: MountSource::HostPath(r.node_path.clone()),
    })
}

/// Validate declared mounts without touching the cluster
pub fn declared_mounts(
    definition: &ExperimentDef,
    overrides: Option<&ExperimentComponents>,
) -> Result<Mounts, RunnerError> {
    let (config_maps, secrets) = effective_lists(definition, overrides);
    Ok(Mounts {
        config_maps: config_maps
            .iter()
            .map(validate_config_map)
            .collect::<Result<_, _>>()?,
        secrets: secrets
            .iter()
            .map(validate_secret)
            .collect::<Result<_, _>>()?,
        host_files: definition
            .host_file_volumes
            .iter()
            .map(validate_host_file)
            .collect::<Result<_, _>>()?,
    })
}

/// Validate and resolve every mount an experiment needs.
///
/// Returns [`RunnerError::MissingDependency`] for the first ConfigMap or
/// Secret that does not exist in `namespace`. Transient lookup failures are
/// retried under `retry`. Host paths are not checked; they live on whichever
/// node the pod is scheduled to.
pub async fn patch_dependencies(
    client: &dyn ChaosKubeClient,
    namespace: &str,
    experiment: &str,
    definition: &ExperimentDef,
    overrides: Option<&ExperimentComponents>,
    retry: &RetryConfig,
) -> Result<Mounts, RunnerError> {
    let mounts = declared_mounts(definition, overrides).inspect_err(|e| {
        warn!(experiment = %experiment, error = %e, "malformed experiment dependency");
    })?;

    for mount in mounts.config_maps.iter().chain(&mounts.secrets) {
        let (kind, operation) = match mount.source {
            MountSource::ConfigMap => ("ConfigMap", "config_map_exists"),
            _ => ("Secret", "secret_exists"),
        };
        let exists = retry_with_backoff_if(retry, operation, RunnerError::is_transient, || async {
            match mount.source {
                MountSource::ConfigMap => client.config_map_exists(&mount.name, namespace).await,
                _ => client.secret_exists(&mount.name, namespace).await,
            }
        })
        .await?;
        if !exists {
            return Err(RunnerError::MissingDependency {
                kind,
                name: mount.name.clone(),
                namespace: namespace.to_string(),
            });
        }
    }

    debug!(
        experiment = %experiment,
        config_maps = mounts.config_maps.len(),
        secrets = mounts.secrets.len(),
        host_files = mounts.host_files.len(),
        "experiment dependencies validated"
    );
    Ok(mounts)
}
