//! Common types for the chaos runner: CRDs, errors, and Kubernetes utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Annotation a target must carry when the engine's annotation check is on
pub const CHAOS_ANNOTATION_KEY: &str = "litmuschaos.io/chaos";

/// Label key carrying the engine UID on every generated resource
pub const CHAOS_UID_LABEL: &str = "chaosUID";

/// Field manager used for all writes made by the runner
pub const FIELD_MANAGER: &str = "chaos-runner";
