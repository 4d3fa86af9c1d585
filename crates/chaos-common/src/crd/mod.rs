//! Custom Resource Definitions read and written by the chaos runner

mod engine;
mod experiment;
mod result;

pub use engine::{
    ApplicationParams, ChaosEngine, ChaosEngineSpec, ChaosEngineStatus, CleanupPolicy,
    EngineState, ExperimentAttributes, ExperimentComponents, ExperimentList, ExperimentStatus,
    SecurityContextSpec, StatusCheckTimeout,
};
pub use experiment::{
    ChaosExperiment, ChaosExperimentSpec, ConfigMapRef, ExperimentDef, HostFileRef, SecretRef,
};
pub use result::{
    result_name, ChaosResult, ChaosResultSpec, ChaosResultStatus, ResultExperimentStatus,
};
