//! Chaos runner: runs the experiments of one ChaosEngine activation
//!
//! Each experiment listed on the engine is resolved against its
//! ChaosExperiment definition, launched as a batch Job, watched to completion
//! and reconciled back onto the engine's `status.experiments` array.

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod dependencies;
pub mod engine;
pub mod error;
pub mod events;
pub mod job;
pub mod resolver;
pub mod runner;
pub mod status;
pub mod watcher;

pub use client::{ChaosKubeClient, KubeChaosClient};
pub use config::{FailurePolicy, RunnerConfig, WatchMode};
pub use engine::EngineContext;
pub use error::RunnerError;
pub use runner::{ExperimentOutcome, RunSummary, Runner};
