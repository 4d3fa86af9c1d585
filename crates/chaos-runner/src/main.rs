//! chaos-runner - runs the experiments of one ChaosEngine activation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::CustomResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chaos_common::crd::{ChaosEngine, ChaosExperiment, ChaosResult};
use chaos_common::kube_utils::create_client;
use chaos_common::retry::RetryConfig;
use chaos_common::telemetry::{init_logging, LogFormat, TelemetryConfig};

use chaos_runner::events::KubeEventPublisher;
use chaos_runner::{EngineContext, FailurePolicy, KubeChaosClient, Runner, RunnerConfig, WatchMode};

/// Runs the experiments of a ChaosEngine as batch Jobs and reconciles their status
#[derive(Parser, Debug)]
#[command(name = "chaos-runner", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// ChaosEngine to run
    #[arg(long, env = "CHAOSENGINE", required_unless_present = "crd")]
    engine: Option<String>,

    /// Namespace of the ChaosEngine and its experiments
    #[arg(long, env = "CHAOS_NAMESPACE", default_value = "litmus")]
    namespace: String,

    /// Comma separated experiment names; defaults to the engine's list
    #[arg(long, env = "EXPERIMENT_LIST", value_delimiter = ',')]
    experiments: Vec<String>,

    /// Seconds between completion polls
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 5)]
    poll_interval: u64,

    /// Upper bound in seconds on one experiment watch
    #[arg(long, env = "WATCH_TIMEOUT", default_value_t = 3600)]
    watch_timeout: u64,

    /// Seconds to wait after submitting a Job before the first poll
    #[arg(long, env = "SETTLE_DELAY", default_value_t = 5)]
    settle_delay: u64,

    /// Attempts for transient API errors and status write conflicts
    #[arg(long, env = "STATUS_RETRIES", default_value_t = 5)]
    status_retries: u32,

    /// What to do after an experiment fails: halt or continue
    #[arg(long, env = "FAILURE_POLICY", default_value = "halt")]
    failure_policy: FailurePolicy,

    /// Completion signal to follow: job or pod
    #[arg(long, env = "WATCH_MODE", default_value = "job")]
    watch_mode: WatchMode,

    /// Name recorded as the runner on each status record
    #[arg(long, env = "POD_NAME", default_value = "chaos-runner")]
    runner_name: String,

    /// Path to a kubeconfig; in-cluster config is used when unset
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Log output format: text or json
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            poll_interval: Duration::from_secs(self.poll_interval),
            watch_timeout: Duration::from_secs(self.watch_timeout),
            settle_delay: Duration::from_secs(self.settle_delay),
            status_retry: RetryConfig::with_max_attempts(self.status_retries),
            failure_policy: self.failure_policy,
            watch_mode: self.watch_mode,
            runner_name: self.runner_name.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [ChaosEngine::crd(), ChaosExperiment::crd(), ChaosResult::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_logging(TelemetryConfig {
        format: cli.log_format,
        default_filter: None,
    })?;

    let engine_name = cli
        .engine
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--engine or CHAOSENGINE is required"))?;
    let config = cli.runner_config();

    let client = create_client(cli.kubeconfig.as_deref()).await?;
    let chaos_client = Arc::new(KubeChaosClient::new(client.clone()));
    let events = Arc::new(KubeEventPublisher::new(
        client,
        "chaos-runner",
        Some(config.runner_name.clone()),
    ));

    let mut engine = EngineContext::load(
        chaos_client.as_ref(),
        &engine_name,
        &cli.namespace,
        &config.status_retry,
    )
    .await?;
    if !cli.experiments.is_empty() {
        engine = engine.with_experiments(cli.experiments.clone());
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let runner = Runner::new(chaos_client, events, config);
    let summary = runner.run(&engine, &cancel).await?;

    for report in &summary.experiments {
        info!(experiment = %report.name, outcome = ?report.outcome, "experiment outcome");
    }

    if !summary.is_success() {
        error!(
            engine = %engine.name,
            failed = summary.failed(),
            cancelled = summary.cancelled,
            "chaos run did not complete cleanly"
        );
        std::process::exit(1);
    }
    Ok(())
}

/// Cancel the run on SIGINT or SIGTERM
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    warn!("shutdown signal received, stopping chaos run");
    cancel.cancel();
}
