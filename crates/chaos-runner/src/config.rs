//! Runner configuration
//!
//! Poll interval, watch deadline and the failure policy are configuration
//! rather than constants; the binary fills them from flags and env vars.

use std::time::Duration;

use chaos_common::retry::RetryConfig;

/// Default interval between completion-watch polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default upper bound on a single completion watch
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(3600);
/// Default pause between job submission and the first watch poll
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// What to do with the remaining experiments once one of them fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run at the first failed experiment
    #[default]
    Halt,
    /// Record the failure and move on to the next experiment
    Continue,
}

impl std::str::FromStr for FailurePolicy {
    type Err = chaos_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "halt" => Ok(Self::Halt),
            "continue" => Ok(Self::Continue),
            _ => Err(chaos_common::Error::unknown_variant(
                "failure policy",
                s,
                &["halt", "continue"],
            )),
        }
    }
}

/// Which completion signal the watcher follows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WatchMode {
    /// Job active-replica count
    #[default]
    Job,
    /// Experiment pod phase and container termination reason
    Pod,
}

impl std::str::FromStr for WatchMode {
    type Err = chaos_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "job" => Ok(Self::Job),
            "pod" => Ok(Self::Pod),
            _ => Err(chaos_common::Error::unknown_variant("watch mode", s, &["job", "pod"])),
        }
    }
}

/// Settings for one engine activation
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerConfig {
    /// Interval between completion-watch polls
    pub poll_interval: Duration,
    /// Upper bound on one completion watch
    pub watch_timeout: Duration,
    /// Pause between job submission and the first poll
    pub settle_delay: Duration,
    /// Backoff for transient API errors and status write conflicts
    pub status_retry: RetryConfig,
    /// Behaviour after a failed experiment
    pub failure_policy: FailurePolicy,
    /// Completion signal to follow
    pub watch_mode: WatchMode,
    /// Name recorded as the runner on each status record
    pub runner_name: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            watch_timeout: DEFAULT_WATCH_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            status_retry: RetryConfig::default(),
            failure_policy: FailurePolicy::default(),
            watch_mode: WatchMode::default(),
            runner_name: String::new(),
        }
    }
}
