//! Shared error type
//!
//! Anything that is not specific to running an experiment ends up here: API
//! failures, malformed ChaosEngine/ChaosExperiment input, unparsable flag
//! values and client bootstrap problems.

use thiserror::Error;

/// Errors raised by the shared chaos crates
#[derive(Debug, Error)]
pub enum Error {
    /// The API server rejected or failed a request
    #[error("kubernetes error: {source}")]
    Kube {
        /// Underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A resource carries a value the runner cannot act on
    #[error(
        "invalid {resource}{}: {message}",
        .field.as_deref().map(|f| format!(" ({f})")).unwrap_or_default()
    )]
    Validation {
        /// Name of the offending resource
        resource: String,
        /// Field path inside the resource, when one is known
        field: Option<String>,
        /// What is wrong with it
        message: String,
    },

    /// A textual setting did not name one of the accepted variants
    #[error("invalid {setting}: {value}, expected one of: {}", .expected.join(", "))]
    UnknownVariant {
        /// Human readable name of the setting
        setting: &'static str,
        /// The value that was supplied
        value: String,
        /// Accepted spellings
        expected: &'static [&'static str],
    },

    /// A resource body could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The kube client could not be set up
    #[error("client setup failed while trying to {stage}: {message}")]
    ClientSetup {
        /// Step that failed, e.g. "read kubeconfig"
        stage: &'static str,
        /// Error reported by that step
        message: String,
    },
}

impl Error {
    /// Invalid value on a named resource
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            field: None,
            message: msg.into(),
        }
    }

    /// Invalid value at `field` of a named resource
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            field: Some(field.into()),
            message: msg.into(),
        }
    }

    /// Unparsable setting value
    pub fn unknown_variant(
        setting: &'static str,
        value: &str,
        expected: &'static [&'static str],
    ) -> Self {
        Self::UnknownVariant {
            setting,
            value: value.to_string(),
            expected,
        }
    }

    /// Failure while building the kube client
    pub fn client_setup(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::ClientSetup {
            stage,
            message: err.to_string(),
        }
    }

    /// Whether repeating the failed call could succeed
    ///
    /// Only API errors qualify, and only those the server or connection is
    /// to blame for.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube { source } => crate::kube_utils::is_transient(source),
            _ => false,
        }
    }
}
