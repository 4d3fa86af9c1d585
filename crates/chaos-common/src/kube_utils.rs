//! Kubernetes client helpers
//!
//! Client construction and classification of `kube::Error` responses.

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a client with [`DEFAULT_CONNECT_TIMEOUT`] and [`DEFAULT_READ_TIMEOUT`]
///
/// Without a kubeconfig path the in-cluster service account is tried first,
/// then `KUBECONFIG` and `~/.kube/config`.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Build a client with explicit connect and read timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = load_config(kubeconfig).await?;
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| Error::client_setup("build client", e))
}

async fn load_config(kubeconfig: Option<&Path>) -> Result<Config, Error> {
    let Some(path) = kubeconfig else {
        return Config::infer()
            .await
            .map_err(|e| Error::client_setup("infer config", e));
    };
    let kubeconfig =
        Kubeconfig::read_from(path).map_err(|e| Error::client_setup("read kubeconfig", e))?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::client_setup("load kubeconfig", e))
}

/// HTTP status code of an API error response, if any
pub fn api_status_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(ae) => Some(ae.code),
        _ => None,
    }
}

/// True for a 404 response
pub fn is_not_found(err: &kube::Error) -> bool {
    api_status_code(err) == Some(404)
}

/// True for a 409 response (resourceVersion mismatch or already exists)
pub fn is_conflict(err: &kube::Error) -> bool {
    api_status_code(err) == Some(409)
}

/// True when a retry may succeed: anything that is not a 4xx API response,
/// plus 429 Too Many Requests.
pub fn is_transient(err: &kube::Error) -> bool {
    match api_status_code(err) {
        Some(429) => true,
        Some(code) => !(400..500).contains(&code),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("code {code}"),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn classifies_not_found_and_conflict() {
        assert!(is_not_found(&api_error(404)));
        assert!(!is_not_found(&api_error(409)));
        assert!(is_conflict(&api_error(409)));
        assert!(!is_conflict(&api_error(500)));
    }

    #[test]
    fn transient_errors() {
        assert!(is_transient(&api_error(500)));
        assert!(is_transient(&api_error(503)));
        assert!(is_transient(&api_error(429)));
        assert!(!is_transient(&api_error(404)));
        assert!(!is_transient(&api_error(409)));
        assert!(!is_transient(&api_error(422)));
    }

    #[test]
    fn status_code_of_api_error() {
        assert_eq!(api_status_code(&api_error(403)), Some(403));
    }
}
