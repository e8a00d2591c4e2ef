use federation_api::IdentityLocation;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectionError>;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid credential shape in secret {secret}: {reason}")]
    InvalidCredentialShape { secret: String, reason: String },

    #[error("No reachable server address: {0}")]
    NoReachableAddress(String),

    #[error("Timed out after {timeout:?} waiting for {what}: {last_error}")]
    Timeout {
        what: String,
        timeout: Duration,
        last_error: String,
    },

    #[error("Invalid cluster configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No credential store configured for location {0}")]
    StoreUnavailable(IdentityLocation),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::Error),
}

impl ConnectionError {
    /// Map a store error, turning 404 responses into `NotFound`
    pub fn from_kube(err: kube::Error, what: impl Into<String>) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => ConnectionError::NotFound(what.into()),
            other => ConnectionError::KubernetesError(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConnectionError::NotFound(_))
    }

    /// Errors that stay fatal until the cluster record or its secret is corrected
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ConnectionError::InvalidCredentialShape { .. }
                | ConnectionError::NoReachableAddress(_)
                | ConnectionError::InvalidConfiguration(_)
        )
    }
}
