use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity not found for user {user} on cluster {cluster}")]
    IdentityNotFound { user: String, cluster: String },

    #[error("Identity provider {0:?} was registered twice")]
    DuplicateRegistration(String),

    #[error("Unknown identity provider {0:?}")]
    UnknownProvider(String),

    #[error("Invalid identity provider configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Identity index not synced after {0:?}")]
    SyncTimeout(Duration),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl IdentityError {
    pub fn not_found(user: &str, cluster: &str) -> Self {
        IdentityError::IdentityNotFound {
            user: user.to_string(),
            cluster: cluster.to_string(),
        }
    }
}
