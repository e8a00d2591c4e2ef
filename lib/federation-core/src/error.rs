use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("Adapter for kind {0:?} was registered twice")]
    DuplicateRegistration(String),

    #[error("Expected a {expected} object, got {actual}")]
    UnexpectedType {
        expected: String,
        actual: &'static str,
    },

    #[error("Invalid scheduling preferences in {annotation}: {reason}")]
    InvalidPreferences { annotation: String, reason: String },

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CoreError {
    /// True when the store reported the object as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::KubernetesError(kube::Error::Api(resp)) if resp.code == 404)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::KubernetesError(kube::Error::Api(resp)) if resp.code == 409)
    }
}
