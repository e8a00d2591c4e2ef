//! Credential bundles stored in secrets

use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use std::fmt;

use crate::{ConnectionError, Result};

/// Data key of a serialized kubeconfig in legacy credential secrets
pub const KUBECONFIG_SECRET_DATA_KEY: &str = "kubeconfig";
/// Data key of a service account bearer token
pub const TOKEN_DATA_KEY: &str = "token";
/// Data key of the PEM encoded cluster CA
pub const CA_CERT_DATA_KEY: &str = "ca.crt";

pub const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "kubernetes.io/service-account-token";
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";
pub const SERVICE_ACCOUNT_UID_ANNOTATION: &str = "kubernetes.io/service-account.uid";

/// Connection material read out of a credential secret
#[derive(Clone, PartialEq)]
pub enum CredentialBundle {
    /// Pre-serialized client configuration
    Kubeconfig(Vec<u8>),
    /// Service account bearer token plus the CA to trust
    ServiceAccountToken { token: String, ca_crt: Vec<u8> },
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialBundle::Kubeconfig(data) => {
                f.debug_tuple("Kubeconfig").field(&format!("<{} bytes>", data.len())).finish()
            }
            CredentialBundle::ServiceAccountToken { ca_crt, .. } => f
                .debug_struct("ServiceAccountToken")
                .field("token", &"<redacted>")
                .field("ca_crt", &format!("<{} bytes>", ca_crt.len()))
                .finish(),
        }
    }
}

impl CredentialBundle {
    /// Decide the bundle shape of a secret.
    ///
    /// `token` and `ca.crt` must appear together; without either, the secret
    /// must carry a `kubeconfig` entry.
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let id = secret_id(secret);
        let invalid = |reason: String| ConnectionError::InvalidCredentialShape {
            secret: id.clone(),
            reason,
        };

        let data = secret.data.as_ref();
        let lookup = |key: &str| data.and_then(|d| d.get(key)).map(|v| v.0.clone());

        match (lookup(TOKEN_DATA_KEY), lookup(CA_CERT_DATA_KEY)) {
            (Some(token), Some(ca_crt)) => {
                let token = String::from_utf8(token)
                    .map_err(|_| invalid("token is not valid UTF-8".to_string()))?;
                Ok(CredentialBundle::ServiceAccountToken { token, ca_crt })
            }
            (Some(_), None) | (None, Some(_)) => Err(invalid(format!(
                "secret must hold both '{}' and '{}' or neither",
                CA_CERT_DATA_KEY, TOKEN_DATA_KEY
            ))),
            (None, None) => lookup(KUBECONFIG_SECRET_DATA_KEY)
                .map(CredentialBundle::Kubeconfig)
                .ok_or_else(|| {
                    invalid(format!("secret has no '{}' entry", KUBECONFIG_SECRET_DATA_KEY))
                }),
        }
    }
}

/// True if `secret` is a token secret issued for `sa`
pub fn is_service_account_token(secret: &Secret, sa: &ServiceAccount) -> bool {
    if secret.type_.as_deref() != Some(SERVICE_ACCOUNT_TOKEN_TYPE) {
        return false;
    }
    if secret.metadata.namespace != sa.metadata.namespace {
        return false;
    }

    let annotations = match secret.metadata.annotations.as_ref() {
        Some(a) => a,
        None => return false,
    };
    if annotations.get(SERVICE_ACCOUNT_NAME_ANNOTATION) != sa.metadata.name.as_ref() {
        return false;
    }
    // Tokens issued for a deleted account with the same name carry a stale uid
    match (annotations.get(SERVICE_ACCOUNT_UID_ANNOTATION), sa.metadata.uid.as_ref()) {
        (Some(secret_uid), Some(sa_uid)) => secret_uid == sa_uid,
        _ => true,
    }
}

pub(crate) fn secret_id(secret: &Secret) -> String {
    format!(
        "{}/{}",
        secret.metadata.namespace.as_deref().unwrap_or_default(),
        secret.metadata.name.as_deref().unwrap_or_default()
    )
}
