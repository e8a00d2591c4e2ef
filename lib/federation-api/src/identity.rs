//! Identity descriptors handed from identity providers to the connection resolver

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::v1beta1::CredentialKind;

/// Where the control plane finds the object referenced by an identity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum IdentityLocation {
    /// Stored in the federation control plane
    Federation,
    /// Stored in the host cluster the control plane runs in
    #[default]
    HostCluster,
    /// Stored in the member cluster itself
    Cluster,
}

impl fmt::Display for IdentityLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentityLocation::Federation => "Federation",
            IdentityLocation::HostCluster => "HostCluster",
            IdentityLocation::Cluster => "Cluster",
        };
        f.write_str(s)
    }
}

/// Reference to a service account or a secret holding cluster credentials
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CredentialRef {
    /// "ServiceAccount" or "Secret"
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl CredentialRef {
    pub fn secret(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::Secret.as_str().to_string(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn service_account(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::ServiceAccount.as_str().to_string(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parsed credential kind, `None` when the kind is not supported
    pub fn credential_kind(&self) -> Option<CredentialKind> {
        CredentialKind::parse(&self.kind)
    }
}

/// User the control plane acts as on the member cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonatingUser {
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Vec<String>>,
}

/// The information needed to connect to a cluster on behalf of a user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Where `credential_ref` is stored
    pub location: IdentityLocation,

    /// Service account or secret containing the credentials to use
    pub credential_ref: CredentialRef,

    /// User to impersonate, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonating_user: Option<ImpersonatingUser>,
}
