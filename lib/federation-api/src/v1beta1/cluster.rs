use ipnetwork::IpNetwork;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Cluster registers a member cluster with the federation control plane
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "federation.k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    plural = "clusters",
    derive = "Default",
    derive = "PartialEq",
    status = "ClusterStatus",
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Map of client CIDR to server address. A client whose address falls in
    /// the CIDR should use the paired server address.
    #[serde(rename = "serverAddressByClientCIDRs")]
    pub server_address_by_client_cidrs: Vec<ServerAddressByClientCidr>,

    /// Credentials for reaching the cluster. Absent means anonymous access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<ClusterCredentialRef>,
}

/// Server address to use for clients within a CIDR
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerAddressByClientCidr {
    /// CIDR the client address must fall in, e.g. "10.0.0.0/8"
    #[serde(rename = "clientCIDR")]
    pub client_cidr: String,

    /// Address of the cluster API server, "hostname:port" or a URL
    pub server_address: String,
}

impl ServerAddressByClientCidr {
    pub fn new(client_cidr: impl Into<String>, server_address: impl Into<String>) -> Self {
        Self {
            client_cidr: client_cidr.into(),
            server_address: server_address.into(),
        }
    }
}

/// Kind of object a cluster credential reference points at
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum CredentialKind {
    ServiceAccount,
    #[default]
    Secret,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::ServiceAccount => "ServiceAccount",
            CredentialKind::Secret => "Secret",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ServiceAccount" => Some(CredentialKind::ServiceAccount),
            "Secret" => Some(CredentialKind::Secret),
            _ => None,
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the credential used for a cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterCredentialRef {
    #[serde(default)]
    pub kind: CredentialKind,

    pub name: String,

    /// Defaults to the namespace the control plane runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Status of a registered cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterStatus {
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,

    /// Zones the cluster's nodes run in
    #[serde(default)]
    pub zones: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Observed condition of a cluster (e.g. "Ready", "Offline")
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A single problem found while validating a cluster
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl Cluster {
    /// Name of the cluster, empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Validate the registration record
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.name().is_empty() {
            errors.push(FieldError {
                field: "metadata.name".to_string(),
                message: "name is required".to_string(),
            });
        }

        let addresses = &self.spec.server_address_by_client_cidrs;
        if addresses.is_empty() {
            errors.push(FieldError {
                field: "spec.serverAddressByClientCIDRs".to_string(),
                message: "at least one server address is required".to_string(),
            });
        }
        for (i, address) in addresses.iter().enumerate() {
            if address.client_cidr.is_empty() {
                continue;
            }
            if let Err(e) = address.client_cidr.parse::<IpNetwork>() {
                errors.push(FieldError {
                    field: format!("spec.serverAddressByClientCIDRs[{}].clientCIDR", i),
                    message: format!("must be a valid CIDR: {}", e),
                });
            }
        }

        if let Some(secret_ref) = &self.spec.secret_ref {
            if secret_ref.name.is_empty() {
                errors.push(FieldError {
                    field: "spec.secretRef.name".to_string(),
                    message: "name is required when secretRef is set".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(addresses: Vec<ServerAddressByClientCidr>) -> Cluster {
        Cluster::new(
            "cluster-a",
            ClusterSpec {
                server_address_by_client_cidrs: addresses,
                secret_ref: None,
            },
        )
    }

    #[test]
    fn test_valid_cluster() {
        let c = cluster(vec![ServerAddressByClientCidr::new("0.0.0.0/0", "https://a:6443")]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_requires_address() {
        let errors = cluster(vec![]).validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.serverAddressByClientCIDRs");
    }

    #[test]
    fn test_rejects_bad_cidr() {
        let c = cluster(vec![
            ServerAddressByClientCidr::new("10.0.0.0/8", "https://a"),
            ServerAddressByClientCidr::new("not-a-cidr", "https://b"),
        ]);
        let errors = c.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.serverAddressByClientCIDRs[1].clientCIDR");
    }

    #[test]
    fn test_secret_ref_wire_shape() {
        let spec: ClusterSpec = serde_json::from_value(serde_json::json!({
            "serverAddressByClientCIDRs": [{"clientCIDR": "0.0.0.0/0", "serverAddress": "https://a"}],
            "secretRef": {"name": "cluster-a"}
        }))
        .unwrap();
        let secret_ref = spec.secret_ref.unwrap();
        assert_eq!(secret_ref.kind, CredentialKind::Secret);
        assert_eq!(secret_ref.name, "cluster-a");
        assert_eq!(secret_ref.namespace, None);
    }
}
