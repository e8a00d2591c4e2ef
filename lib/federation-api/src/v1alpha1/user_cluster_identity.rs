use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// UserClusterIdentity tells the control plane which credential to use when
/// acting for `username` on the cluster named `cluster_name`
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "federation.k8s.io",
    version = "v1alpha1",
    kind = "UserClusterIdentity",
    plural = "userclusteridentities",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
)]
#[serde(rename_all = "camelCase")]
pub struct UserClusterIdentitySpec {
    /// User this identity is used for
    pub username: String,

    /// Cluster this identity is used to access
    pub cluster_name: String,

    /// Identity used to connect to the cluster
    pub identity: Identity,
}

impl UserClusterIdentity {
    /// Index key shared by all identities of a user on a cluster
    pub fn user_at_cluster(&self) -> String {
        user_at_cluster_key(&self.spec.username, &self.spec.cluster_name)
    }
}

/// Build the `username@clusterName` lookup key
pub fn user_at_cluster_key(username: &str, cluster_name: &str) -> String {
    format!("{}@{}", username, cluster_name)
}
