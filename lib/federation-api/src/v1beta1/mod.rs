/// API version v1beta1 for federation cluster registration

pub mod cluster;

pub use cluster::{
    Cluster, ClusterCondition, ClusterCredentialRef, ClusterSpec, ClusterStatus, CredentialKind,
    FieldError, ServerAddressByClientCidr,
};

/// API version for cluster registration resources
pub const API_VERSION: &str = "v1beta1";
