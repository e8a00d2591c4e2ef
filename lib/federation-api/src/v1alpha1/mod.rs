/// API version v1alpha1 for per-user cluster identities

pub mod user_cluster_identity;

pub use user_cluster_identity::{UserClusterIdentity, UserClusterIdentitySpec};

/// API version for identity resources
pub const API_VERSION: &str = "v1alpha1";
