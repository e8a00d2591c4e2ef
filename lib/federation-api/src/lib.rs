//! Federation API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resources consumed by the federation
//! control plane:
//! - Cluster: a registered member cluster and how to reach it
//! - UserClusterIdentity: maps an acting user on a member cluster to the
//!   credential the control plane should use
//! - Identity: where a credential lives and whom to impersonate

pub mod annotations;
pub mod identity;
pub mod v1alpha1;
pub mod v1beta1;

pub use identity::{CredentialRef, Identity, IdentityLocation, ImpersonatingUser};
pub use v1alpha1::UserClusterIdentity;
pub use v1beta1::{Cluster, ClusterCredentialRef, CredentialKind, ServerAddressByClientCidr};

/// API group for federation resources
pub const API_GROUP: &str = "federation.k8s.io";
