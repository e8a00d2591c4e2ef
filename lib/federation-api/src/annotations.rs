//! Annotation keys read by the federation control plane

/// Written by the admission chain on every federated object; names the user
/// that last changed it.
pub const LAST_UPDATED_BY_USER: &str = "federation.alpha.kubernetes.io/last-updated-by-user";

/// Scheduling preferences for federated Jobs
pub const JOB_PREFERENCES: &str = "federation.kubernetes.io/job-preferences";

/// Scheduling preferences for federated Deployments
pub const DEPLOYMENT_PREFERENCES: &str = "federation.kubernetes.io/deployment-preferences";
