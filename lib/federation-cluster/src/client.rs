//! Rate-limited Kubernetes client for a member cluster

use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use std::sync::Arc;

use crate::rate_limit::RateLimiter;

/// ClusterClient wraps the Kubernetes client of one member cluster.
///
/// Every API handle handed out costs one token from the cluster's limiter,
/// so the control plane cannot exceed the configured QPS against it.
#[derive(Clone)]
pub struct ClusterClient {
    cluster_name: String,
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl ClusterClient {
    pub fn new(cluster_name: impl Into<String>, client: Client, limiter: RateLimiter) -> Self {
        Self::with_limiter(cluster_name, client, Arc::new(limiter))
    }

    /// Client drawing from a limiter shared with other clients of the same
    /// cluster
    pub fn with_limiter(
        cluster_name: impl Into<String>,
        client: Client,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            client,
            limiter,
        }
    }

    /// Name of the cluster this client talks to
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Get the underlying Kubernetes client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Namespaced API handle, waiting for the rate limiter first
    pub async fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        self.limiter.acquire().await;
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Cluster-wide API handle, waiting for the rate limiter first
    pub async fn all<K>(&self) -> Api<K>
    where
        K: Resource,
        <K as Resource>::DynamicType: Default,
    {
        self.limiter.acquire().await;
        Api::all(self.client.clone())
    }
}
