//! Clients to member clusters, acting for the user behind each change

use anyhow::{Context, Result};
use federation_api::{Cluster, IdentityLocation};
use federation_cluster::{
    ClientConfig, ClusterClient, ClusterConnectionResolver, CredentialStore, KubeCredentialStore,
    RateLimiter, StoreAccessors,
};
use federation_identity::IdentityProvider;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Client from a kubeconfig file, or inferred from the environment
pub async fn client_from(kubeconfig: Option<&Path>) -> Result<Client> {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("reading kubeconfig {}", path.display()))?;
            let config =
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await?;
            Ok(Client::try_from(config)?)
        }
        None => Ok(Client::try_default().await?),
    }
}

/// Connections to member clusters. Every client of one cluster draws from
/// the same limiter, whichever identity it acts as.
pub struct ClusterConnections {
    federation: Client,
    resolver: ClusterConnectionResolver,
    federation_store: Arc<dyn CredentialStore>,
    host_store: Arc<dyn CredentialStore>,
    provider: Option<Arc<dyn IdentityProvider>>,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl ClusterConnections {
    pub fn new(
        federation: Client,
        host: Client,
        resolver: ClusterConnectionResolver,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            federation_store: Arc::new(KubeCredentialStore::new(federation.clone())),
            host_store: Arc::new(KubeCredentialStore::new(host)),
            federation,
            resolver,
            provider,
            limiters: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn with_stores(
        federation: Client,
        resolver: ClusterConnectionResolver,
        federation_store: Arc<dyn CredentialStore>,
        host_store: Arc<dyn CredentialStore>,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            federation,
            resolver,
            federation_store,
            host_store,
            provider,
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Registered clusters with a valid spec
    pub async fn clusters(&self) -> Result<Vec<Cluster>> {
        let api: Api<Cluster> = Api::all(self.federation.clone());
        let clusters = api.list(&ListParams::default()).await?;

        Ok(clusters
            .items
            .into_iter()
            .filter(|cluster| match cluster.validate() {
                Ok(()) => true,
                Err(errors) => {
                    warn!(
                        "Skipping cluster {} with invalid spec: {:?}",
                        cluster.name(),
                        errors
                    );
                    false
                }
            })
            .collect())
    }

    /// Client acting as the control plane itself, with the cluster's own
    /// credentials
    pub async fn service_client(&self, cluster: &Cluster) -> Result<ClusterClient> {
        let config = self
            .resolver
            .build_config(cluster, self.host_store.as_ref())
            .await?;
        self.connect_with(cluster, &config).await
    }

    /// Client for acting on `cluster` on behalf of `user`
    pub async fn connect(&self, cluster: &Cluster, user: Option<&str>) -> Result<ClusterClient> {
        let config = self.client_config(cluster, user).await?;
        self.connect_with(cluster, &config).await
    }

    async fn connect_with(&self, cluster: &Cluster, config: &ClientConfig) -> Result<ClusterClient> {
        let limiter = self.limiter(cluster.name()).await;
        Ok(config.connect_with_limiter(cluster.name(), limiter).await?)
    }

    /// The limiter guarding `cluster`, created on first use
    async fn limiter(&self, cluster: &str) -> Arc<RateLimiter> {
        if let Some(limiter) = self.limiters.read().await.get(cluster) {
            return limiter.clone();
        }

        let mut limiters = self.limiters.write().await;
        limiters
            .entry(cluster.to_string())
            .or_insert_with(|| {
                let config = self.resolver.config();
                debug!(
                    "Throttling cluster {} at {} qps, burst {}",
                    cluster, config.qps, config.burst
                );
                Arc::new(RateLimiter::new(config.qps, config.burst))
            })
            .clone()
    }

    /// Without a provider or an acting user the cluster's own credentials
    /// are used
    async fn client_config(&self, cluster: &Cluster, user: Option<&str>) -> Result<ClientConfig> {
        let (provider, user) = match (&self.provider, user) {
            (Some(provider), Some(user)) => (provider, user),
            _ => {
                return Ok(self
                    .resolver
                    .build_config(cluster, self.host_store.as_ref())
                    .await?)
            }
        };

        let identity = provider
            .get_user_identity_for_cluster(user, cluster)
            .await
            .with_context(|| format!("identity of {} on cluster {}", user, cluster.name()))?;
        debug!(
            "Acting as {} on cluster {} with {} credential {}/{}",
            user,
            cluster.name(),
            identity.location,
            identity.credential_ref.namespace,
            identity.credential_ref.name
        );

        let mut stores = StoreAccessors::new()
            .with_federation(self.federation_store.clone())
            .with_host_cluster(self.host_store.clone());
        if identity.location == IdentityLocation::Cluster {
            let service = self.service_client(cluster).await?;
            stores = stores.with_cluster(Arc::new(service));
        }

        Ok(self
            .resolver
            .build_config_for_identity(cluster, &identity, &stores)
            .await?)
    }
}

/// Clients resolved during one sync pass, one per cluster and acting user.
/// Failures are remembered as well, so an unreachable cluster costs a
/// single attempt per pass.
pub struct PassConnections<'a> {
    connections: &'a ClusterConnections,
    clients: HashMap<(String, Option<String>), Option<ClusterClient>>,
}

impl<'a> PassConnections<'a> {
    pub fn new(connections: &'a ClusterConnections) -> Self {
        Self {
            connections,
            clients: HashMap::new(),
        }
    }

    pub async fn connect(&mut self, cluster: &Cluster, user: Option<&str>) -> Option<ClusterClient> {
        let key = (cluster.name().to_string(), user.map(String::from));
        if let Some(client) = self.clients.get(&key) {
            return client.clone();
        }

        let client = match self.connections.connect(cluster, user).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(
                    "Cannot connect to cluster {} as {}: {:#}",
                    cluster.name(),
                    user.unwrap_or("the control plane"),
                    e
                );
                None
            }
        };
        self.clients.insert(key, client.clone());
        client
    }
}
