//! Access to the stores credential secrets live in

use async_trait::async_trait;
use federation_api::IdentityLocation;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::api::ListParams;
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::client::ClusterClient;
use crate::{ConnectionError, Result};

/// Read access to secrets and service accounts in one store
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>>;

    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<ServiceAccount>;
}

/// CredentialStore backed by a Kubernetes API server
#[derive(Clone)]
pub struct KubeCredentialStore {
    client: Client,
}

impl KubeCredentialStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying Kubernetes client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl CredentialStore for KubeCredentialStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        fetch_secret(Api::namespaced(self.client.clone(), namespace), namespace, name).await
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>> {
        fetch_secrets(Api::namespaced(self.client.clone(), namespace)).await
    }

    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<ServiceAccount> {
        fetch_service_account(Api::namespaced(self.client.clone(), namespace), namespace, name)
            .await
    }
}

/// Lookups in a member cluster, each one paying the cluster's limiter
#[async_trait]
impl CredentialStore for ClusterClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        fetch_secret(self.namespaced(namespace).await, namespace, name).await
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>> {
        fetch_secrets(self.namespaced(namespace).await).await
    }

    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<ServiceAccount> {
        fetch_service_account(self.namespaced(namespace).await, namespace, name).await
    }
}

async fn fetch_secret(secrets: Api<Secret>, namespace: &str, name: &str) -> Result<Secret> {
    secrets
        .get(name)
        .await
        .map_err(|e| ConnectionError::from_kube(e, format!("secret {}/{}", namespace, name)))
}

async fn fetch_secrets(secrets: Api<Secret>) -> Result<Vec<Secret>> {
    let list = secrets.list(&ListParams::default()).await?;
    Ok(list.items)
}

async fn fetch_service_account(
    accounts: Api<ServiceAccount>,
    namespace: &str,
    name: &str,
) -> Result<ServiceAccount> {
    accounts.get(name).await.map_err(|e| {
        ConnectionError::from_kube(e, format!("service account {}/{}", namespace, name))
    })
}

/// The credential stores an identity's location can refer to
#[derive(Clone, Default)]
pub struct StoreAccessors {
    federation: Option<Arc<dyn CredentialStore>>,
    host_cluster: Option<Arc<dyn CredentialStore>>,
    cluster: Option<Arc<dyn CredentialStore>>,
}

impl StoreAccessors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_federation(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.federation = Some(store);
        self
    }

    pub fn with_host_cluster(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.host_cluster = Some(store);
        self
    }

    /// Store of the member cluster being connected to
    pub fn with_cluster(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.cluster = Some(store);
        self
    }

    pub fn for_location(&self, location: IdentityLocation) -> Result<&dyn CredentialStore> {
        let store = match location {
            IdentityLocation::Federation => self.federation.as_deref(),
            IdentityLocation::HostCluster => self.host_cluster.as_deref(),
            IdentityLocation::Cluster => self.cluster.as_deref(),
        };
        store.ok_or(ConnectionError::StoreUnavailable(location))
    }
}

/// Fixed-interval polling bounds for secret fetches
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Fetch a secret, polling until it exists or `poll.timeout` elapses.
///
/// Tolerates the lag between registering a cluster and its secret being
/// created. The caller's task is blocked for up to `poll.timeout`.
pub async fn wait_for_secret(
    store: &dyn CredentialStore,
    namespace: &str,
    name: &str,
    poll: PollSettings,
) -> Result<Secret> {
    let deadline = Instant::now() + poll.timeout;
    let mut last_error = String::from("no attempt completed");

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match time::timeout(remaining, store.get_secret(namespace, name)).await {
            Ok(Ok(secret)) => {
                debug!("Fetched secret {}/{}", namespace, name);
                return Ok(secret);
            }
            Ok(Err(e)) => {
                warn!("Error fetching secret {}/{}: {}", namespace, name, e);
                last_error = e.to_string();
            }
            Err(_) => {}
        }

        if Instant::now() + poll.interval > deadline {
            return Err(ConnectionError::Timeout {
                what: format!("secret {}/{}", namespace, name),
                timeout: poll.timeout,
                last_error,
            });
        }
        time::sleep(poll.interval).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::credentials::tests::secret;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store; secrets only become visible after `appear_after` reads
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub secrets: Mutex<BTreeMap<(String, String), Secret>>,
        pub accounts: Mutex<BTreeMap<(String, String), ServiceAccount>>,
        pub appear_after: usize,
        pub reads: AtomicUsize,
    }

    impl MemoryStore {
        pub(crate) fn with_secret(self, secret: Secret) -> Self {
            let key = (
                secret.metadata.namespace.clone().unwrap_or_default(),
                secret.metadata.name.clone().unwrap_or_default(),
            );
            self.secrets.lock().unwrap().insert(key, secret);
            self
        }

        pub(crate) fn with_service_account(self, sa: ServiceAccount) -> Self {
            let key = (
                sa.metadata.namespace.clone().unwrap_or_default(),
                sa.metadata.name.clone().unwrap_or_default(),
            );
            self.accounts.lock().unwrap().insert(key, sa);
            self
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
            let reads = self.reads.fetch_add(1, Ordering::SeqCst);
            if reads < self.appear_after {
                return Err(ConnectionError::NotFound(format!("secret {}/{}", namespace, name)));
            }
            self.secrets
                .lock()
                .unwrap()
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| ConnectionError::NotFound(format!("secret {}/{}", namespace, name)))
        }

        async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>> {
            Ok(self
                .secrets
                .lock()
                .unwrap()
                .iter()
                .filter(|((ns, _), _)| ns == namespace)
                .map(|(_, s)| s.clone())
                .collect())
        }

        async fn get_service_account(&self, namespace: &str, name: &str) -> Result<ServiceAccount> {
            self.accounts
                .lock()
                .unwrap()
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| {
                    ConnectionError::NotFound(format!("service account {}/{}", namespace, name))
                })
        }
    }

    pub(crate) fn fast_poll() -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_wait_for_secret_tolerates_creation_lag() {
        let store = MemoryStore {
            appear_after: 3,
            ..Default::default()
        }
        .with_secret(secret("cluster-a", &[("kubeconfig", "x")]));

        let found = wait_for_secret(&store, "federation-system", "cluster-a", fast_poll())
            .await
            .unwrap();
        assert_eq!(found.metadata.name.as_deref(), Some("cluster-a"));
        assert_eq!(store.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_wait_for_secret_times_out() {
        let store = MemoryStore::default();
        let err = wait_for_secret(&store, "federation-system", "missing", fast_poll())
            .await
            .unwrap_err();
        match err {
            ConnectionError::Timeout { what, last_error, .. } => {
                assert_eq!(what, "secret federation-system/missing");
                assert!(last_error.contains("Not found"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_member_lookups_pay_the_limiter() {
        use crate::rate_limit::RateLimiter;

        // Nothing listens on the discard port, so the lookup itself fails
        let config = kube::Config::new("http://127.0.0.1:9".parse().unwrap());
        let client = ClusterClient::new(
            "east",
            Client::try_from(config).unwrap(),
            RateLimiter::new(0.001, 1),
        );

        assert!(client.get_secret("kube-system", "creds").await.is_err());
        assert!(!client.limiter().try_acquire().await);
    }

    #[test]
    fn test_missing_store_for_location() {
        let stores = StoreAccessors::new().with_host_cluster(Arc::new(MemoryStore::default()));
        assert!(stores.for_location(IdentityLocation::HostCluster).is_ok());
        assert!(matches!(
            stores.for_location(IdentityLocation::Cluster),
            Err(ConnectionError::StoreUnavailable(IdentityLocation::Cluster))
        ));
    }
}
