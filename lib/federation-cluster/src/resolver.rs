//! Turns cluster registrations into client configurations

use federation_api::{Cluster, CredentialKind, Identity};
use k8s_openapi::api::core::v1::Secret;
use kube::config::Kubeconfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address::{resolve_server_address, DefaultRouteInterface, HostInterface};
use crate::config::{ClientAuth, ClientConfig, ResolverConfig};
use crate::credentials::{is_service_account_token, secret_id, CredentialBundle};
use crate::store::{wait_for_secret, CredentialStore, StoreAccessors};
use crate::{ConnectionError, Result};

/// Resolves how to reach a member cluster and with which credentials.
///
/// Holds no per-cluster state; identities are passed in per call and never
/// cached.
#[derive(Clone)]
pub struct ClusterConnectionResolver {
    config: ResolverConfig,
    host: Arc<dyn HostInterface>,
}

impl ClusterConnectionResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_host_interface(config, Arc::new(DefaultRouteInterface))
    }

    pub fn with_host_interface(config: ResolverConfig, host: Arc<dyn HostInterface>) -> Self {
        Self { config, host }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Pick the server address of `cluster` reachable from this host
    pub fn resolve_address(&self, cluster: &Cluster) -> Result<String> {
        resolve_server_address(&cluster.spec.server_address_by_client_cidrs, self.host.as_ref())
    }

    /// Build a client configuration from the cluster's own credential
    /// reference, looked up in `store`
    pub async fn build_config(
        &self,
        cluster: &Cluster,
        store: &dyn CredentialStore,
    ) -> Result<ClientConfig> {
        let address = self.resolve_address(cluster)?;

        let secret_ref = match &cluster.spec.secret_ref {
            Some(r) => r,
            None => {
                warn!(
                    "No secretRef for cluster {}, connecting to {} without credentials",
                    cluster.name(),
                    address
                );
                return Ok(self.client_config(address, ClientAuth::Anonymous));
            }
        };

        if secret_ref.name.is_empty() {
            return Err(ConnectionError::InvalidConfiguration(format!(
                "found secretRef but no secret name for cluster {}",
                cluster.name()
            )));
        }

        let namespace = secret_ref
            .namespace
            .clone()
            .unwrap_or_else(|| self.config.namespace.clone());
        let secret = self
            .fetch_credential(store, secret_ref.kind, &namespace, &secret_ref.name)
            .await?;

        debug!(
            "Building config for cluster {} from secret {}",
            cluster.name(),
            secret_id(&secret)
        );
        self.config_from_secret(address, &secret)
    }

    /// Build a client configuration for acting as `identity` on `cluster`.
    ///
    /// The credential is looked up in the store named by the identity's
    /// location.
    pub async fn build_config_for_identity(
        &self,
        cluster: &Cluster,
        identity: &Identity,
        stores: &StoreAccessors,
    ) -> Result<ClientConfig> {
        let address = self.resolve_address(cluster)?;

        let credential = &identity.credential_ref;
        let kind = credential.credential_kind().ok_or_else(|| {
            ConnectionError::InvalidConfiguration(format!(
                "cluster credential should be either ServiceAccount or Secret, got kind {:?} for {}/{}",
                credential.kind, credential.namespace, credential.name
            ))
        })?;

        let store = stores.for_location(identity.location)?;
        let secret = self
            .fetch_credential(store, kind, &credential.namespace, &credential.name)
            .await?;

        debug!(
            "Building config for cluster {} from {} secret {}",
            cluster.name(),
            identity.location,
            secret_id(&secret)
        );
        let mut config = self.config_from_secret(address, &secret)?;
        config.impersonate = identity.impersonating_user.clone();
        Ok(config)
    }

    async fn fetch_credential(
        &self,
        store: &dyn CredentialStore,
        kind: CredentialKind,
        namespace: &str,
        name: &str,
    ) -> Result<Secret> {
        match kind {
            CredentialKind::Secret => wait_for_secret(store, namespace, name, self.config.poll).await,
            CredentialKind::ServiceAccount => {
                let secret_name = service_account_token_secret(store, namespace, name).await?;
                wait_for_secret(store, namespace, &secret_name, self.config.poll).await
            }
        }
    }

    fn config_from_secret(&self, address: String, secret: &Secret) -> Result<ClientConfig> {
        let auth = match CredentialBundle::from_secret(secret)? {
            CredentialBundle::ServiceAccountToken { token, ca_crt } => ClientAuth::BearerToken {
                token,
                ca_data: ca_crt,
            },
            CredentialBundle::Kubeconfig(data) => {
                let invalid = |reason: String| ConnectionError::InvalidCredentialShape {
                    secret: secret_id(secret),
                    reason,
                };
                let yaml = std::str::from_utf8(&data)
                    .map_err(|_| invalid("kubeconfig is not valid UTF-8".to_string()))?;
                let kubeconfig = Kubeconfig::from_yaml(yaml)
                    .map_err(|e| invalid(format!("malformed kubeconfig: {}", e)))?;
                ClientAuth::Kubeconfig(Box::new(kubeconfig))
            }
        };
        Ok(self.client_config(address, auth))
    }

    fn client_config(&self, host: String, auth: ClientAuth) -> ClientConfig {
        ClientConfig {
            host,
            auth,
            impersonate: None,
            qps: self.config.qps,
            burst: self.config.burst,
        }
    }
}

/// Find the name of the token secret issued for a service account.
///
/// Checks the secrets the account lists first, then any token secret in the
/// namespace annotated with the account (accounts no longer list their
/// tokens on recent API servers).
async fn service_account_token_secret(
    store: &dyn CredentialStore,
    namespace: &str,
    name: &str,
) -> Result<String> {
    let sa = store.get_service_account(namespace, name).await?;

    for secret_ref in sa.secrets.iter().flatten() {
        let secret_name = match &secret_ref.name {
            Some(n) => n,
            None => continue,
        };
        match store.get_secret(namespace, secret_name).await {
            Ok(secret) if is_service_account_token(&secret, &sa) => {
                return Ok(secret_name.clone());
            }
            Ok(_) => {}
            Err(e) => debug!("Skipping secret {}/{}: {}", namespace, secret_name, e),
        }
    }

    let token = store
        .list_secrets(namespace)
        .await?
        .into_iter()
        .filter(|s| is_service_account_token(s, &sa))
        .filter_map(|s| s.metadata.name)
        .min();
    match token {
        Some(secret_name) => {
            info!(
                "Using token secret {} for service account {}/{}",
                secret_name, namespace, name
            );
            Ok(secret_name)
        }
        None => Err(ConnectionError::NotFound(format!(
            "token secret for service account {}/{}",
            namespace, name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::StaticHostInterface;
    use crate::config::tests::TEST_CA_PEM;
    use crate::config::{KUBE_API_BURST, KUBE_API_QPS};
    use crate::credentials::tests::{secret, service_account, token_secret_for};
    use crate::store::tests::{fast_poll, MemoryStore};
    use federation_api::v1beta1::ClusterSpec;
    use federation_api::{
        ClusterCredentialRef, CredentialRef, IdentityLocation, ImpersonatingUser,
        ServerAddressByClientCidr,
    };
    use k8s_openapi::api::core::v1::ObjectReference;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: member
  cluster:
    server: https://stale.example:443
users:
- name: fed
  user:
    token: abc
contexts:
- name: member
  context:
    cluster: member
    user: fed
current-context: member
"#;

    fn resolver() -> ClusterConnectionResolver {
        let mut config = ResolverConfig::new("federation-system");
        config.poll = fast_poll();
        ClusterConnectionResolver::with_host_interface(
            config,
            Arc::new(StaticHostInterface("10.0.0.5".parse().unwrap())),
        )
    }

    fn cluster(secret_ref: Option<ClusterCredentialRef>) -> Cluster {
        Cluster::new(
            "cluster-a",
            ClusterSpec {
                server_address_by_client_cidrs: vec![
                    ServerAddressByClientCidr::new("10.0.0.0/8", "https://10.1.1.1:6443"),
                    ServerAddressByClientCidr::new("0.0.0.0/0", "https://public.example"),
                ],
                secret_ref,
            },
        )
    }

    fn secret_ref(name: &str) -> Option<ClusterCredentialRef> {
        Some(ClusterCredentialRef {
            kind: CredentialKind::Secret,
            name: name.to_string(),
            namespace: None,
        })
    }

    #[tokio::test]
    async fn test_anonymous_without_secret_ref() {
        let config = resolver()
            .build_config(&cluster(None), &MemoryStore::default())
            .await
            .unwrap();
        assert!(config.is_anonymous());
        assert_eq!(config.host, "https://10.1.1.1:6443");
        assert_eq!(config.qps, KUBE_API_QPS);
        assert_eq!(config.burst, KUBE_API_BURST);
    }

    #[tokio::test]
    async fn test_empty_secret_name() {
        let err = resolver()
            .build_config(&cluster(secret_ref("")), &MemoryStore::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_token_and_ca_secret() {
        let store = MemoryStore::default()
            .with_secret(secret("cluster-a", &[("token", "abc"), ("ca.crt", TEST_CA_PEM)]));
        let config = resolver()
            .build_config(&cluster(secret_ref("cluster-a")), &store)
            .await
            .unwrap();
        match &config.auth {
            ClientAuth::BearerToken { token, ca_data } => {
                assert_eq!(token, "abc");
                assert_eq!(ca_data, TEST_CA_PEM.as_bytes());
            }
            other => panic!("unexpected auth {:?}", other),
        }
        assert_eq!(config.burst, KUBE_API_BURST);
    }

    #[tokio::test]
    async fn test_token_only_secret_is_rejected() {
        let store = MemoryStore::default().with_secret(secret("cluster-a", &[("token", "abc")]));
        let err = resolver()
            .build_config(&cluster(secret_ref("cluster-a")), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidCredentialShape { .. }));
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_legacy_kubeconfig_secret() {
        let store =
            MemoryStore::default().with_secret(secret("cluster-a", &[("kubeconfig", KUBECONFIG)]));
        let config = resolver()
            .build_config(&cluster(secret_ref("cluster-a")), &store)
            .await
            .unwrap();
        assert!(matches!(config.auth, ClientAuth::Kubeconfig(_)));
        assert_eq!(config.host, "https://10.1.1.1:6443");

        let kube_config = config.to_kube_config().await.unwrap();
        assert_eq!(kube_config.cluster_url.host(), Some("10.1.1.1"));
    }

    #[tokio::test]
    async fn test_malformed_kubeconfig_secret() {
        let store = MemoryStore::default()
            .with_secret(secret("cluster-a", &[("kubeconfig", "clusters: [oops")]));
        let err = resolver()
            .build_config(&cluster(secret_ref("cluster-a")), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidCredentialShape { .. }));
    }

    #[tokio::test]
    async fn test_missing_secret_times_out() {
        let err = resolver()
            .build_config(&cluster(secret_ref("cluster-a")), &MemoryStore::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_identity_with_service_account() {
        let sa = service_account("alice");
        let mut sa_with_refs = sa.clone();
        sa_with_refs.secrets = Some(vec![
            ObjectReference {
                name: Some("alice-dockercfg".to_string()),
                ..Default::default()
            },
            ObjectReference {
                name: Some("alice-token".to_string()),
                ..Default::default()
            },
        ]);
        let mut token = token_secret_for(&sa, "alice-token");
        token.data.as_mut().unwrap().insert(
            "ca.crt".to_string(),
            k8s_openapi::ByteString(TEST_CA_PEM.as_bytes().to_vec()),
        );
        let member_store = MemoryStore::default()
            .with_service_account(sa_with_refs)
            .with_secret(secret("alice-dockercfg", &[(".dockercfg", "{}")]))
            .with_secret(token);

        let identity = Identity {
            location: IdentityLocation::Cluster,
            credential_ref: CredentialRef::service_account("federation-system", "alice"),
            impersonating_user: Some(ImpersonatingUser {
                username: "alice".to_string(),
                ..Default::default()
            }),
        };
        let stores = StoreAccessors::new().with_cluster(Arc::new(member_store));

        let config = resolver()
            .build_config_for_identity(&cluster(None), &identity, &stores)
            .await
            .unwrap();
        match &config.auth {
            ClientAuth::BearerToken { token, .. } => assert_eq!(token, "sa-token"),
            other => panic!("unexpected auth {:?}", other),
        }
        assert_eq!(config.impersonate.as_ref().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_identity_service_account_without_listed_secrets() {
        let sa = service_account("bob");
        let store = MemoryStore::default()
            .with_service_account(sa.clone())
            .with_secret(token_secret_for(&sa, "bob-token"));
        let identity = Identity {
            location: IdentityLocation::HostCluster,
            credential_ref: CredentialRef::service_account("federation-system", "bob"),
            impersonating_user: None,
        };
        let stores = StoreAccessors::new().with_host_cluster(Arc::new(store));

        let config = resolver()
            .build_config_for_identity(&cluster(None), &identity, &stores)
            .await
            .unwrap();
        assert!(matches!(config.auth, ClientAuth::BearerToken { .. }));
        assert!(config.impersonate.is_none());
    }

    #[tokio::test]
    async fn test_identity_uses_location_store() {
        let identity = Identity {
            location: IdentityLocation::Federation,
            credential_ref: CredentialRef::secret("federation-system", "cluster-a"),
            impersonating_user: None,
        };
        let stores = StoreAccessors::new().with_host_cluster(Arc::new(
            MemoryStore::default().with_secret(secret("cluster-a", &[("kubeconfig", KUBECONFIG)])),
        ));
        let err = resolver()
            .build_config_for_identity(&cluster(None), &identity, &stores)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::StoreUnavailable(IdentityLocation::Federation)
        ));
    }

    #[tokio::test]
    async fn test_identity_rejects_unknown_kind() {
        let identity = Identity {
            location: IdentityLocation::HostCluster,
            credential_ref: CredentialRef {
                kind: "ConfigMap".to_string(),
                namespace: "federation-system".to_string(),
                name: "x".to_string(),
            },
            impersonating_user: None,
        };
        let err = resolver()
            .build_config_for_identity(&cluster(None), &identity, &StoreAccessors::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_unreachable_cluster() {
        let resolver = ClusterConnectionResolver::with_host_interface(
            ResolverConfig::new("federation-system"),
            Arc::new(StaticHostInterface("10.0.0.5".parse().unwrap())),
        );
        let mut c = cluster(None);
        c.spec.server_address_by_client_cidrs =
            vec![ServerAddressByClientCidr::new("192.168.0.0/16", "https://lan")];
        let err = resolver.build_config(&c, &MemoryStore::default()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::NoReachableAddress(_)));
    }
}
