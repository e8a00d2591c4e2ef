//! Registry of identity provider factories

use futures::future::BoxFuture;
use futures::FutureExt;
use kube::Client;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::provider::IdentityProvider;
use crate::single::{self, SingleIdentityProvider};
use crate::usercluster::{self, UserClusterIdentityProvider};
use crate::{IdentityError, Result};

/// What a provider factory gets to build its provider from
#[derive(Clone, Default)]
pub struct ProviderContext {
    /// Client for the cluster holding provider state, if one is available
    pub client: Option<Client>,
    /// Namespace the control plane runs in
    pub namespace: String,
    /// Contents of the provider configuration file
    pub config: Option<Vec<u8>>,
}

type ProviderFactory =
    Box<dyn Fn(ProviderContext) -> BoxFuture<'static, Result<Arc<dyn IdentityProvider>>> + Send + Sync>;

static GLOBAL: OnceLock<IdentityProviderRegistry> = OnceLock::new();

/// Maps provider names to factories.
///
/// Filled during startup, then installed as read-only process state.
#[derive(Default)]
pub struct IdentityProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl IdentityProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `single` and `usercluster` providers
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(single::PROVIDER_NAME, |ctx| async move {
            let provider: Arc<dyn IdentityProvider> =
                Arc::new(SingleIdentityProvider::from_context(&ctx)?);
            Ok(provider)
        })?;
        registry.register(usercluster::PROVIDER_NAME, |ctx| async move {
            let provider: Arc<dyn IdentityProvider> =
                Arc::new(UserClusterIdentityProvider::from_context(ctx).await?);
            Ok(provider)
        })?;
        Ok(registry)
    }

    /// Register a factory under `name`; a name can only be taken once
    pub fn register<F, Fut>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(ProviderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn IdentityProvider>>> + Send + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(IdentityError::DuplicateRegistration(name.to_string()));
        }
        self.factories
            .insert(name.to_string(), Box::new(move |ctx| factory(ctx).boxed()));
        debug!("Registered identity provider: {}", name);
        Ok(())
    }

    pub fn registered_providers(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build the provider registered as `name`
    pub async fn get_provider(
        &self,
        name: &str,
        ctx: ProviderContext,
    ) -> Result<Arc<dyn IdentityProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| IdentityError::UnknownProvider(name.to_string()))?;
        factory(ctx).await
    }

    /// Build the configured provider, reading its configuration file if one
    /// is given. An empty name selects no provider.
    pub async fn init_identity_provider(
        &self,
        name: &str,
        config_path: Option<&Path>,
        mut ctx: ProviderContext,
    ) -> Result<Option<Arc<dyn IdentityProvider>>> {
        if name.is_empty() {
            info!("No identity provider specified, acting with the service identity");
            return Ok(None);
        }
        if !self.is_registered(name) {
            return Err(IdentityError::UnknownProvider(name.to_string()));
        }

        if let Some(path) = config_path.filter(|p| !p.as_os_str().is_empty()) {
            let data = tokio::fs::read(path).await.map_err(|source| IdentityError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            ctx.config = Some(data);
        }

        let provider = self.get_provider(name, ctx).await?;
        info!("Initialized identity provider: {}", name);
        Ok(Some(provider))
    }

    /// Make this registry the process-wide one. Only the first call succeeds.
    pub fn install(self) -> Result<&'static IdentityProviderRegistry> {
        let mut installed = false;
        let registry = GLOBAL.get_or_init(|| {
            installed = true;
            self
        });
        if !installed {
            return Err(IdentityError::InvalidConfiguration(
                "identity provider registry already installed".to_string(),
            ));
        }
        Ok(registry)
    }

    /// The installed registry, if startup has installed one
    pub fn global() -> Option<&'static IdentityProviderRegistry> {
        GLOBAL.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use federation_api::v1beta1::ClusterSpec;
    use federation_api::{Cluster, ClusterCredentialRef};

    #[test]
    fn test_duplicate_registration() {
        let mut registry = IdentityProviderRegistry::builtin().unwrap();
        let err = registry
            .register(single::PROVIDER_NAME, |ctx| async move {
                let provider: Arc<dyn IdentityProvider> =
                    Arc::new(SingleIdentityProvider::from_context(&ctx)?);
                Ok(provider)
            })
            .unwrap_err();
        assert!(matches!(err, IdentityError::DuplicateRegistration(name) if name == "single"));
        assert_eq!(registry.registered_providers(), vec!["single", "usercluster"]);
    }

    #[tokio::test]
    async fn test_empty_name_selects_nothing() {
        let registry = IdentityProviderRegistry::builtin().unwrap();
        let provider = registry
            .init_identity_provider("", None, ProviderContext::default())
            .await
            .unwrap();
        assert!(provider.is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let registry = IdentityProviderRegistry::builtin().unwrap();
        let result = registry
            .init_identity_provider("ldap", None, ProviderContext::default())
            .await;
        assert!(matches!(result, Err(IdentityError::UnknownProvider(_))));
    }

    #[tokio::test]
    async fn test_init_single_provider() {
        let registry = IdentityProviderRegistry::builtin().unwrap();
        let ctx = ProviderContext {
            namespace: "federation-system".to_string(),
            ..Default::default()
        };
        let provider = registry
            .init_identity_provider("single", None, ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(provider.name(), "single");

        let cluster = Cluster::new(
            "cluster-a",
            ClusterSpec {
                server_address_by_client_cidrs: vec![],
                secret_ref: Some(ClusterCredentialRef {
                    name: "cluster-a".to_string(),
                    ..Default::default()
                }),
            },
        );
        let identity = provider
            .get_user_identity_for_cluster("alice", &cluster)
            .await
            .unwrap();
        assert_eq!(identity.credential_ref.namespace, "federation-system");
    }

    #[tokio::test]
    async fn test_config_file_is_passed_to_factory() {
        let path = std::env::temp_dir().join(format!("identity-config-{}.json", std::process::id()));
        tokio::fs::write(&path, br#"{"namespace":"identities"}"#).await.unwrap();

        let mut registry = IdentityProviderRegistry::new();
        registry
            .register("echo", |ctx| async move {
                let config = ctx.config.unwrap_or_default();
                let namespace = String::from_utf8(config).unwrap();
                let provider: Arc<dyn IdentityProvider> =
                    Arc::new(SingleIdentityProvider::new(namespace));
                Ok(provider)
            })
            .unwrap();

        let provider = registry
            .init_identity_provider("echo", Some(&path), ProviderContext::default())
            .await;
        tokio::fs::remove_file(&path).await.unwrap();
        assert!(provider.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let registry = IdentityProviderRegistry::builtin().unwrap();
        let result = registry
            .init_identity_provider(
                "single",
                Some(Path::new("/nonexistent/identity.conf")),
                ProviderContext::default(),
            )
            .await;
        assert!(matches!(result, Err(IdentityError::Io { .. })));
    }

    #[tokio::test]
    async fn test_usercluster_needs_client() {
        let registry = IdentityProviderRegistry::builtin().unwrap();
        let result = registry
            .init_identity_provider("usercluster", None, ProviderContext::default())
            .await;
        assert!(matches!(result, Err(IdentityError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_install_once() {
        let registry = IdentityProviderRegistry::builtin().unwrap();
        let installed = registry.install().unwrap();
        assert!(installed.is_registered("usercluster"));
        assert!(IdentityProviderRegistry::global().is_some());

        let again = IdentityProviderRegistry::new().install();
        assert!(matches!(again, Err(IdentityError::InvalidConfiguration(_))));
    }
}
