use async_trait::async_trait;
use federation_api::{Cluster, Identity, UserClusterIdentity};
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use kube_runtime::{watcher, WatchStreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::index::{IdentityIndex, IndexWriter};
use crate::provider::IdentityProvider;
use crate::registry::ProviderContext;
use crate::{IdentityError, Result};

pub const PROVIDER_NAME: &str = "usercluster";

const FIELD_MANAGER: &str = "federation-identity";

/// Optional provider configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserClusterConfig {
    /// Namespace holding UserClusterIdentity objects
    namespace: Option<String>,
}

/// Looks identities up in a watched cache of UserClusterIdentity objects
pub struct UserClusterIdentityProvider {
    index: IdentityIndex,
    watch_task: Option<JoinHandle<()>>,
}

impl UserClusterIdentityProvider {
    /// Register the UserClusterIdentity resource and start watching
    /// `namespace`
    pub async fn new(client: Client, namespace: &str) -> Result<Self> {
        ensure_crd(client.clone()).await?;
        Ok(Self::start(client, namespace))
    }

    /// Start watching `namespace` without touching the resource definition
    pub fn start(client: Client, namespace: &str) -> Self {
        let api: Api<UserClusterIdentity> = Api::namespaced(client, namespace);
        let (index, writer) = IdentityIndex::new();
        let watch_task = tokio::spawn(run_watch(api, writer));
        info!("Watching UserClusterIdentity objects in {}", namespace);
        Self {
            index,
            watch_task: Some(watch_task),
        }
    }

    /// Serve lookups from an index fed by someone else
    pub fn from_index(index: IdentityIndex) -> Self {
        Self {
            index,
            watch_task: None,
        }
    }

    pub(crate) async fn from_context(ctx: ProviderContext) -> Result<Self> {
        let client = ctx.client.ok_or_else(|| {
            IdentityError::InvalidConfiguration(
                "usercluster provider needs a client for the host cluster".to_string(),
            )
        })?;

        let config: UserClusterConfig = match ctx.config.as_deref() {
            Some(data) if !data.is_empty() => serde_json::from_slice(data)?,
            _ => UserClusterConfig::default(),
        };
        let namespace = config.namespace.unwrap_or(ctx.namespace);
        if namespace.is_empty() {
            return Err(IdentityError::InvalidConfiguration(
                "usercluster provider needs a namespace".to_string(),
            ));
        }

        Self::new(client, &namespace).await
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }
}

impl Drop for UserClusterIdentityProvider {
    fn drop(&mut self) {
        if let Some(task) = self.watch_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl IdentityProvider for UserClusterIdentityProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn get_user_identity_for_cluster(&self, user: &str, cluster: &Cluster) -> Result<Identity> {
        let found = self
            .index
            .lookup(user, cluster.name())
            .await
            .ok_or_else(|| IdentityError::not_found(user, cluster.name()))?;

        if found.is_ambiguous() {
            warn!(
                user,
                cluster = cluster.name(),
                candidates = found.candidates,
                "Ambiguous identity, using the oldest match"
            );
        }
        Ok(found.identity)
    }

    async fn wait_for_sync(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.index.synced()).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(IdentityError::InvalidConfiguration(
                "identity watch stopped before syncing".to_string(),
            )),
            Err(_) => Err(IdentityError::SyncTimeout(timeout)),
        }
    }
}

async fn run_watch(api: Api<UserClusterIdentity>, mut writer: IndexWriter) {
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => writer.apply_event(event).await,
            Err(e) => warn!("UserClusterIdentity watch error: {}", e),
        }
    }
    warn!("UserClusterIdentity watch stream ended");
}

/// Create or update the UserClusterIdentity resource definition
async fn ensure_crd(client: Client) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let crd = UserClusterIdentity::crd();
    let name = crd.name_any();
    crds.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&crd),
    )
    .await?;
    debug!("Applied CustomResourceDefinition {}", name);
    Ok(())
}
