use async_trait::async_trait;
use federation_api::{Cluster, Identity};
use std::time::Duration;

use crate::Result;

/// Decides which credential the control plane uses when acting for a user
/// on a member cluster
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registered name of the provider
    fn name(&self) -> &str;

    async fn get_user_identity_for_cluster(&self, user: &str, cluster: &Cluster) -> Result<Identity>;

    /// Wait until lookups are served from a complete view. Providers without
    /// a cache are always ready.
    async fn wait_for_sync(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}
