//! Identity provider that always uses the cluster's own credential

use async_trait::async_trait;
use federation_api::{Cluster, CredentialRef, Identity, IdentityLocation};

use crate::provider::IdentityProvider;
use crate::registry::ProviderContext;
use crate::{IdentityError, Result};

pub const PROVIDER_NAME: &str = "single";

/// Ignores the acting user: every request uses the secret named by the
/// cluster record, read from the host cluster
#[derive(Clone, Debug)]
pub struct SingleIdentityProvider {
    namespace: String,
}

impl SingleIdentityProvider {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub(crate) fn from_context(ctx: &ProviderContext) -> Result<Self> {
        if ctx.namespace.is_empty() {
            return Err(IdentityError::InvalidConfiguration(
                "single provider needs the control plane namespace".to_string(),
            ));
        }
        Ok(Self::new(ctx.namespace.clone()))
    }
}

#[async_trait]
impl IdentityProvider for SingleIdentityProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn get_user_identity_for_cluster(&self, user: &str, cluster: &Cluster) -> Result<Identity> {
        let secret_ref = cluster
            .spec
            .secret_ref
            .as_ref()
            .filter(|r| !r.name.is_empty())
            .ok_or_else(|| IdentityError::not_found(user, cluster.name()))?;

        Ok(Identity {
            location: IdentityLocation::HostCluster,
            credential_ref: CredentialRef::secret(&self.namespace, &secret_ref.name),
            impersonating_user: None,
        })
    }
}
