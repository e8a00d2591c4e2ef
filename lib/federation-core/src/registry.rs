//! Kind name to adapter factory

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::adapter::{AdaptedKind, ResourceAdapter, TypedAdapter};
use crate::adapters::{DeploymentScheduling, JobScheduling};
use crate::{CoreError, Result};

/// Builds an adapter over a federation client
pub type AdapterFactory = fn(Client) -> Arc<dyn ResourceAdapter>;

/// Adapter factories by kind, assembled at startup
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: BTreeMap<&'static str, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in kind
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let builtins: [(&'static str, AdapterFactory); 4] = [
            (ConfigMap::KIND, configmap_adapter),
            (Secret::KIND, secret_adapter),
            (Job::KIND, job_adapter),
            (Deployment::KIND, deployment_adapter),
        ];
        for (kind, factory) in builtins {
            // Built-in kinds are distinct
            let _ = registry.register(kind, factory);
        }
        registry
    }

    /// Register `factory` for `kind`; a kind can only be registered once
    pub fn register(&mut self, kind: &'static str, factory: AdapterFactory) -> Result<()> {
        if self.factories.contains_key(kind) {
            return Err(CoreError::DuplicateRegistration(kind.to_string()));
        }
        self.factories.insert(kind, factory);
        debug!("Registered adapter for kind: {}", kind);
        Ok(())
    }

    pub fn create(&self, kind: &str, client: Client) -> Result<Arc<dyn ResourceAdapter>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| CoreError::UnknownKind(kind.to_string()))?;
        Ok(factory(client))
    }

    /// Registered kinds in name order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

fn configmap_adapter(client: Client) -> Arc<dyn ResourceAdapter> {
    Arc::new(TypedAdapter::<ConfigMap>::new(client))
}

fn secret_adapter(client: Client) -> Arc<dyn ResourceAdapter> {
    Arc::new(TypedAdapter::<Secret>::new(client))
}

fn job_adapter(client: Client) -> Arc<dyn ResourceAdapter> {
    Arc::new(TypedAdapter::<Job>::new(client).with_scheduling(Arc::new(JobScheduling)))
}

fn deployment_adapter(client: Client) -> Arc<dyn ResourceAdapter> {
    Arc::new(TypedAdapter::<Deployment>::new(client).with_scheduling(Arc::new(DeploymentScheduling)))
}
