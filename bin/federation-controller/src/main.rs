use anyhow::{Context, Result};
use federation_cluster::ClusterConnectionResolver;
use federation_core::AdapterRegistry;
use federation_identity::{IdentityProviderRegistry, ProviderContext};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cluster_controller;
mod config;
mod connections;
mod sync_controller;

use cluster_controller::ClusterController;
use config::{ControllerConfig, LogFormat, PROVIDER_SYNC_TIMEOUT};
use connections::{client_from, ClusterConnections};
use sync_controller::SyncController;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting federation-controller in namespace {}", config.namespace);

    let federation = client_from(config.federation_kubeconfig.as_deref())
        .await
        .context("connecting to the federation API")?;
    let host = client_from(config.host_kubeconfig.as_deref())
        .await
        .context("connecting to the host cluster")?;

    let providers = IdentityProviderRegistry::builtin()?.install()?;
    info!(
        "Registered identity providers: {:?}",
        providers.registered_providers()
    );
    let provider = providers
        .init_identity_provider(
            &config.identity_provider,
            config.identity_provider_config.as_deref(),
            ProviderContext {
                client: Some(host.clone()),
                namespace: config.namespace.clone(),
                config: None,
            },
        )
        .await?;
    if let Some(provider) = &provider {
        provider.wait_for_sync(PROVIDER_SYNC_TIMEOUT).await?;
        info!("Identity provider {} is synced", provider.name());
    }

    let adapters = AdapterRegistry::builtin();
    let kinds: Vec<String> = match &config.kinds {
        Some(kinds) => kinds.clone(),
        None => adapters.kinds().into_iter().map(String::from).collect(),
    };
    let adapters = kinds
        .iter()
        .map(|kind| adapters.create(kind, federation.clone()))
        .collect::<federation_core::Result<Vec<_>>>()?;

    let resolver = ClusterConnectionResolver::new(config.resolver_config());
    let connections = Arc::new(ClusterConnections::new(
        federation.clone(),
        host,
        resolver,
        provider,
    ));

    let cluster_controller = ClusterController::new(federation.clone(), connections.clone());
    tokio::spawn(async move {
        if let Err(e) = cluster_controller.run().await {
            error!("Cluster controller error: {}", e);
        }
    });

    let sync_controller = SyncController::new(adapters, connections, config.sync_interval);
    tokio::spawn(async move {
        if let Err(e) = sync_controller.run().await {
            error!("Sync controller error: {}", e);
        }
    });

    // Keep the process alive
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");

    Ok(())
}
