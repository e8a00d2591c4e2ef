//! Periodic propagation of canonical objects to member clusters

use anyhow::Result;
use federation_api::Cluster;
use federation_cluster::ClusterClient;
use federation_core::meta::acting_user;
use federation_core::scheduling::write_back_status;
use federation_core::{FederatedObject, PerClusterStatus, ResourceAdapter};
use kube::api::ListParams;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::connections::{ClusterConnections, PassConnections};

/// Outcome counts of one pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub objects: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct SyncController {
    adapters: Vec<Arc<dyn ResourceAdapter>>,
    connections: Arc<ClusterConnections>,
    interval: Duration,
}

impl SyncController {
    pub fn new(
        adapters: Vec<Arc<dyn ResourceAdapter>>,
        connections: Arc<ClusterConnections>,
        interval: Duration,
    ) -> Self {
        Self {
            adapters,
            connections,
            interval,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let kinds: Vec<&str> = self.adapters.iter().map(|a| a.kind()).collect();
        info!(
            "Starting federation sync of {:?} every {:?}",
            kinds, self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sync_pass().await {
                Ok(summary) => info!(
                    objects = summary.objects,
                    created = summary.created,
                    updated = summary.updated,
                    failed = summary.failed,
                    "Federation sync pass complete"
                ),
                Err(e) => error!("Federation sync pass failed: {:#}", e),
            }
        }
    }

    /// Bring every registered cluster in line with the federation store once
    pub async fn sync_pass(&self) -> Result<PassSummary> {
        let clusters = self.connections.clusters().await?;
        if clusters.is_empty() {
            debug!("No clusters registered, nothing to propagate");
        }

        let mut summary = PassSummary::default();
        let mut pass = PassConnections::new(&self.connections);
        for adapter in &self.adapters {
            let objects = match adapter.fed_list(None, &ListParams::default()).await {
                Ok(objects) => objects,
                Err(e) => {
                    warn!("Failed to list {} objects: {}", adapter.kind(), e);
                    summary.failed += 1;
                    continue;
                }
            };

            for canonical in objects {
                if canonical.meta().deletion_timestamp.is_some() {
                    debug!(
                        "Skipping {} {} being deleted",
                        adapter.kind(),
                        canonical.qualified_name()
                    );
                    continue;
                }
                summary.objects += 1;
                if let Err(e) = self
                    .sync_object(adapter.as_ref(), &canonical, &clusters, &mut pass, &mut summary)
                    .await
                {
                    warn!(
                        "Failed to sync {} {}: {:#}",
                        adapter.kind(),
                        canonical.qualified_name(),
                        e
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn sync_object(
        &self,
        adapter: &dyn ResourceAdapter,
        canonical: &FederatedObject,
        clusters: &[Cluster],
        pass: &mut PassConnections<'_>,
        summary: &mut PassSummary,
    ) -> Result<()> {
        let names: Vec<String> = clusters.iter().map(|c| c.name().to_string()).collect();
        let desired = desired_objects(adapter, canonical, &names)?;
        let user = acting_user(canonical.meta());

        let mut statuses = Vec::new();
        for cluster in clusters {
            let desired = match desired.get(cluster.name()) {
                Some(obj) => obj,
                None => continue,
            };
            let client = match pass.connect(cluster, user).await {
                Some(client) => client,
                None => {
                    debug!(
                        "Skipping cluster {} for {}, no connection",
                        cluster.name(),
                        canonical.qualified_name()
                    );
                    summary.failed += 1;
                    continue;
                }
            };

            match propagate(adapter, &client, desired, summary).await {
                Ok(current) => {
                    if let Some(status) = adapter.scheduling().and_then(|s| s.cluster_status(&current)) {
                        statuses.push(PerClusterStatus::new(cluster.name(), status));
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to propagate {} {} to cluster {}: {}",
                        adapter.kind(),
                        canonical.qualified_name(),
                        cluster.name(),
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        // A pass that reached no cluster leaves the last known status alone
        if !statuses.is_empty() {
            write_back_status(adapter, canonical, &statuses).await?;
        }
        Ok(())
    }
}

/// Create or update the cluster's copy, returning what the cluster holds
/// afterwards
async fn propagate(
    adapter: &dyn ResourceAdapter,
    client: &ClusterClient,
    desired: &FederatedObject,
    summary: &mut PassSummary,
) -> federation_core::Result<FederatedObject> {
    let name = desired.qualified_name();
    match adapter.cluster_get(client, &name).await {
        Ok(existing) => match update_for(adapter, desired, &existing) {
            Some(update) => {
                let rescheduled = adapter
                    .scheduling()
                    .map(|s| s.equivalent_ignoring_schedule(desired, &existing))
                    .unwrap_or(false);
                info!(
                    "Updating {} {} in cluster {}{}",
                    adapter.kind(),
                    name,
                    client.cluster_name(),
                    if rescheduled { " (rescheduled)" } else { "" }
                );
                let updated = adapter.cluster_update(client, &update).await?;
                summary.updated += 1;
                Ok(updated)
            }
            None => Ok(existing),
        },
        Err(e) if e.is_not_found() => {
            info!(
                "Creating {} {} in cluster {}",
                adapter.kind(),
                name,
                client.cluster_name()
            );
            let mut obj = desired.clone();
            obj.meta_mut().resource_version = None;
            let created = adapter.cluster_create(client, &obj).await?;
            summary.created += 1;
            Ok(created)
        }
        Err(e) => Err(e),
    }
}

/// Per-cluster copies of `canonical`, scheduled when the kind supports it.
/// Unusable preferences fall back to full copies everywhere.
pub fn desired_objects(
    adapter: &dyn ResourceAdapter,
    canonical: &FederatedObject,
    clusters: &[String],
) -> federation_core::Result<BTreeMap<String, FederatedObject>> {
    let scheduling = match adapter.scheduling() {
        Some(s) => s,
        None => {
            let copy = adapter.copy(canonical)?;
            return Ok(clusters
                .iter()
                .map(|cluster| (cluster.clone(), copy.clone()))
                .collect());
        }
    };

    let preferences = scheduling.preferences(canonical).unwrap_or_else(|e| {
        warn!(
            "Ignoring scheduling preferences of {} {}: {}",
            adapter.kind(),
            canonical.qualified_name(),
            e
        );
        None
    });
    scheduling.schedule_object(canonical, preferences.as_ref(), clusters)
}

/// The update to send when `existing` differs from `desired`, carrying the
/// cluster's resource version
pub fn update_for(
    adapter: &dyn ResourceAdapter,
    desired: &FederatedObject,
    existing: &FederatedObject,
) -> Option<FederatedObject> {
    if adapter.equivalent(desired, existing) {
        return None;
    }
    let mut update = desired.clone();
    update.meta_mut().resource_version = existing.meta().resource_version.clone();
    Some(update)
}
