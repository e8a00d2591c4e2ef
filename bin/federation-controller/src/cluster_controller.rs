//! Cluster controller checking the health of registered member clusters

use federation_api::v1beta1::{ClusterCondition, ClusterStatus};
use federation_api::Cluster;
use futures::StreamExt;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use kube_runtime::{controller::Action, watcher, Controller};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::connections::ClusterConnections;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const RETRY_INTERVAL: Duration = Duration::from_secs(15);

const CONDITION_READY: &str = "Ready";
const CONDITION_OFFLINE: &str = "Offline";

#[derive(Debug)]
pub struct ReconcileError(pub String);

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reconciliation error: {}", self.0)
    }
}

impl Error for ReconcileError {}

struct Context {
    client: Client,
    connections: Arc<ClusterConnections>,
}

pub struct ClusterController {
    client: Client,
    connections: Arc<ClusterConnections>,
}

impl ClusterController {
    pub fn new(client: Client, connections: Arc<ClusterConnections>) -> Self {
        Self {
            client,
            connections,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Starting Cluster reconciliation");

        let clusters: Api<Cluster> = Api::all(self.client.clone());
        let context = Arc::new(Context {
            client: self.client.clone(),
            connections: self.connections.clone(),
        });

        let mut stream = Controller::new(clusters, watcher::Config::default())
            .run(reconcile, error_policy, context)
            .boxed();

        while let Some(item) = stream.next().await {
            match item {
                Ok((cluster, _)) => debug!("Reconciled Cluster {}", cluster.name),
                Err(e) => error!("Error in reconciliation stream: {}", e),
            }
        }

        Ok(())
    }
}

async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    debug!("Reconciling Cluster: {}", cluster.name());

    let condition = check_health(&cluster, &ctx.connections).await;
    if condition.type_ == CONDITION_OFFLINE {
        warn!(
            "Cluster {} is offline: {}",
            cluster.name(),
            condition.message.as_deref().unwrap_or_default()
        );
    }

    let status = status_with(cluster.status.as_ref(), condition);
    if cluster.status.as_ref() != Some(&status) {
        let api: Api<Cluster> = Api::all(ctx.client.clone());
        let patch = serde_json::json!({ "status": status });
        api.patch_status(cluster.name(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ReconcileError(format!("updating status of {}: {}", cluster.name(), e)))?;
        info!(
            "Cluster {} is now {}",
            cluster.name(),
            status.conditions[0].type_
        );
    }

    Ok(Action::requeue(HEALTH_CHECK_INTERVAL))
}

fn error_policy(cluster: Arc<Cluster>, e: &ReconcileError, _ctx: Arc<Context>) -> Action {
    error!("Error reconciling Cluster {}: {}", cluster.name(), e);
    Action::requeue(RETRY_INTERVAL)
}

/// Validate the registration, then reach the API server with the cluster's
/// own credentials
async fn check_health(cluster: &Cluster, connections: &ClusterConnections) -> ClusterCondition {
    if let Err(errors) = cluster.validate() {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return offline_condition("InvalidSpec", message);
    }

    let client = match connections.service_client(cluster).await {
        Ok(client) => client,
        Err(e) => return offline_condition("ConnectionFailed", format!("{:#}", e)),
    };

    client.limiter().acquire().await;
    match client.inner().apiserver_version().await {
        Ok(version) => ready_condition(format!(
            "API server {}.{} is reachable",
            version.major, version.minor
        )),
        Err(e) => offline_condition("Unreachable", e.to_string()),
    }
}

fn ready_condition(message: String) -> ClusterCondition {
    ClusterCondition {
        type_: CONDITION_READY.to_string(),
        status: "True".to_string(),
        reason: Some("ClusterReady".to_string()),
        message: Some(message),
    }
}

fn offline_condition(reason: &str, message: String) -> ClusterCondition {
    ClusterCondition {
        type_: CONDITION_OFFLINE.to_string(),
        status: "True".to_string(),
        reason: Some(reason.to_string()),
        message: Some(message),
    }
}

/// Status carrying only `condition`, keeping the reported zones and region
fn status_with(current: Option<&ClusterStatus>, condition: ClusterCondition) -> ClusterStatus {
    let current = current.cloned().unwrap_or_default();
    ClusterStatus {
        conditions: vec![condition],
        ..current
    }
}
