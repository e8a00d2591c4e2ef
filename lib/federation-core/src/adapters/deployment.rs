//! Deployments, split across clusters on replicas

use federation_api::annotations::DEPLOYMENT_PREFERENCES;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

use super::test_pod_template;
use crate::adapter::{typed, AdaptedKind};
use crate::meta::{copy_relevant_meta, meta_equivalent};
use crate::object::{FederatedObject, FederatedStatus, PerClusterStatus};
use crate::scheduling::status::{by_cluster, merge_conditions, sum_counts};
use crate::scheduling::{plan, SchedulingAdapter, SchedulingPreferences};
use crate::{CoreError, Result};

impl AdaptedKind for Deployment {
    const KIND: &'static str = "deployment";

    fn into_object(self) -> FederatedObject {
        FederatedObject::Deployment(self)
    }

    fn from_object(obj: &FederatedObject) -> Option<&Self> {
        match obj {
            FederatedObject::Deployment(d) => Some(d),
            _ => None,
        }
    }

    fn copy_relevant(&self) -> Self {
        Deployment {
            metadata: copy_relevant_meta(&self.metadata),
            spec: self.spec.clone(),
            status: None,
        }
    }

    fn spec_equivalent(&self, other: &Self) -> bool {
        self.spec == other.spec
    }

    fn test_object(namespace: &str) -> Self {
        Deployment {
            metadata: ObjectMeta {
                generate_name: Some("test-deployment-".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([("foo".to_string(), "bar".to_string())])),
                    ..Default::default()
                },
                template: test_pod_template("Always", &["sleep", "3600"]),
                ..Default::default()
            }),
            status: None,
        }
    }
}

/// Scheduling of deployment replicas across clusters
#[derive(Clone, Copy, Debug, Default)]
pub struct DeploymentScheduling;

impl SchedulingAdapter for DeploymentScheduling {
    fn preferences_annotation(&self) -> &'static str {
        DEPLOYMENT_PREFERENCES
    }

    fn schedule_object(
        &self,
        canonical: &FederatedObject,
        preferences: Option<&SchedulingPreferences>,
        clusters: &[String],
    ) -> Result<BTreeMap<String, FederatedObject>> {
        let base = typed::<Deployment>(canonical)?.copy_relevant();
        let replicas = base.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let shares = preferences.map(|p| plan(i64::from(replicas), p, clusters));

        Ok(clusters
            .iter()
            .map(|cluster| {
                let mut deployment = base.clone();
                if let Some(shares) = &shares {
                    let share = shares.get(cluster).copied().unwrap_or(0);
                    deployment.spec.get_or_insert_with(Default::default).replicas =
                        Some(i32::try_from(share).unwrap_or(i32::MAX));
                }
                (cluster.clone(), deployment.into_object())
            })
            .collect())
    }

    fn equivalent_ignoring_schedule(&self, a: &FederatedObject, b: &FederatedObject) -> bool {
        let (a, b) = match (Deployment::from_object(a), Deployment::from_object(b)) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };

        let mut b = b.copy_relevant();
        if let (Some(a_spec), Some(b_spec)) = (a.spec.as_ref(), b.spec.as_mut()) {
            b_spec.replicas = a_spec.replicas;
        }
        meta_equivalent(&a.metadata, &b.metadata) && a.spec_equivalent(&b)
    }

    fn cluster_status(&self, obj: &FederatedObject) -> Option<FederatedStatus> {
        Deployment::from_object(obj)
            .map(|d| FederatedStatus::Deployment(d.status.clone().unwrap_or_default()))
    }

    fn current_status(&self, canonical: &FederatedObject) -> Result<FederatedStatus> {
        let deployment = typed::<Deployment>(canonical)?;
        Ok(FederatedStatus::Deployment(
            deployment.status.clone().unwrap_or_default(),
        ))
    }

    /// Replica counters are summed and conditions merged per type. The
    /// observed generation is the canonical object's own.
    fn aggregate_status(
        &self,
        canonical: &FederatedObject,
        statuses: &[PerClusterStatus],
    ) -> Result<FederatedStatus> {
        let deployment = typed::<Deployment>(canonical)?;

        let reports: Vec<&DeploymentStatus> = by_cluster(statuses)
            .into_values()
            .filter_map(|s| match s {
                FederatedStatus::Deployment(status) => Some(status),
                _ => None,
            })
            .collect();

        let conditions = merge_conditions(
            reports
                .iter()
                .flat_map(|s| s.conditions.iter().flatten())
                .cloned(),
            |c| c.type_.as_str(),
            |c| {
                (
                    c.last_update_time.as_ref().map(|t| t.0),
                    c.last_transition_time.as_ref().map(|t| t.0),
                    c.status.clone(),
                    c.reason.clone(),
                    c.message.clone(),
                )
            },
        );

        Ok(FederatedStatus::Deployment(DeploymentStatus {
            replicas: sum_counts(reports.iter().map(|s| s.replicas)),
            updated_replicas: sum_counts(reports.iter().map(|s| s.updated_replicas)),
            ready_replicas: sum_counts(reports.iter().map(|s| s.ready_replicas)),
            available_replicas: sum_counts(reports.iter().map(|s| s.available_replicas)),
            unavailable_replicas: sum_counts(reports.iter().map(|s| s.unavailable_replicas)),
            conditions: if conditions.is_empty() {
                None
            } else {
                Some(conditions)
            },
            observed_generation: if reports.is_empty() {
                deployment.status.as_ref().and_then(|s| s.observed_generation)
            } else {
                deployment.metadata.generation
            },
            ..Default::default()
        }))
    }

    fn with_status(
        &self,
        canonical: &FederatedObject,
        status: FederatedStatus,
    ) -> Result<FederatedObject> {
        let mut deployment = typed::<Deployment>(canonical)?.clone();
        match status {
            FederatedStatus::Deployment(status) => deployment.status = Some(status),
            other => {
                return Err(CoreError::UnexpectedType {
                    expected: "DeploymentStatus".to_string(),
                    actual: other.type_name(),
                })
            }
        }
        Ok(deployment.into_object())
    }
}
