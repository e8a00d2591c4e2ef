//! Jobs, split across clusters on parallelism and completions

use federation_api::annotations::JOB_PREFERENCES;
use k8s_openapi::api::batch::v1::{Job, JobSpec, JobStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use super::test_pod_template;
use crate::adapter::{typed, AdaptedKind};
use crate::meta::{copy_relevant_meta, meta_equivalent};
use crate::object::{FederatedObject, FederatedStatus, PerClusterStatus};
use crate::scheduling::status::{by_cluster, merge_conditions, sum_counts};
use crate::scheduling::{plan, SchedulingAdapter, SchedulingPreferences};
use crate::{CoreError, Result};

/// Labels the job controller adds to pod templates
const GENERATED_LABELS: &[&str] = &[
    "controller-uid",
    "job-name",
    "batch.kubernetes.io/controller-uid",
    "batch.kubernetes.io/job-name",
];

impl AdaptedKind for Job {
    const KIND: &'static str = "job";

    fn into_object(self) -> FederatedObject {
        FederatedObject::Job(self)
    }

    fn from_object(obj: &FederatedObject) -> Option<&Self> {
        match obj {
            FederatedObject::Job(job) => Some(job),
            _ => None,
        }
    }

    fn copy_relevant(&self) -> Self {
        Job {
            metadata: copy_relevant_meta(&self.metadata),
            spec: self.spec.clone(),
            status: None,
        }
    }

    /// Selectors and pod labels generated by each cluster's job controller
    /// are disregarded
    fn spec_equivalent(&self, other: &Self) -> bool {
        without_generated(&self.spec) == without_generated(&other.spec)
    }

    fn test_object(namespace: &str) -> Self {
        Job {
            metadata: ObjectMeta {
                generate_name: Some("test-job-".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                parallelism: Some(3),
                completions: Some(3),
                template: test_pod_template("Never", &["echo", "Hello federated jobs!"]),
                ..Default::default()
            }),
            status: None,
        }
    }
}

fn without_generated(spec: &Option<JobSpec>) -> Option<JobSpec> {
    let mut spec = spec.clone()?;
    if spec.manual_selector != Some(true) {
        spec.selector = None;
    }
    if let Some(meta) = spec.template.metadata.as_mut() {
        if let Some(labels) = meta.labels.as_mut() {
            for key in GENERATED_LABELS {
                labels.remove(*key);
            }
            if labels.is_empty() {
                meta.labels = None;
            }
        }
    }
    Some(spec)
}

/// Scheduling of jobs across clusters
#[derive(Clone, Copy, Debug, Default)]
pub struct JobScheduling;

impl SchedulingAdapter for JobScheduling {
    fn preferences_annotation(&self) -> &'static str {
        JOB_PREFERENCES
    }

    fn schedule_object(
        &self,
        canonical: &FederatedObject,
        preferences: Option<&SchedulingPreferences>,
        clusters: &[String],
    ) -> Result<BTreeMap<String, FederatedObject>> {
        let base = typed::<Job>(canonical)?.copy_relevant();

        let preferences = match preferences {
            Some(p) => p,
            None => {
                return Ok(clusters
                    .iter()
                    .map(|c| (c.clone(), base.clone().into_object()))
                    .collect())
            }
        };

        let spec = base.spec.clone().unwrap_or_default();
        let parallelism = plan(i64::from(spec.parallelism.unwrap_or(1)), preferences, clusters);
        let completions = spec
            .completions
            .map(|c| plan(i64::from(c), preferences, clusters));

        Ok(clusters
            .iter()
            .map(|cluster| {
                let mut job = base.clone();
                let spec = job.spec.get_or_insert_with(Default::default);
                spec.parallelism = Some(share(&parallelism, cluster));
                if let Some(completions) = &completions {
                    spec.completions = Some(share(completions, cluster));
                }
                (cluster.clone(), job.into_object())
            })
            .collect())
    }

    fn equivalent_ignoring_schedule(&self, a: &FederatedObject, b: &FederatedObject) -> bool {
        let (a, b) = match (Job::from_object(a), Job::from_object(b)) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };

        let mut b = b.copy_relevant();
        if let (Some(a_spec), Some(b_spec)) = (a.spec.as_ref(), b.spec.as_mut()) {
            b_spec.parallelism = a_spec.parallelism;
            b_spec.completions = a_spec.completions;
            b_spec.manual_selector = a_spec.manual_selector;
        }
        meta_equivalent(&a.metadata, &b.metadata) && a.spec_equivalent(&b)
    }

    fn cluster_status(&self, obj: &FederatedObject) -> Option<FederatedStatus> {
        Job::from_object(obj).map(|job| FederatedStatus::Job(job.status.clone().unwrap_or_default()))
    }

    fn current_status(&self, canonical: &FederatedObject) -> Result<FederatedStatus> {
        let job = typed::<Job>(canonical)?;
        Ok(FederatedStatus::Job(job.status.clone().unwrap_or_default()))
    }

    /// Counters are summed and conditions merged per type. The start time is
    /// the earliest reported; the completion time the latest, once every
    /// cluster has completed its share.
    fn aggregate_status(
        &self,
        canonical: &FederatedObject,
        statuses: &[PerClusterStatus],
    ) -> Result<FederatedStatus> {
        typed::<Job>(canonical)?;

        let reports: Vec<&JobStatus> = by_cluster(statuses)
            .into_values()
            .filter_map(|s| match s {
                FederatedStatus::Job(status) => Some(status),
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
                    c.last_transition_time.as_ref().map(|t| t.0),
                    c.status.clone(),
                    c.reason.clone(),
                    c.message.clone(),
                )
            },
        );

        let all_completed =
            !reports.is_empty() && reports.iter().all(|s| s.completion_time.is_some());

        Ok(FederatedStatus::Job(JobStatus {
            active: sum_counts(reports.iter().map(|s| s.active)),
            succeeded: sum_counts(reports.iter().map(|s| s.succeeded)),
            failed: sum_counts(reports.iter().map(|s| s.failed)),
            ready: sum_counts(reports.iter().map(|s| s.ready)),
            conditions: if conditions.is_empty() {
                None
            } else {
                Some(conditions)
            },
            start_time: reports
                .iter()
                .filter_map(|s| s.start_time.clone())
                .min_by_key(|t| t.0),
            completion_time: if all_completed {
                reports
                    .iter()
                    .filter_map(|s| s.completion_time.clone())
                    .max_by_key(|t| t.0)
            } else {
                None
            },
            ..Default::default()
        }))
    }

    fn with_status(
        &self,
        canonical: &FederatedObject,
        status: FederatedStatus,
    ) -> Result<FederatedObject> {
        let mut job = typed::<Job>(canonical)?.clone();
        match status {
            FederatedStatus::Job(status) => job.status = Some(status),
            other => {
                return Err(CoreError::UnexpectedType {
                    expected: "JobStatus".to_string(),
                    actual: other.type_name(),
                })
            }
        }
        Ok(job.into_object())
    }
}

fn share(plan: &BTreeMap<String, i64>, cluster: &str) -> i32 {
    plan.get(cluster)
        .map(|&n| i32::try_from(n).unwrap_or(i32::MAX))
        .unwrap_or(0)
}
