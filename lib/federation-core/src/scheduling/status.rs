//! Status folding helpers and write-back

use std::collections::BTreeMap;
use tracing::debug;

use super::SchedulingAdapter;
use crate::adapter::ResourceAdapter;
use crate::object::{FederatedObject, FederatedStatus, PerClusterStatus};
use crate::Result;

/// One report per cluster. A cluster reporting more than once keeps the
/// report with the greatest serialized form, whatever the input order.
pub(crate) fn by_cluster(statuses: &[PerClusterStatus]) -> BTreeMap<&str, &FederatedStatus> {
    let mut reports: BTreeMap<&str, (String, &FederatedStatus)> = BTreeMap::new();
    for s in statuses {
        let key = report_key(&s.status);
        match reports.get(s.cluster.as_str()) {
            Some((existing, _)) if *existing >= key => {}
            _ => {
                reports.insert(s.cluster.as_str(), (key, &s.status));
            }
        }
    }
    reports
        .into_iter()
        .map(|(cluster, (_, status))| (cluster, status))
        .collect()
}

fn report_key(status: &FederatedStatus) -> String {
    let encoded = match status {
        FederatedStatus::Job(s) => serde_json::to_string(s),
        FederatedStatus::Deployment(s) => serde_json::to_string(s),
    };
    encoded.unwrap_or_default()
}

/// Sum of the reported counts; `None` when no cluster reported one
pub(crate) fn sum_counts(counts: impl IntoIterator<Item = Option<i32>>) -> Option<i32> {
    counts
        .into_iter()
        .flatten()
        .fold(None, |total, n| Some(total.unwrap_or(0) + n))
}

/// Union of condition lists keeping, per condition type, the report with
/// the greatest `recency` key. The result is ordered by type.
pub(crate) fn merge_conditions<C, K, T, R>(conditions: C, type_of: T, recency: R) -> Vec<C::Item>
where
    C: IntoIterator,
    C::Item: Clone,
    T: Fn(&C::Item) -> &str,
    R: Fn(&C::Item) -> K,
    K: Ord,
{
    let mut merged: BTreeMap<String, C::Item> = BTreeMap::new();
    for condition in conditions {
        match merged.get(type_of(&condition)) {
            Some(existing) if recency(existing) >= recency(&condition) => {}
            _ => {
                merged.insert(type_of(&condition).to_string(), condition);
            }
        }
    }
    merged.into_values().collect()
}

/// The canonical object with its folded status, or `None` when the folded
/// status equals the current one
pub fn status_update(
    scheduling: &dyn SchedulingAdapter,
    canonical: &FederatedObject,
    statuses: &[PerClusterStatus],
) -> Result<Option<FederatedObject>> {
    let status = scheduling.aggregate_status(canonical, statuses)?;
    changed_status(scheduling, canonical, status)
}

fn changed_status(
    scheduling: &dyn SchedulingAdapter,
    canonical: &FederatedObject,
    status: FederatedStatus,
) -> Result<Option<FederatedObject>> {
    if scheduling.current_status(canonical)? == status {
        return Ok(None);
    }
    scheduling.with_status(canonical, status).map(Some)
}

/// Write `status` to the canonical object in the federation store.
///
/// Returns false without writing when it equals the current status, or when
/// the kind carries no scheduled status.
pub async fn update_status(
    adapter: &dyn ResourceAdapter,
    canonical: &FederatedObject,
    status: FederatedStatus,
) -> Result<bool> {
    let scheduling = match adapter.scheduling() {
        Some(s) => s,
        None => return Ok(false),
    };

    match changed_status(scheduling, canonical, status)? {
        Some(updated) => {
            debug!(
                "Writing back status of {} {}",
                adapter.kind(),
                canonical.qualified_name()
            );
            adapter.fed_update_status(&updated).await?;
            Ok(true)
        }
        None => {
            debug!(
                "Status of {} {} unchanged",
                adapter.kind(),
                canonical.qualified_name()
            );
            Ok(false)
        }
    }
}

/// Fold member statuses into the canonical object and write it back when
/// the folded status differs from the current one
pub async fn write_back_status(
    adapter: &dyn ResourceAdapter,
    canonical: &FederatedObject,
    statuses: &[PerClusterStatus],
) -> Result<bool> {
    let status = match adapter.scheduling() {
        Some(scheduling) => scheduling.aggregate_status(canonical, statuses)?,
        None => return Ok(false),
    };
    update_status(adapter, canonical, status).await
}
