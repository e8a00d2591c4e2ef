//! Per-cluster scheduling of placement-sensitive fields

pub mod planner;
pub mod preferences;
pub mod status;

use std::collections::BTreeMap;

use crate::object::{FederatedObject, FederatedStatus, PerClusterStatus};
use crate::Result;

pub use planner::plan;
pub use preferences::{ClusterPreferences, SchedulingPreferences, WILDCARD};
pub use status::{status_update, update_status, write_back_status};

/// Placement customization for kinds whose objects are split across
/// clusters rather than copied verbatim
pub trait SchedulingAdapter: Send + Sync {
    /// Annotation holding the kind's scheduling preferences
    fn preferences_annotation(&self) -> &'static str;

    /// Preferences attached to `canonical`, `None` when it carries none
    fn preferences(&self, canonical: &FederatedObject) -> Result<Option<SchedulingPreferences>> {
        SchedulingPreferences::from_meta(canonical.meta(), self.preferences_annotation())
    }

    /// Per-cluster copies of `canonical` with the scheduled fields replaced
    /// by each cluster's share. Without preferences every cluster gets the
    /// full value.
    fn schedule_object(
        &self,
        canonical: &FederatedObject,
        preferences: Option<&SchedulingPreferences>,
        clusters: &[String],
    ) -> Result<BTreeMap<String, FederatedObject>>;

    /// Equivalence that disregards the scheduled fields
    fn equivalent_ignoring_schedule(&self, a: &FederatedObject, b: &FederatedObject) -> bool;

    /// Status reported by a member cluster's copy
    fn cluster_status(&self, obj: &FederatedObject) -> Option<FederatedStatus>;

    /// Current status of the canonical object
    fn current_status(&self, canonical: &FederatedObject) -> Result<FederatedStatus>;

    /// Fold the statuses of all clusters hosting `canonical`
    fn aggregate_status(
        &self,
        canonical: &FederatedObject,
        statuses: &[PerClusterStatus],
    ) -> Result<FederatedStatus>;

    /// Copy of `canonical` carrying `status`
    fn with_status(
        &self,
        canonical: &FederatedObject,
        status: FederatedStatus,
    ) -> Result<FederatedObject>;
}
