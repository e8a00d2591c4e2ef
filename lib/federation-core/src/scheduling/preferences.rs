//! Scheduling preferences carried in an annotation

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::{CoreError, Result};

/// Key of the entry applying to clusters without one of their own
pub const WILDCARD: &str = "*";

/// Placement hints for one cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPreferences {
    #[serde(default)]
    pub weight: i64,

    #[serde(default, alias = "minReplicas")]
    pub min: i64,

    #[serde(default, alias = "maxReplicas")]
    pub max: Option<i64>,
}

/// Per-cluster placement hints, keyed by cluster name or `*`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SchedulingPreferences {
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterPreferences>,
}

impl SchedulingPreferences {
    /// Parse a JSON or YAML annotation value
    pub fn parse(annotation: &str, value: &str) -> Result<Self> {
        let invalid = |reason: String| CoreError::InvalidPreferences {
            annotation: annotation.to_string(),
            reason,
        };
        let prefs: SchedulingPreferences =
            serde_yaml::from_str(value).map_err(|e| invalid(e.to_string()))?;
        prefs.validate().map_err(invalid)?;
        Ok(prefs)
    }

    /// Preferences attached to an object under `annotation`, `None` when the
    /// object carries none
    pub fn from_meta(meta: &ObjectMeta, annotation: &str) -> Result<Option<Self>> {
        match meta.annotations.as_ref().and_then(|a| a.get(annotation)) {
            Some(value) => Self::parse(annotation, value).map(Some),
            None => Ok(None),
        }
    }

    /// Preferences for `cluster`, falling back to the wildcard entry
    pub fn for_cluster(&self, cluster: &str) -> Option<&ClusterPreferences> {
        self.clusters
            .get(cluster)
            .or_else(|| self.clusters.get(WILDCARD))
    }

    fn validate(&self) -> std::result::Result<(), String> {
        for (name, prefs) in &self.clusters {
            if name.is_empty() {
                return Err("cluster name must not be empty".to_string());
            }
            if prefs.weight < 0 {
                return Err(format!("weight for {} must not be negative", name));
            }
            if prefs.min < 0 {
                return Err(format!("min for {} must not be negative", name));
            }
            if let Some(max) = prefs.max {
                if max < prefs.min {
                    return Err(format!("min for {} exceeds max", name));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANNOTATION: &str = "federation.kubernetes.io/job-preferences";

    #[test]
    fn test_parse_json() {
        let prefs = SchedulingPreferences::parse(
            ANNOTATION,
            r#"{"clusters": {"clusterA": {"weight": 2}, "*": {"weight": 1, "minReplicas": 1, "maxReplicas": 4}}}"#,
        )
        .unwrap();
        assert_eq!(prefs.clusters["clusterA"].weight, 2);
        assert_eq!(prefs.for_cluster("clusterB").unwrap().min, 1);
        assert_eq!(prefs.for_cluster("clusterB").unwrap().max, Some(4));
    }

    #[test]
    fn test_parse_yaml() {
        let prefs = SchedulingPreferences::parse(
            ANNOTATION,
            "clusters:\n  clusterA:\n    weight: 3\n    min: 1\n",
        )
        .unwrap();
        assert_eq!(
            prefs.clusters["clusterA"],
            ClusterPreferences {
                weight: 3,
                min: 1,
                max: None,
            }
        );
        assert!(prefs.for_cluster("clusterB").is_none());
    }

    #[test]
    fn test_rejects_invalid() {
        for value in [
            r#"{"clusters": {"a": {"weight": -1}}}"#,
            r#"{"clusters": {"a": {"min": 3, "max": 2}}}"#,
            r#"{"clusters": {"": {"weight": 1}}}"#,
            "clusters: [",
        ] {
            let err = SchedulingPreferences::parse(ANNOTATION, value).unwrap_err();
            assert!(matches!(err, CoreError::InvalidPreferences { .. }), "{}", value);
        }
    }

    #[test]
    fn test_absent_annotation() {
        assert_eq!(
            SchedulingPreferences::from_meta(&ObjectMeta::default(), ANNOTATION).unwrap(),
            None
        );
    }
}
