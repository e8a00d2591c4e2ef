//! Adapters for the built-in kinds

pub mod configmap;
pub mod deployment;
pub mod job;
pub mod secret;

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub use deployment::DeploymentScheduling;
pub use job::JobScheduling;

/// Short-lived busybox pod labelled `foo=bar`, for test objects
fn test_pod_template(restart_policy: &str, command: &[&str]) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(BTreeMap::from([("foo".to_string(), "bar".to_string())])),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            termination_grace_period_seconds: Some(0),
            containers: vec![Container {
                name: "busybox".to_string(),
                image: Some("busybox".to_string()),
                command: Some(command.iter().map(|c| c.to_string()).collect()),
                ..Default::default()
            }],
            restart_policy: Some(restart_policy.to_string()),
            ..Default::default()
        }),
    }
}
