//! Objects handled by resource adapters

use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;

use crate::QualifiedName;

/// An object of any kind the control plane propagates
#[derive(Clone, Debug, PartialEq)]
pub enum FederatedObject {
    ConfigMap(ConfigMap),
    Secret(Secret),
    Job(Job),
    Deployment(Deployment),
}

impl FederatedObject {
    /// Kubernetes kind name of the wrapped object
    pub fn type_name(&self) -> &'static str {
        match self {
            FederatedObject::ConfigMap(_) => "ConfigMap",
            FederatedObject::Secret(_) => "Secret",
            FederatedObject::Job(_) => "Job",
            FederatedObject::Deployment(_) => "Deployment",
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            FederatedObject::ConfigMap(o) => o.meta(),
            FederatedObject::Secret(o) => o.meta(),
            FederatedObject::Job(o) => o.meta(),
            FederatedObject::Deployment(o) => o.meta(),
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            FederatedObject::ConfigMap(o) => o.meta_mut(),
            FederatedObject::Secret(o) => o.meta_mut(),
            FederatedObject::Job(o) => o.meta_mut(),
            FederatedObject::Deployment(o) => o.meta_mut(),
        }
    }

    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::from_meta(self.meta())
    }
}

/// Status of an object as reported by one cluster, or folded over all of them
#[derive(Clone, Debug, PartialEq)]
pub enum FederatedStatus {
    Job(JobStatus),
    Deployment(DeploymentStatus),
}

impl FederatedStatus {
    pub fn type_name(&self) -> &'static str {
        match self {
            FederatedStatus::Job(_) => "JobStatus",
            FederatedStatus::Deployment(_) => "DeploymentStatus",
        }
    }
}

/// Status observed on one member cluster
#[derive(Clone, Debug, PartialEq)]
pub struct PerClusterStatus {
    pub cluster: String,
    pub status: FederatedStatus,
}

impl PerClusterStatus {
    pub fn new(cluster: impl Into<String>, status: FederatedStatus) -> Self {
        Self {
            cluster: cluster.into(),
            status,
        }
    }
}
