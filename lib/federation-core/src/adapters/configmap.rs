use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use crate::adapter::AdaptedKind;
use crate::meta::{copy_relevant_meta, non_empty};
use crate::object::FederatedObject;

impl AdaptedKind for ConfigMap {
    const KIND: &'static str = "configmap";

    fn into_object(self) -> FederatedObject {
        FederatedObject::ConfigMap(self)
    }

    fn from_object(obj: &FederatedObject) -> Option<&Self> {
        match obj {
            FederatedObject::ConfigMap(cm) => Some(cm),
            _ => None,
        }
    }

    fn copy_relevant(&self) -> Self {
        ConfigMap {
            metadata: copy_relevant_meta(&self.metadata),
            data: self.data.clone(),
            binary_data: self.binary_data.clone(),
            immutable: self.immutable,
        }
    }

    fn spec_equivalent(&self, other: &Self) -> bool {
        non_empty(&self.data) == non_empty(&other.data)
            && non_empty(&self.binary_data) == non_empty(&other.binary_data)
            && self.immutable == other.immutable
    }

    fn test_object(namespace: &str) -> Self {
        ConfigMap {
            metadata: ObjectMeta {
                generate_name: Some("test-configmap-".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("A".to_string(), "ala ma kota".to_string())])),
            ..Default::default()
        }
    }
}
