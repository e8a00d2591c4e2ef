use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

use crate::adapter::AdaptedKind;
use crate::meta::{copy_relevant_meta, non_empty};
use crate::object::FederatedObject;

impl AdaptedKind for Secret {
    const KIND: &'static str = "secret";

    fn into_object(self) -> FederatedObject {
        FederatedObject::Secret(self)
    }

    fn from_object(obj: &FederatedObject) -> Option<&Self> {
        match obj {
            FederatedObject::Secret(s) => Some(s),
            _ => None,
        }
    }

    fn copy_relevant(&self) -> Self {
        Secret {
            metadata: copy_relevant_meta(&self.metadata),
            data: self.data.clone(),
            string_data: self.string_data.clone(),
            type_: self.type_.clone(),
            immutable: self.immutable,
        }
    }

    fn spec_equivalent(&self, other: &Self) -> bool {
        non_empty(&self.data) == non_empty(&other.data)
            && non_empty(&self.string_data) == non_empty(&other.string_data)
            && self.type_ == other.type_
            && self.immutable == other.immutable
    }

    fn test_object(namespace: &str) -> Self {
        Secret {
            metadata: ObjectMeta {
                generate_name: Some("test-secret-".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "A".to_string(),
                ByteString(b"ala ma kota".to_vec()),
            )])),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        }
    }
}
