//! Object metadata the control plane owns

use federation_api::annotations::LAST_UPDATED_BY_USER;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Copy the metadata propagated to member clusters.
///
/// Everything else (uid, owner references, managed fields, timestamps) is
/// set by whichever store holds the object.
pub fn copy_relevant_meta(meta: &ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        name: meta.name.clone(),
        generate_name: meta.generate_name.clone(),
        namespace: meta.namespace.clone(),
        labels: meta.labels.clone(),
        annotations: meta.annotations.clone(),
        resource_version: meta.resource_version.clone(),
        ..Default::default()
    }
}

/// Compare name, namespace, labels and annotations. A missing map equals an
/// empty one; resource versions are ignored.
pub fn meta_equivalent(a: &ObjectMeta, b: &ObjectMeta) -> bool {
    a.name == b.name
        && a.namespace == b.namespace
        && map_equivalent(&a.labels, &b.labels)
        && map_equivalent(&a.annotations, &b.annotations)
}

fn map_equivalent(
    a: &Option<BTreeMap<String, String>>,
    b: &Option<BTreeMap<String, String>>,
) -> bool {
    non_empty(a) == non_empty(b)
}

/// `None` for a missing or empty map, so both compare equal
pub(crate) fn non_empty<T>(map: &Option<BTreeMap<String, T>>) -> Option<&BTreeMap<String, T>> {
    map.as_ref().filter(|m| !m.is_empty())
}

/// User recorded as the last one to change the object, if any
pub fn acting_user(meta: &ObjectMeta) -> Option<&str> {
    meta.annotations
        .as_ref()?
        .get(LAST_UPDATED_BY_USER)
        .map(String::as_str)
        .filter(|u| !u.is_empty())
}
