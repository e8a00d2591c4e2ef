//! Uniform access to one resource kind in the federation store and in
//! member clusters

use async_trait::async_trait;
use federation_cluster::ClusterClient;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, PostParams, WatchEvent, WatchParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::meta::meta_equivalent;
use crate::object::FederatedObject;
use crate::scheduling::SchedulingAdapter;
use crate::{CoreError, QualifiedName, Result};

/// Watch events of one kind, mapped into [`FederatedObject`]s
pub type ObjectEventStream = BoxStream<'static, Result<WatchEvent<FederatedObject>>>;

/// Strategy object for one resource kind.
///
/// Adapters hold no per-cluster state: member cluster operations take the
/// cluster's client explicitly. Store errors are returned as they are; no
/// operation retries.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Stable identifier of the managed kind
    fn kind(&self) -> &'static str;

    fn is_expected_type(&self, obj: &FederatedObject) -> bool;

    /// Copy holding only the metadata and spec the control plane owns
    fn copy(&self, obj: &FederatedObject) -> Result<FederatedObject>;

    /// Same relevant metadata and spec
    fn equivalent(&self, a: &FederatedObject, b: &FederatedObject) -> bool;

    fn qualified_name(&self, obj: &FederatedObject) -> QualifiedName {
        obj.qualified_name()
    }

    fn object_meta<'a>(&self, obj: &'a FederatedObject) -> &'a ObjectMeta {
        obj.meta()
    }

    /// Minimal valid object for conformance testing
    fn new_test_object(&self, namespace: &str) -> FederatedObject;

    /// Scheduling support, for kinds split across clusters
    fn scheduling(&self) -> Option<&dyn SchedulingAdapter> {
        None
    }

    async fn fed_create(&self, obj: &FederatedObject) -> Result<FederatedObject>;

    async fn fed_get(&self, name: &QualifiedName) -> Result<FederatedObject>;

    /// List in `namespace`, or in all namespaces
    async fn fed_list(
        &self,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<FederatedObject>>;

    async fn fed_update(&self, obj: &FederatedObject) -> Result<FederatedObject>;

    /// Replace the status subresource; only meaningful for kinds with one
    async fn fed_update_status(&self, obj: &FederatedObject) -> Result<FederatedObject>;

    async fn fed_delete(&self, name: &QualifiedName, params: &DeleteParams) -> Result<()>;

    async fn fed_watch(
        &self,
        namespace: Option<&str>,
        params: &WatchParams,
        version: &str,
    ) -> Result<ObjectEventStream>;

    async fn cluster_create(
        &self,
        client: &ClusterClient,
        obj: &FederatedObject,
    ) -> Result<FederatedObject>;

    async fn cluster_get(
        &self,
        client: &ClusterClient,
        name: &QualifiedName,
    ) -> Result<FederatedObject>;

    async fn cluster_list(
        &self,
        client: &ClusterClient,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<FederatedObject>>;

    async fn cluster_update(
        &self,
        client: &ClusterClient,
        obj: &FederatedObject,
    ) -> Result<FederatedObject>;

    async fn cluster_delete(
        &self,
        client: &ClusterClient,
        name: &QualifiedName,
        params: &DeleteParams,
    ) -> Result<()>;

    async fn cluster_watch(
        &self,
        client: &ClusterClient,
        namespace: Option<&str>,
        params: &WatchParams,
        version: &str,
    ) -> Result<ObjectEventStream>;
}

/// Kind-specific behavior behind a [`TypedAdapter`]
pub trait AdaptedKind:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Identifier used to register and select the adapter
    const KIND: &'static str;

    fn into_object(self) -> FederatedObject;

    fn from_object(obj: &FederatedObject) -> Option<&Self>;

    /// Copy of the relevant metadata and spec, without status
    fn copy_relevant(&self) -> Self;

    fn spec_equivalent(&self, other: &Self) -> bool;

    fn test_object(namespace: &str) -> Self;
}

/// Typed view of an object, failing for any other kind
pub fn typed<K: AdaptedKind>(obj: &FederatedObject) -> Result<&K> {
    K::from_object(obj).ok_or_else(|| CoreError::UnexpectedType {
        expected: K::kind(&()).into_owned(),
        actual: obj.type_name(),
    })
}

/// ResourceAdapter for any [`AdaptedKind`]
pub struct TypedAdapter<K> {
    client: Client,
    scheduling: Option<Arc<dyn SchedulingAdapter>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: AdaptedKind> TypedAdapter<K> {
    /// Adapter using `client` for the federation store
    pub fn new(client: Client) -> Self {
        Self {
            client,
            scheduling: None,
            _kind: PhantomData,
        }
    }

    pub fn with_scheduling(mut self, scheduling: Arc<dyn SchedulingAdapter>) -> Self {
        self.scheduling = Some(scheduling);
        self
    }

    fn fed_api(&self, namespace: Option<&str>) -> Api<K> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), namespace_or_default(ns)),
            None => Api::all(self.client.clone()),
        }
    }

    async fn cluster_api(&self, client: &ClusterClient, namespace: Option<&str>) -> Api<K> {
        match namespace {
            Some(ns) => client.namespaced(namespace_or_default(ns)).await,
            None => client.all().await,
        }
    }
}

fn namespace_or_default(namespace: &str) -> &str {
    if namespace.is_empty() {
        "default"
    } else {
        namespace
    }
}

fn namespace_of<K: AdaptedKind>(obj: &K) -> &str {
    obj.meta().namespace.as_deref().unwrap_or_default()
}

fn name_of<K: AdaptedKind>(obj: &K) -> String {
    obj.meta().name.clone().unwrap_or_default()
}

fn map_event<K: AdaptedKind>(event: WatchEvent<K>) -> WatchEvent<FederatedObject> {
    match event {
        WatchEvent::Added(o) => WatchEvent::Added(o.into_object()),
        WatchEvent::Modified(o) => WatchEvent::Modified(o.into_object()),
        WatchEvent::Deleted(o) => WatchEvent::Deleted(o.into_object()),
        WatchEvent::Bookmark(b) => WatchEvent::Bookmark(b),
        WatchEvent::Error(e) => WatchEvent::Error(e),
    }
}

async fn create<K: AdaptedKind>(api: Api<K>, obj: &K) -> Result<FederatedObject> {
    Ok(api.create(&PostParams::default(), obj).await?.into_object())
}

async fn get<K: AdaptedKind>(api: Api<K>, name: &QualifiedName) -> Result<FederatedObject> {
    Ok(api.get(&name.name).await?.into_object())
}

async fn list<K: AdaptedKind>(api: Api<K>, params: &ListParams) -> Result<Vec<FederatedObject>> {
    let list = api.list(params).await?;
    Ok(list.items.into_iter().map(K::into_object).collect())
}

async fn update<K: AdaptedKind>(api: Api<K>, obj: &K) -> Result<FederatedObject> {
    Ok(api
        .replace(&name_of(obj), &PostParams::default(), obj)
        .await?
        .into_object())
}

async fn delete<K: AdaptedKind>(api: Api<K>, name: &QualifiedName, params: &DeleteParams) -> Result<()> {
    api.delete(&name.name, params).await?;
    Ok(())
}

async fn watch<K: AdaptedKind>(
    api: Api<K>,
    params: &WatchParams,
    version: &str,
) -> Result<ObjectEventStream> {
    let events = api.watch(params, version).await?;
    Ok(events
        .map_ok(map_event::<K>)
        .map_err(CoreError::from)
        .boxed())
}

#[async_trait]
impl<K: AdaptedKind> ResourceAdapter for TypedAdapter<K> {
    fn kind(&self) -> &'static str {
        K::KIND
    }

    fn is_expected_type(&self, obj: &FederatedObject) -> bool {
        K::from_object(obj).is_some()
    }

    fn copy(&self, obj: &FederatedObject) -> Result<FederatedObject> {
        Ok(typed::<K>(obj)?.copy_relevant().into_object())
    }

    fn equivalent(&self, a: &FederatedObject, b: &FederatedObject) -> bool {
        match (K::from_object(a), K::from_object(b)) {
            (Some(a), Some(b)) => meta_equivalent(a.meta(), b.meta()) && a.spec_equivalent(b),
            _ => false,
        }
    }

    fn new_test_object(&self, namespace: &str) -> FederatedObject {
        K::test_object(namespace).into_object()
    }

    fn scheduling(&self) -> Option<&dyn SchedulingAdapter> {
        self.scheduling.as_deref()
    }

    async fn fed_create(&self, obj: &FederatedObject) -> Result<FederatedObject> {
        let obj = typed::<K>(obj)?;
        create(self.fed_api(Some(namespace_of(obj))), obj).await
    }

    async fn fed_get(&self, name: &QualifiedName) -> Result<FederatedObject> {
        get(self.fed_api(Some(&name.namespace)), name).await
    }

    async fn fed_list(
        &self,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<FederatedObject>> {
        list(self.fed_api(namespace), params).await
    }

    async fn fed_update(&self, obj: &FederatedObject) -> Result<FederatedObject> {
        let obj = typed::<K>(obj)?;
        update(self.fed_api(Some(namespace_of(obj))), obj).await
    }

    async fn fed_update_status(&self, obj: &FederatedObject) -> Result<FederatedObject> {
        let obj = typed::<K>(obj)?;
        let api = self.fed_api(Some(namespace_of(obj)));
        let data = serde_json::to_vec(obj)?;
        Ok(api
            .replace_status(&name_of(obj), &PostParams::default(), data)
            .await?
            .into_object())
    }

    async fn fed_delete(&self, name: &QualifiedName, params: &DeleteParams) -> Result<()> {
        delete(self.fed_api(Some(&name.namespace)), name, params).await
    }

    async fn fed_watch(
        &self,
        namespace: Option<&str>,
        params: &WatchParams,
        version: &str,
    ) -> Result<ObjectEventStream> {
        watch(self.fed_api(namespace), params, version).await
    }

    async fn cluster_create(
        &self,
        client: &ClusterClient,
        obj: &FederatedObject,
    ) -> Result<FederatedObject> {
        let obj = typed::<K>(obj)?;
        let api = self
            .cluster_api(client, Some(namespace_of(obj)))
            .await;
        create(api, obj).await
    }

    async fn cluster_get(
        &self,
        client: &ClusterClient,
        name: &QualifiedName,
    ) -> Result<FederatedObject> {
        get(self.cluster_api(client, Some(&name.namespace)).await, name).await
    }

    async fn cluster_list(
        &self,
        client: &ClusterClient,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<FederatedObject>> {
        list(self.cluster_api(client, namespace).await, params).await
    }

    async fn cluster_update(
        &self,
        client: &ClusterClient,
        obj: &FederatedObject,
    ) -> Result<FederatedObject> {
        let obj = typed::<K>(obj)?;
        let api = self
            .cluster_api(client, Some(namespace_of(obj)))
            .await;
        update(api, obj).await
    }

    async fn cluster_delete(
        &self,
        client: &ClusterClient,
        name: &QualifiedName,
        params: &DeleteParams,
    ) -> Result<()> {
        delete(self.cluster_api(client, Some(&name.namespace)).await, name, params).await
    }

    async fn cluster_watch(
        &self,
        client: &ClusterClient,
        namespace: Option<&str>,
        params: &WatchParams,
        version: &str,
    ) -> Result<ObjectEventStream> {
        watch(self.cluster_api(client, namespace).await, params, version).await
    }
}
