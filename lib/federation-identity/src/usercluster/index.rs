//! In-memory index of UserClusterIdentity objects

use federation_api::v1alpha1::user_cluster_identity::user_at_cluster_key;
use federation_api::{Identity, UserClusterIdentity};
use kube::ResourceExt;
use kube_runtime::watcher::Event;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

#[derive(Clone, Debug, Default)]
struct Snapshot {
    /// namespace/name -> object
    objects: HashMap<String, Arc<UserClusterIdentity>>,
    /// username@clusterName -> namespace/name
    by_user_cluster: HashMap<String, BTreeSet<String>>,
}

impl Snapshot {
    fn insert(&mut self, obj: UserClusterIdentity) {
        let key = object_key(&obj);
        self.remove_key(&key);
        self.by_user_cluster
            .entry(obj.user_at_cluster())
            .or_default()
            .insert(key.clone());
        self.objects.insert(key, Arc::new(obj));
    }

    fn remove_key(&mut self, key: &str) {
        if let Some(old) = self.objects.remove(key) {
            let index_key = old.user_at_cluster();
            if let Some(keys) = self.by_user_cluster.get_mut(&index_key) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_user_cluster.remove(&index_key);
                }
            }
        }
    }
}

/// Outcome of looking up the identity of a user on a cluster
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityMatch {
    pub identity: Identity,
    /// Number of identities that matched; only the first is used
    pub candidates: usize,
}

impl IdentityMatch {
    pub fn is_ambiguous(&self) -> bool {
        self.candidates > 1
    }
}

/// Read side of the index; cheap to clone and safe to share between workers
#[derive(Clone)]
pub struct IdentityIndex {
    snapshot: Arc<RwLock<Snapshot>>,
    synced: watch::Receiver<bool>,
}

/// Write side of the index, owned by the single watch task
pub struct IndexWriter {
    snapshot: Arc<RwLock<Snapshot>>,
    staged: Option<Snapshot>,
    synced: watch::Sender<bool>,
}

impl IdentityIndex {
    pub fn new() -> (IdentityIndex, IndexWriter) {
        let snapshot = Arc::new(RwLock::new(Snapshot::default()));
        let (tx, rx) = watch::channel(false);
        (
            IdentityIndex {
                snapshot: snapshot.clone(),
                synced: rx,
            },
            IndexWriter {
                snapshot,
                staged: None,
                synced: tx,
            },
        )
    }

    /// Get an identity object by `namespace/name`
    pub async fn get(&self, key: &str) -> Option<Arc<UserClusterIdentity>> {
        self.snapshot.read().await.objects.get(key).cloned()
    }

    /// All identities of `username` on `cluster_name`, oldest first.
    /// Objects created at the same time are ordered by namespace/name.
    pub async fn list_by_user_cluster(
        &self,
        username: &str,
        cluster_name: &str,
    ) -> Vec<Arc<UserClusterIdentity>> {
        let snapshot = self.snapshot.read().await;
        let mut matches: Vec<_> = snapshot
            .by_user_cluster
            .get(&user_at_cluster_key(username, cluster_name))
            .into_iter()
            .flatten()
            .filter_map(|key| snapshot.objects.get(key).cloned())
            .collect();
        matches.sort_by_cached_key(|obj| {
            (
                obj.metadata.creation_timestamp.as_ref().map(|t| t.0),
                object_key(obj),
            )
        });
        matches
    }

    /// First identity of `username` on `cluster_name` and how many matched
    pub async fn lookup(&self, username: &str, cluster_name: &str) -> Option<IdentityMatch> {
        let matches = self.list_by_user_cluster(username, cluster_name).await;
        matches.first().map(|first| IdentityMatch {
            identity: first.spec.identity.clone(),
            candidates: matches.len(),
        })
    }

    pub async fn len(&self) -> usize {
        self.snapshot.read().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// True once the initial listing has been applied
    pub fn is_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Resolves once the initial listing has been applied; false if the
    /// writer went away first
    pub async fn synced(&self) -> bool {
        let mut rx = self.synced.clone();
        let synced = rx.wait_for(|synced| *synced).await.is_ok();
        synced
    }
}

impl IndexWriter {
    /// Apply one watch event.
    ///
    /// A relist is staged and swapped in whole once complete, so readers
    /// keep seeing the previous view until then.
    pub async fn apply_event(&mut self, event: Event<UserClusterIdentity>) {
        match event {
            Event::Init => {
                debug!("UserClusterIdentity relist started");
                self.staged = Some(Snapshot::default());
            }
            Event::InitApply(obj) => match self.staged.as_mut() {
                Some(staged) => staged.insert(obj),
                None => self.snapshot.write().await.insert(obj),
            },
            Event::InitDone => {
                if let Some(staged) = self.staged.take() {
                    let count = staged.objects.len();
                    *self.snapshot.write().await = staged;
                    info!("UserClusterIdentity index synced with {} objects", count);
                }
                self.synced.send_replace(true);
            }
            Event::Apply(obj) => {
                debug!("UserClusterIdentity applied: {}", object_key(&obj));
                self.snapshot.write().await.insert(obj);
            }
            Event::Delete(obj) => {
                let key = object_key(&obj);
                debug!("UserClusterIdentity deleted: {}", key);
                self.snapshot.write().await.remove_key(&key);
            }
        }
    }
}

fn object_key(obj: &UserClusterIdentity) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}
