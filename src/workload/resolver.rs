//! Resolves a pod to its owning workload by walking controller owner
//! references, with a bounded LRU cache in front of the metadata source.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::k8s::{ClusterObject, MetadataSource, ObjectKind, OwnerRef};
use crate::workload::{
    Workload, KIND_CRON_JOB, KIND_DEPLOYMENT, KIND_JOB, KIND_POD, KIND_REPLICA_SET, KIND_ROLLOUT,
};
use crate::{GpufeedError, Result};

pub struct ResolverConfig {
    /// Pod label keys that name the workload directly, checked in order.
    pub label_keys: Vec<String>,
    pub cache_size: usize,
}

pub struct WorkloadResolver {
    source: Arc<dyn MetadataSource>,
    cache: Mutex<LruCache<CacheKey, Arc<Workload>>>,
    label_keys: Vec<String>,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    namespace: String,
    name: String,
}

impl WorkloadResolver {
    pub fn new(source: Arc<dyn MetadataSource>, cfg: ResolverConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(cfg.cache_size).ok_or_else(|| {
            GpufeedError::Config("workload cache size must be greater than zero".to_string())
        })?;

        Ok(Self {
            source,
            cache: Mutex::new(LruCache::new(capacity)),
            label_keys: cfg.label_keys,
        })
    }

    /// Finds the workload owning the pod. Cached results are returned as the
    /// same shared instance. Only the initial pod fetch is a hard error;
    /// failures while walking the owner chain degrade to attributing the pod
    /// to itself.
    pub async fn find_workload_for_pod(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Arc<Workload>> {
        let key = CacheKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };

        if let Some(w) = self.cache.lock().get(&key) {
            return Ok(Arc::clone(w));
        }

        let pod = self
            .source
            .get_object(ObjectKind::Pod, namespace, name)
            .await?;

        let workload = if let Some(workload_name) = self.workload_name_from_labels(&pod) {
            // Label names the workload, but the kind still comes from the
            // owner chain.
            let kind = self.top_controller_kind(&pod).await;
            Arc::new(Workload {
                name: workload_name,
                namespace: pod.namespace.clone(),
                kind,
            })
        } else {
            match self.find_pod_owner(&pod).await {
                Ok(w) => Arc::new(w),
                Err(err) => {
                    debug!(
                        pod = name,
                        namespace, error = %err,
                        "owner lookup failed, attributing pod to itself"
                    );
                    Arc::new(Workload {
                        name: pod.name.clone(),
                        namespace: pod.namespace.clone(),
                        kind: KIND_POD.to_string(),
                    })
                }
            }
        };

        self.cache.lock().put(key, Arc::clone(&workload));

        Ok(workload)
    }

    fn workload_name_from_labels(&self, pod: &ClusterObject) -> Option<String> {
        self.label_keys
            .iter()
            .find_map(|key| pod.labels.get(key).cloned())
    }

    /// Follows the owner chain transitively and returns the last kind it
    /// could identify. An unfetchable kind, a missing owner, or a fetch
    /// failure ends the walk at the kind already in hand.
    async fn top_controller_kind(&self, pod: &ClusterObject) -> String {
        let Some(owner) = pod.controller_owner.clone() else {
            return KIND_POD.to_string();
        };

        let namespace = pod.namespace.clone();
        let mut kind = owner.kind;
        let mut name = owner.name;

        loop {
            let Some(fetchable) = ObjectKind::from_name(&kind) else {
                return kind;
            };

            let next = match self.source.get_object(fetchable, &namespace, &name).await {
                Ok(obj) => obj,
                Err(_) => return kind,
            };

            match next.controller_owner {
                Some(OwnerRef {
                    kind: next_kind,
                    name: next_name,
                }) => {
                    kind = next_kind;
                    name = next_name;
                }
                None => return kind,
            }
        }
    }

    async fn find_pod_owner(&self, pod: &ClusterObject) -> Result<Workload> {
        let Some(owner) = &pod.controller_owner else {
            return Ok(Workload {
                name: pod.name.clone(),
                namespace: pod.namespace.clone(),
                kind: KIND_POD.to_string(),
            });
        };

        let namespace = pod.namespace.clone();

        match ObjectKind::from_name(&owner.kind) {
            Some(ObjectKind::ReplicaSet) => {
                let rs = self
                    .source
                    .get_object(ObjectKind::ReplicaSet, &namespace, &owner.name)
                    .await?;

                if let Some(rs_owner) = rs.controller_owner {
                    if rs_owner.kind == KIND_DEPLOYMENT || rs_owner.kind == KIND_ROLLOUT {
                        return Ok(Workload {
                            name: rs_owner.name,
                            namespace,
                            kind: rs_owner.kind,
                        });
                    }
                }

                Ok(Workload {
                    name: owner.name.clone(),
                    namespace,
                    kind: KIND_REPLICA_SET.to_string(),
                })
            }
            Some(ObjectKind::Job) => {
                let job = self
                    .source
                    .get_object(ObjectKind::Job, &namespace, &owner.name)
                    .await?;

                if let Some(job_owner) = job.controller_owner {
                    if job_owner.kind == KIND_CRON_JOB {
                        return Ok(Workload {
                            name: job_owner.name,
                            namespace,
                            kind: KIND_CRON_JOB.to_string(),
                        });
                    }
                }

                Ok(Workload {
                    name: owner.name.clone(),
                    namespace,
                    kind: KIND_JOB.to_string(),
                })
            }
            // DaemonSets, StatefulSets, Rollouts and custom controllers own
            // their pods directly.
            _ => Ok(Workload {
                name: owner.name.clone(),
                namespace,
                kind: owner.kind.clone(),
            }),
        }
    }
}
