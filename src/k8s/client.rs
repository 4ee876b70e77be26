use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DynamicObject, ListParams};
use kube::core::{ApiResource, GroupVersionKind};
use kube::Client;
use tracing::{debug, info};

use crate::k8s::object::{ClusterObject, ObjectKind};
use crate::{GpufeedError, Result};

/// A scrape candidate returned by target discovery.
#[derive(Debug, Clone)]
pub struct PodTarget {
    pub name: String,
    pub namespace: String,
    pub pod_ip: Option<String>,
}

/// Cluster metadata access, abstracted from the concrete transport so the
/// resolver and exporter can be exercised against an in-memory source.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch one object's metadata projection by kind.
    async fn get_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<ClusterObject>;

    /// List `Running` pods matching the label selector across all namespaces,
    /// optionally restricted to the pods scheduled on one node.
    async fn list_running_pods(
        &self,
        label_selector: &str,
        node_name: Option<&str>,
    ) -> Result<Vec<PodTarget>>;
}

pub struct KubeMetadataSource {
    client: Client,
}

impl KubeMetadataSource {
    pub async fn try_default() -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let client = Client::try_default().await.map_err(|e| {
            GpufeedError::Kubernetes(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, kind: ObjectKind, namespace: &str) -> Api<DynamicObject> {
        let (group, version, plural) = kind.group_version_plural();
        let gvk = GroupVersionKind::gvk(group, version, kind.name());
        let resource = ApiResource::from_gvk_with_plural(&gvk, plural);
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }
}

#[async_trait]
impl MetadataSource for KubeMetadataSource {
    async fn get_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<ClusterObject> {
        let api = self.dynamic_api(kind, namespace);

        let obj = api.get(name).await.map_err(|e| match e {
            kube::Error::Api(ref ae) if ae.code == 404 && kind == ObjectKind::Pod => {
                GpufeedError::PodNotFound {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                }
            }
            other => GpufeedError::Kubernetes(format!(
                "Failed to get {} {}/{}: {}",
                kind, namespace, name, other
            )),
        })?;

        Ok(ClusterObject::from_metadata(&obj.metadata))
    }

    async fn list_running_pods(
        &self,
        label_selector: &str,
        node_name: Option<&str>,
    ) -> Result<Vec<PodTarget>> {
        let mut field_selector = String::from("status.phase=Running");
        if let Some(node) = node_name {
            field_selector.push_str(&format!(",spec.nodeName={}", node));
        }

        let params = ListParams::default()
            .labels(label_selector)
            .fields(&field_selector);

        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods
            .list(&params)
            .await
            .map_err(|e| GpufeedError::Kubernetes(format!("Failed to list pods: {}", e)))?;

        Ok(list
            .items
            .into_iter()
            .map(|pod| PodTarget {
                name: pod.metadata.name.unwrap_or_default(),
                namespace: pod.metadata.namespace.unwrap_or_default(),
                pod_ip: pod.status.and_then(|s| s.pod_ip),
            })
            .collect())
    }
}
