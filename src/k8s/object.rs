use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// The object kinds the agent knows how to fetch when walking owner chains.
///
/// Owner references pointing at any other kind terminate the walk at that
/// kind's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Pod,
    ReplicaSet,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    Rollout,
}

impl ObjectKind {
    pub fn from_name(kind: &str) -> Option<Self> {
        match kind {
            "Pod" => Some(Self::Pod),
            "ReplicaSet" => Some(Self::ReplicaSet),
            "Deployment" => Some(Self::Deployment),
            "StatefulSet" => Some(Self::StatefulSet),
            "DaemonSet" => Some(Self::DaemonSet),
            "Job" => Some(Self::Job),
            "CronJob" => Some(Self::CronJob),
            "Rollout" => Some(Self::Rollout),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::ReplicaSet => "ReplicaSet",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Job => "Job",
            Self::CronJob => "CronJob",
            Self::Rollout => "Rollout",
        }
    }

    /// API group, version and resource plural used to build the dynamic API.
    pub(crate) fn group_version_plural(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Pod => ("", "v1", "pods"),
            Self::ReplicaSet => ("apps", "v1", "replicasets"),
            Self::Deployment => ("apps", "v1", "deployments"),
            Self::StatefulSet => ("apps", "v1", "statefulsets"),
            Self::DaemonSet => ("apps", "v1", "daemonsets"),
            Self::Job => ("batch", "v1", "jobs"),
            Self::CronJob => ("batch", "v1", "cronjobs"),
            Self::Rollout => ("argoproj.io", "v1alpha1", "rollouts"),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A controller owner reference: the object that manages this one's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

/// Metadata projection of a cluster object: just the pieces workload
/// resolution needs, independent of the concrete kind it came from.
#[derive(Debug, Clone, Default)]
pub struct ClusterObject {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub controller_owner: Option<OwnerRef>,
}

impl ClusterObject {
    pub fn from_metadata(meta: &ObjectMeta) -> Self {
        let controller_owner = meta.owner_references.as_ref().and_then(|refs| {
            refs.iter()
                .find(|r| r.controller.unwrap_or(false))
                .map(|r| OwnerRef {
                    kind: r.kind.clone(),
                    name: r.name.clone(),
                })
        });

        Self {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            labels: meta.labels.clone().unwrap_or_default(),
            controller_owner,
        }
    }
}
