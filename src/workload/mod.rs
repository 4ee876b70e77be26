pub mod resolver;

pub use resolver::{ResolverConfig, WorkloadResolver};

use serde::Serialize;

pub const KIND_POD: &str = "Pod";
pub const KIND_REPLICA_SET: &str = "ReplicaSet";
pub const KIND_DEPLOYMENT: &str = "Deployment";
pub const KIND_JOB: &str = "Job";
pub const KIND_CRON_JOB: &str = "CronJob";
pub const KIND_ROLLOUT: &str = "Rollout";

/// The logical controller a pod ultimately belongs to, as distinct from the
/// pod instance itself. Ownerless pods attribute to themselves with kind
/// `Pod`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    pub kind: String,
}
