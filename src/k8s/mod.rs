pub mod client;
pub mod object;

pub use client::{KubeMetadataSource, MetadataSource, PodTarget};
pub use object::{ClusterObject, ObjectKind, OwnerRef};
