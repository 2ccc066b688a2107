use beefsim_kernel::Instant;

use super::{ReplicaUpdate, Replicator};
use crate::cluster::Cluster;
use crate::error::BeefsResult;
use crate::file::ReplicatedFile;

/// Leaves replicas untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Replicator for Noop {
    fn update_replicas(
        &self,
        _cluster: &mut Cluster,
        _file: &mut ReplicatedFile,
        _now: Instant,
    ) -> BeefsResult<ReplicaUpdate> {
        Ok(ReplicaUpdate::default())
    }
}
