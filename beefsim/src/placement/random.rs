use beefsim_kernel::sim_shuffle;

use super::{DataPlacement, PlacementError, build_file};
use crate::cluster::Cluster;
use crate::file::ReplicatedFile;
use crate::machine::HostId;

/// Primary and secondaries drawn uniformly at random.
///
/// The primary is the first drawn server with enough free space; the
/// secondaries are the next `replication_level` drawn servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPlacement;

impl DataPlacement for RandomPlacement {
    fn create_file(
        &self,
        cluster: &mut Cluster,
        _client: HostId,
        path: &str,
        replication_level: usize,
        size: u64,
    ) -> Result<ReplicatedFile, PlacementError> {
        if cluster.is_empty() {
            return Err(PlacementError::NoServers {
                path: path.to_string(),
            });
        }

        let mut drawn: Vec<HostId> = cluster.ids().collect();
        sim_shuffle(&mut drawn);

        let position = drawn
            .iter()
            .position(|id| cluster.server(*id).free_space() >= size)
            .ok_or_else(|| PlacementError::NoSpace {
                path: path.to_string(),
                size,
            })?;
        let primary = drawn.remove(position);

        Ok(build_file(cluster, path, primary, drawn, replication_level))
    }
}
