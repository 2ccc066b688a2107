use beefsim_kernel::sim_shuffle;

use super::{DataPlacement, PlacementError, build_file};
use crate::cluster::Cluster;
use crate::file::ReplicatedFile;
use crate::machine::HostId;

/// Primary on the client's own data server when it has room.
///
/// Otherwise the primary is the first server with enough space in random
/// order. Secondaries are drawn at random among the servers not chosen as
/// primary; their free space is the replicator's concern.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoLocatedPlacement;

impl DataPlacement for CoLocatedPlacement {
    fn create_file(
        &self,
        cluster: &mut Cluster,
        client: HostId,
        path: &str,
        replication_level: usize,
        size: u64,
    ) -> Result<ReplicatedFile, PlacementError> {
        if cluster.is_empty() {
            return Err(PlacementError::NoServers {
                path: path.to_string(),
            });
        }

        let mut available: Vec<HostId> = cluster.ids().filter(|id| *id != client).collect();
        sim_shuffle(&mut available);

        let colocated_fits =
            client.0 < cluster.len() && cluster.server(client).free_space() >= size;
        let primary = if colocated_fits {
            client
        } else {
            let position = available
                .iter()
                .position(|id| cluster.server(*id).free_space() >= size)
                .ok_or_else(|| PlacementError::NoSpace {
                    path: path.to_string(),
                    size,
                })?;
            available.remove(position)
        };

        Ok(build_file(cluster, path, primary, available, replication_level))
    }
}
