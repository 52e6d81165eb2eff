//! Dry-run wrapper that logs mutations instead of running them.

use crate::cluster::{MappedDevice, StorageCluster};
use crate::error::ClusterResult;
use crate::stream::DiffStream;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::info;

/// A cluster wrapper for `--noop` runs.
///
/// Reads go to the wrapped cluster. Mutations are logged at `info` level and
/// remembered locally, so later reads in the same run see the state the
/// mutation would have produced:
///
/// - a created image shows up in `list_volumes` with no snapshots
/// - a created snapshot shows up in `list_snapshots`
///
/// Exports do not start anything on the wrapped cluster; they return an
/// empty stream.
#[derive(Debug)]
pub struct DryRunCluster<C: StorageCluster> {
    inner: C,
    pending: Mutex<BTreeMap<String, Vec<String>>>,
    created: Mutex<Vec<String>>,
}

impl<C: StorageCluster> DryRunCluster<C> {
    /// Wraps a cluster.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            pending: Mutex::new(BTreeMap::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Returns the wrapped cluster.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn record_snapshot(&self, image: &str, snapshot: &str) {
        self.pending
            .lock()
            .entry(image.to_string())
            .or_default()
            .push(snapshot.to_string());
    }
}

impl<C: StorageCluster> StorageCluster for DryRunCluster<C> {
    fn list_volumes(&self) -> ClusterResult<Vec<String>> {
        let mut volumes = self.inner.list_volumes()?;
        for image in self.created.lock().iter() {
            if !volumes.contains(image) {
                volumes.push(image.clone());
            }
        }
        Ok(volumes)
    }

    fn create_volume(&self, image: &str, size_mb: u64) -> ClusterResult<()> {
        info!(image, size_mb, "[noop] would create image");
        self.created.lock().push(image.to_string());
        Ok(())
    }

    fn list_snapshots(&self, image: &str) -> ClusterResult<Vec<String>> {
        let mut snapshots = if self.created.lock().iter().any(|i| i == image) {
            Vec::new()
        } else {
            self.inner.list_snapshots(image)?
        };
        if let Some(extra) = self.pending.lock().get(image) {
            snapshots.extend(extra.iter().cloned());
        }
        Ok(snapshots)
    }

    fn create_snapshot(&self, image: &str, snapshot: &str) -> ClusterResult<()> {
        info!(image, snapshot, "[noop] would create snapshot");
        self.record_snapshot(image, snapshot);
        Ok(())
    }

    fn export_diff(
        &self,
        image: &str,
        snapshot: &str,
        from_snapshot: Option<&str>,
    ) -> ClusterResult<DiffStream> {
        info!(image, snapshot, from_snapshot, "[noop] would export diff");
        Ok(DiffStream::empty())
    }

    fn import_diff(&self, image: &str, stream: DiffStream) -> ClusterResult<()> {
        info!(image, "[noop] would import diff");
        stream.finish()
    }

    fn list_mapped(&self) -> ClusterResult<Vec<MappedDevice>> {
        self.inner.list_mapped()
    }
}
