//! Storage cluster trait definition.

use crate::error::ClusterResult;
use crate::stream::DiffStream;
use serde::{Deserialize, Serialize};

/// A block device mapped on this host from a cluster image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedDevice {
    /// Image name.
    pub image: String,
    /// Device path, e.g. `/dev/rbd0`.
    pub device: String,
}

impl MappedDevice {
    /// Creates a new mapped device entry.
    pub fn new(image: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            device: device.into(),
        }
    }
}

/// A client for one storage cluster.
///
/// Clients are **thin call-throughs**. They report what the cluster holds
/// and execute what they are told; the replication engine owns every
/// decision about what to transfer.
///
/// # Invariants
///
/// - `list_snapshots` returns labels in creation order
/// - `export_diff` returns a stream that is consumed by exactly one
///   `import_diff`, possibly on a different cluster
/// - `import_diff` creates the stream's end snapshot on the target image
/// - Clients must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::RbdCli`] - Drives the `rbd` tool
/// - [`super::InMemoryCluster`] - For testing
/// - [`super::DryRunCluster`] - Logs mutations instead of running them
pub trait StorageCluster: Send + Sync {
    /// Lists all image names in the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster cannot be reached.
    fn list_volumes(&self) -> ClusterResult<Vec<String>>;

    /// Creates an image with the given size in megabytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the image exists or the command fails.
    fn create_volume(&self, image: &str, size_mb: u64) -> ClusterResult<()>;

    /// Lists the snapshot labels of an image, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the image does not exist or the command fails.
    fn list_snapshots(&self, image: &str) -> ClusterResult<Vec<String>>;

    /// Creates a snapshot on an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists or the command fails.
    fn create_snapshot(&self, image: &str, snapshot: &str) -> ClusterResult<()>;

    /// Starts exporting the changes up to `snapshot`.
    ///
    /// With `from_snapshot` the stream holds only the changes between the two
    /// snapshots; without it the stream holds the complete image state.
    ///
    /// # Errors
    ///
    /// Returns an error if the export cannot be started.
    fn export_diff(
        &self,
        image: &str,
        snapshot: &str,
        from_snapshot: Option<&str>,
    ) -> ClusterResult<DiffStream>;

    /// Applies a diff stream to an image, blocking until it is consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the import or the producing export fails.
    fn import_diff(&self, image: &str, stream: DiffStream) -> ClusterResult<()>;

    /// Lists the images mapped as block devices on this host.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping table cannot be read.
    fn list_mapped(&self) -> ClusterResult<Vec<MappedDevice>>;
}

impl<T: StorageCluster + ?Sized> StorageCluster for Box<T> {
    fn list_volumes(&self) -> ClusterResult<Vec<String>> {
        (**self).list_volumes()
    }

    fn create_volume(&self, image: &str, size_mb: u64) -> ClusterResult<()> {
        (**self).create_volume(image, size_mb)
    }

    fn list_snapshots(&self, image: &str) -> ClusterResult<Vec<String>> {
        (**self).list_snapshots(image)
    }

    fn create_snapshot(&self, image: &str, snapshot: &str) -> ClusterResult<()> {
        (**self).create_snapshot(image, snapshot)
    }

    fn export_diff(
        &self,
        image: &str,
        snapshot: &str,
        from_snapshot: Option<&str>,
    ) -> ClusterResult<DiffStream> {
        (**self).export_diff(image, snapshot, from_snapshot)
    }

    fn import_diff(&self, image: &str, stream: DiffStream) -> ClusterResult<()> {
        (**self).import_diff(image, stream)
    }

    fn list_mapped(&self) -> ClusterResult<Vec<MappedDevice>> {
        (**self).list_mapped()
    }
}
