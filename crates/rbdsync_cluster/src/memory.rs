//! In-memory cluster for testing.

use crate::cluster::{MappedDevice, StorageCluster};
use crate::error::{ClusterError, ClusterResult};
use crate::stream::DiffStream;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::Arc;

/// An operation the in-memory cluster can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `list_volumes` fails.
    ListVolumes,
    /// `create_volume` fails.
    CreateVolume,
    /// `create_volume` reports success but creates nothing.
    CreateVolumeSilently,
    /// `list_snapshots` fails.
    ListSnapshots,
    /// `create_snapshot` fails.
    CreateSnapshot,
    /// `export_diff` fails.
    ExportDiff,
    /// `import_diff` fails after consuming the stream.
    ImportDiff,
    /// `list_mapped` fails.
    ListMapped,
}

/// A mutating call recorded by the in-memory cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    /// An image was created.
    CreateVolume {
        /// Image name.
        image: String,
        /// Size in megabytes.
        size_mb: u64,
    },
    /// A snapshot was created.
    CreateSnapshot {
        /// Image name.
        image: String,
        /// Snapshot label.
        snapshot: String,
    },
    /// A diff export was started.
    ExportDiff {
        /// Image name.
        image: String,
        /// End snapshot.
        snapshot: String,
        /// Start snapshot for incremental exports.
        from_snapshot: Option<String>,
    },
    /// A diff was imported.
    ImportDiff {
        /// Image name.
        image: String,
        /// End snapshot carried by the stream.
        snapshot: String,
    },
}

/// What an in-memory export puts on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct DiffPayload {
    image: String,
    from_snapshot: Option<String>,
    to_snapshot: String,
}

#[derive(Debug, Default)]
struct ImageState {
    size_mb: u64,
    snapshots: Vec<String>,
}

#[derive(Debug, Default)]
struct ClusterState {
    images: BTreeMap<String, ImageState>,
    mapped: Vec<MappedDevice>,
    failures: HashSet<(FailPoint, Option<String>)>,
    calls: Vec<ClusterCall>,
}

/// An in-memory storage cluster.
///
/// This cluster keeps images and their snapshot histories in memory and is
/// suitable for:
/// - Unit tests
/// - Integration tests of the replication engine
///
/// Clones share state, so a test can hand one clone to the engine and keep
/// another to inspect the result.
///
/// Diff streams carry a small JSON header naming the image and the snapshot
/// range. Importing one appends its end snapshot to the target image, and
/// an incremental import requires the start snapshot to exist there, as
/// `rbd import-diff` does.
///
/// # Example
///
/// ```rust
/// use rbdsync_cluster::{InMemoryCluster, StorageCluster};
///
/// let source = InMemoryCluster::new().with_image("vm", &["2024-01-01"]);
/// let backup = InMemoryCluster::new().with_image("vm", &[]);
///
/// let stream = source.export_diff("vm", "2024-01-01", None).unwrap();
/// backup.import_diff("vm", stream).unwrap();
/// assert_eq!(backup.list_snapshots("vm").unwrap(), vec!["2024-01-01".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<RwLock<ClusterState>>,
}

impl InMemoryCluster {
    /// Creates a new empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an image with the given snapshot history.
    #[must_use]
    pub fn with_image(self, image: &str, snapshots: &[&str]) -> Self {
        self.add_image(image, snapshots);
        self
    }

    /// Adds an image with the given snapshot history, replacing any existing one.
    pub fn add_image(&self, image: &str, snapshots: &[&str]) {
        self.state.write().images.insert(
            image.to_string(),
            ImageState {
                size_mb: 1,
                snapshots: snapshots.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    /// Appends a snapshot to an existing image without recording a call.
    pub fn push_snapshot(&self, image: &str, snapshot: &str) {
        if let Some(state) = self.state.write().images.get_mut(image) {
            state.snapshots.push(snapshot.to_string());
        }
    }

    /// Registers a mapped block device for the snapshot workflow.
    pub fn map_device(&self, image: &str, device: &str) {
        self.state.write().mapped.push(MappedDevice::new(image, device));
    }

    /// Makes an operation fail, for one image or (with `None`) for all.
    pub fn inject_failure(&self, point: FailPoint, image: Option<&str>) {
        self.state
            .write()
            .failures
            .insert((point, image.map(str::to_string)));
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.state.write().failures.clear();
    }

    /// Returns true if the image exists.
    #[must_use]
    pub fn has_image(&self, image: &str) -> bool {
        self.state.read().images.contains_key(image)
    }

    /// Returns the snapshot history of an image, if it exists.
    #[must_use]
    pub fn snapshots(&self, image: &str) -> Option<Vec<String>> {
        self.state
            .read()
            .images
            .get(image)
            .map(|state| state.snapshots.clone())
    }

    /// Returns the size of an image in megabytes, if it exists.
    #[must_use]
    pub fn size_mb(&self, image: &str) -> Option<u64> {
        self.state.read().images.get(image).map(|state| state.size_mb)
    }

    /// Returns every mutating call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state.read().calls.clone()
    }

    fn check_failure(&self, point: FailPoint, image: Option<&str>) -> ClusterResult<()> {
        let state = self.state.read();
        let hit = state.failures.contains(&(point, None))
            || image.is_some_and(|i| state.failures.contains(&(point, Some(i.to_string()))));
        if hit {
            Err(ClusterError::command_failed(
                format!("{:?} {}", point, image.unwrap_or("")).trim_end().to_string(),
                "exit status: 1",
                "injected failure",
            ))
        } else {
            Ok(())
        }
    }

    fn is_silent(&self, point: FailPoint, image: &str) -> bool {
        let state = self.state.read();
        state.failures.contains(&(point, None))
            || state.failures.contains(&(point, Some(image.to_string())))
    }
}

impl StorageCluster for InMemoryCluster {
    fn list_volumes(&self) -> ClusterResult<Vec<String>> {
        self.check_failure(FailPoint::ListVolumes, None)?;
        Ok(self.state.read().images.keys().cloned().collect())
    }

    fn create_volume(&self, image: &str, size_mb: u64) -> ClusterResult<()> {
        self.check_failure(FailPoint::CreateVolume, Some(image))?;
        if self.is_silent(FailPoint::CreateVolumeSilently, image) {
            return Ok(());
        }

        let mut state = self.state.write();
        if state.images.contains_key(image) {
            return Err(ClusterError::ImageExists(image.to_string()));
        }
        state.images.insert(
            image.to_string(),
            ImageState {
                size_mb,
                snapshots: Vec::new(),
            },
        );
        state.calls.push(ClusterCall::CreateVolume {
            image: image.to_string(),
            size_mb,
        });
        Ok(())
    }

    fn list_snapshots(&self, image: &str) -> ClusterResult<Vec<String>> {
        self.check_failure(FailPoint::ListSnapshots, Some(image))?;
        self.snapshots(image)
            .ok_or_else(|| ClusterError::ImageNotFound(image.to_string()))
    }

    fn create_snapshot(&self, image: &str, snapshot: &str) -> ClusterResult<()> {
        self.check_failure(FailPoint::CreateSnapshot, Some(image))?;

        let mut state = self.state.write();
        let entry = state
            .images
            .get_mut(image)
            .ok_or_else(|| ClusterError::ImageNotFound(image.to_string()))?;
        if entry.snapshots.iter().any(|s| s == snapshot) {
            return Err(ClusterError::SnapshotExists {
                image: image.to_string(),
                snapshot: snapshot.to_string(),
            });
        }
        entry.snapshots.push(snapshot.to_string());
        state.calls.push(ClusterCall::CreateSnapshot {
            image: image.to_string(),
            snapshot: snapshot.to_string(),
        });
        Ok(())
    }

    fn export_diff(
        &self,
        image: &str,
        snapshot: &str,
        from_snapshot: Option<&str>,
    ) -> ClusterResult<DiffStream> {
        self.check_failure(FailPoint::ExportDiff, Some(image))?;

        let mut state = self.state.write();
        let entry = state
            .images
            .get(image)
            .ok_or_else(|| ClusterError::ImageNotFound(image.to_string()))?;
        for snap in std::iter::once(snapshot).chain(from_snapshot) {
            if !entry.snapshots.iter().any(|s| s == snap) {
                return Err(ClusterError::SnapshotNotFound {
                    image: image.to_string(),
                    snapshot: snap.to_string(),
                });
            }
        }

        let payload = DiffPayload {
            image: image.to_string(),
            from_snapshot: from_snapshot.map(str::to_string),
            to_snapshot: snapshot.to_string(),
        };
        let bytes = serde_json::to_vec(&payload)
            .map_err(|e| ClusterError::Stream(e.to_string()))?;

        state.calls.push(ClusterCall::ExportDiff {
            image: image.to_string(),
            snapshot: snapshot.to_string(),
            from_snapshot: from_snapshot.map(str::to_string),
        });
        Ok(DiffStream::from_reader(Cursor::new(bytes)))
    }

    fn import_diff(&self, image: &str, mut stream: DiffStream) -> ClusterResult<()> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        stream.finish()?;
        self.check_failure(FailPoint::ImportDiff, Some(image))?;

        let payload: DiffPayload = serde_json::from_slice(&bytes)
            .map_err(|e| ClusterError::Stream(format!("unreadable diff: {}", e)))?;

        let mut state = self.state.write();
        let entry = state
            .images
            .get_mut(image)
            .ok_or_else(|| ClusterError::ImageNotFound(image.to_string()))?;
        if let Some(from) = &payload.from_snapshot {
            if !entry.snapshots.iter().any(|s| s == from) {
                return Err(ClusterError::SnapshotNotFound {
                    image: image.to_string(),
                    snapshot: from.clone(),
                });
            }
        }
        if entry.snapshots.iter().any(|s| *s == payload.to_snapshot) {
            return Err(ClusterError::SnapshotExists {
                image: image.to_string(),
                snapshot: payload.to_snapshot,
            });
        }
        entry.snapshots.push(payload.to_snapshot.clone());
        state.calls.push(ClusterCall::ImportDiff {
            image: image.to_string(),
            snapshot: payload.to_snapshot,
        });
        Ok(())
    }

    fn list_mapped(&self) -> ClusterResult<Vec<MappedDevice>> {
        self.check_failure(FailPoint::ListMapped, None)?;
        Ok(self.state.read().mapped.clone())
    }
}
