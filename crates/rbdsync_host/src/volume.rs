//! A mapped volume as seen from the host.

use crate::error::{HostError, HostResult};
use crate::host::HostFilesystem;
use std::path::{Path, PathBuf};

/// A cluster image mapped to a block device on this host.
///
/// The mountpoint is resolved once, when the volume is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostVolume {
    image: String,
    device: String,
    mountpoint: Option<PathBuf>,
}

impl HostVolume {
    /// Creates a volume with a known mountpoint.
    pub fn new(image: impl Into<String>, device: impl Into<String>, mountpoint: Option<PathBuf>) -> Self {
        Self {
            image: image.into(),
            device: device.into(),
            mountpoint,
        }
    }

    /// Creates a volume and looks up its mountpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount table cannot be queried.
    pub fn resolve<H: HostFilesystem + ?Sized>(
        host: &H,
        image: impl Into<String>,
        device: impl Into<String>,
    ) -> HostResult<Self> {
        let device = device.into();
        let mountpoint = host.resolve_mountpoint(&device)?;
        Ok(Self::new(image, device, mountpoint))
    }

    /// Returns the image name.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Returns the device path.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the mountpoint, if mounted.
    #[must_use]
    pub fn mountpoint(&self) -> Option<&Path> {
        self.mountpoint.as_deref()
    }

    /// Returns true if the volume is mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mountpoint.is_some()
    }

    /// Freezes the volume's filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NotMounted`] without touching the host if the
    /// volume is not mounted.
    pub fn freeze<H: HostFilesystem + ?Sized>(&self, host: &H) -> HostResult<()> {
        host.freeze(self.require_mountpoint()?)
    }

    /// Thaws the volume's filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NotMounted`] without touching the host if the
    /// volume is not mounted.
    pub fn unfreeze<H: HostFilesystem + ?Sized>(&self, host: &H) -> HostResult<()> {
        host.unfreeze(self.require_mountpoint()?)
    }

    fn require_mountpoint(&self) -> HostResult<&Path> {
        self.mountpoint().ok_or_else(|| HostError::NotMounted {
            device: self.device.clone(),
        })
    }
}
