//! Volume and mount inspection for Porter
//!
//! This crate answers one question for the task scheduler: do two file
//! operations touch the same storage volume? Tasks whose volume sets are
//! disjoint may run concurrently under smart queueing; tasks sharing a
//! volume are serialized so they do not fight over the same spindle or
//! network link.
//!
//! # Examples
//!
//! ```rust
//! use porter_device::VolumeInspector;
//!
//! # tokio_test::block_on(async {
//! let inspector = VolumeInspector::new();
//! let volume = inspector.volume_of(".").await?;
//! println!("volume {:?} (network: {})", volume.id, volume.network);
//! # Ok::<(), porter_types::Error>(())
//! # });
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use porter_types::Result;
use tracing::debug;

#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub mod windows;

/// Identity of a storage volume
///
/// On Unix this is the device id reported by `stat`; on Windows it is
/// derived from the drive or UNC prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId(u64);

impl VolumeId {
    /// Create a volume id from a raw device number
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw device number
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// What the inspector knows about the volume behind a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volume {
    /// Volume identity
    pub id: VolumeId,
    /// Whether the volume is backed by a network filesystem
    pub network: bool,
}

impl Volume {
    /// Check whether two volumes contend for the same resource
    ///
    /// Identical ids always conflict. Network volumes conflict with each
    /// other as well: they share the link even when mounted from
    /// different exports.
    pub fn conflicts_with(self, other: Volume) -> bool {
        self.id == other.id || (self.network && other.network)
    }
}

/// Path-to-volume resolver with a lookup cache
///
/// Lookups walk up to the nearest existing ancestor, so a destination
/// directory that does not exist yet resolves to its parent's volume.
#[derive(Debug, Default)]
pub struct VolumeInspector {
    cache: Mutex<HashMap<PathBuf, Volume>>,
}

impl VolumeInspector {
    /// Create a new inspector with an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the volume behind a path
    pub async fn volume_of<P: AsRef<Path>>(&self, path: P) -> Result<Volume> {
        let probe = nearest_existing(path.as_ref());

        if let Some(volume) = self.cached(&probe) {
            return Ok(volume);
        }

        let volume = inspect(&probe).await?;
        debug!(
            "Resolved volume {:?} for '{}' (network: {})",
            volume.id,
            probe.display(),
            volume.network
        );

        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(probe, volume);
        Ok(volume)
    }

    /// Resolve the set of distinct volumes behind a list of paths
    ///
    /// Paths that fail to resolve are reported as errors; the scheduler
    /// treats a failed lookup as a conflict.
    pub async fn volumes_of(&self, paths: &[PathBuf]) -> Result<Vec<Volume>> {
        let mut volumes: Vec<Volume> = Vec::new();
        for path in paths {
            let volume = self.volume_of(path).await?;
            if !volumes.contains(&volume) {
                volumes.push(volume);
            }
        }
        Ok(volumes)
    }

    /// Number of cached lookups
    pub fn cache_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    fn cached(&self, path: &Path) -> Option<Volume> {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .copied()
    }
}

/// Walk up from `path` to the first component that exists on disk
fn nearest_existing(path: &Path) -> PathBuf {
    let mut probe = path.to_path_buf();
    while !probe.exists() {
        match probe.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => probe = parent.to_path_buf(),
            _ => break,
        }
    }
    probe
}

#[cfg(unix)]
async fn inspect(path: &Path) -> Result<Volume> {
    let id = unix::device_id(path).await?;
    let network = unix::is_network_mount(path).await.unwrap_or(false);
    Ok(Volume {
        id: VolumeId::from_raw(id),
        network,
    })
}

#[cfg(windows)]
async fn inspect(path: &Path) -> Result<Volume> {
    windows::inspect_volume(path)
}

#[cfg(not(any(unix, windows)))]
async fn inspect(path: &Path) -> Result<Volume> {
    Err(porter_types::Error::volume_lookup(format!(
        "No volume inspection available for '{}' on this platform",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_volume_of_existing_path() {
        let temp = TempDir::new().unwrap();
        let inspector = VolumeInspector::new();

        let first = inspector.volume_of(temp.path()).await.unwrap();
        let second = inspector.volume_of(temp.path()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_path_resolves_to_parent() {
        let temp = TempDir::new().unwrap();
        let inspector = VolumeInspector::new();

        let missing = temp.path().join("does/not/exist");
        let parent = inspector.volume_of(temp.path()).await.unwrap();
        let resolved = inspector.volume_of(&missing).await.unwrap();
        assert_eq!(parent, resolved);
    }

    #[tokio::test]
    async fn test_cache_grows_once_per_path() {
        let temp = TempDir::new().unwrap();
        let inspector = VolumeInspector::new();

        inspector.volume_of(temp.path()).await.unwrap();
        inspector.volume_of(temp.path()).await.unwrap();
        assert_eq!(inspector.cache_len(), 1);
    }

    #[tokio::test]
    async fn test_same_directory_volumes_conflict() {
        let temp = TempDir::new().unwrap();
        let inspector = VolumeInspector::new();

        let a = inspector.volume_of(temp.path().join("a")).await.unwrap();
        let b = inspector.volume_of(temp.path().join("b")).await.unwrap();
        assert!(a.conflicts_with(b));
    }

    #[test]
    fn test_distinct_local_volumes_do_not_conflict() {
        let a = Volume {
            id: VolumeId::from_raw(1),
            network: false,
        };
        let b = Volume {
            id: VolumeId::from_raw(2),
            network: false,
        };
        assert!(!a.conflicts_with(b));

        // Two different network mounts still share the link.
        let na = Volume {
            id: VolumeId::from_raw(3),
            network: true,
        };
        let nb = Volume {
            id: VolumeId::from_raw(4),
            network: true,
        };
        assert!(na.conflicts_with(nb));
    }
}
