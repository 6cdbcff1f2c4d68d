//! Windows-specific volume inspection
//!
//! Volume identity is derived from the path prefix: a drive letter maps
//! to a stable id, a UNC share is treated as a network volume.

#[cfg(windows)]
use crate::{Volume, VolumeId};
#[cfg(windows)]
use porter_types::{Error, Result};
#[cfg(windows)]
use std::path::{Component, Path, Prefix};

/// Inspect the volume behind a Windows path
#[cfg(windows)]
pub fn inspect_volume(path: &Path) -> Result<Volume> {
    let prefix = path
        .components()
        .find_map(|component| match component {
            Component::Prefix(prefix) => Some(prefix.kind()),
            _ => None,
        })
        .ok_or_else(|| {
            Error::volume_lookup(format!("Path '{}' has no volume prefix", path.display()))
        })?;

    match prefix {
        Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => Ok(Volume {
            id: VolumeId::from_raw(u64::from(letter)),
            network: false,
        }),
        Prefix::UNC(server, share) | Prefix::VerbatimUNC(server, share) => {
            // Hash server+share into a stable id for conflict grouping
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};

            let mut hasher = DefaultHasher::new();
            server.hash(&mut hasher);
            share.hash(&mut hasher);
            Ok(Volume {
                id: VolumeId::from_raw(hasher.finish()),
                network: true,
            })
        }
        _ => Err(Error::volume_lookup(format!(
            "Unsupported volume prefix for '{}'",
            path.display()
        ))),
    }
}

#[cfg(test)]
#[cfg(windows)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_drive_letter_volume() {
        let volume = inspect_volume(&PathBuf::from(r"C:\Users")).unwrap();
        assert!(!volume.network);

        let same = inspect_volume(&PathBuf::from(r"C:\Windows")).unwrap();
        assert_eq!(volume.id, same.id);
    }

    #[test]
    fn test_unc_volume_is_network() {
        let volume = inspect_volume(&PathBuf::from(r"\\server\share\dir")).unwrap();
        assert!(volume.network);
    }
}
