//! Unix-specific volume inspection
//!
//! Volume identity comes from the device id reported by `stat`; the mount
//! table provides the network-filesystem flag.

#[cfg(unix)]
use porter_types::{Error, Result};
#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use tracing::debug;

/// Mount table entry covering a path
#[cfg(unix)]
#[derive(Debug)]
pub struct MountInfo {
    /// Device name
    pub device: String,
    /// Mount point
    pub mount_point: String,
    /// Filesystem type
    pub fs_type: String,
}

/// Get the device id for a path
#[cfg(unix)]
pub async fn device_id<P: AsRef<Path>>(path: P) -> Result<u64> {
    use std::os::unix::fs::MetadataExt;

    let path = path.as_ref();
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::volume_lookup(format!("stat '{}': {}", path.display(), e)))?;
    Ok(metadata.dev())
}

/// Get mount information for a Unix path
///
/// Scans `/proc/mounts` for the longest mount point that is a prefix of
/// the path.
#[cfg(unix)]
pub async fn mount_info<P: AsRef<Path>>(path: P) -> Result<MountInfo> {
    let path = path.as_ref();
    debug!("Getting mount info for '{}'", path.display());

    let mounts_content = tokio::fs::read_to_string("/proc/mounts")
        .await
        .map_err(|e| Error::volume_lookup(format!("Failed to read /proc/mounts: {}", e)))?;

    let mut best_match: Option<MountInfo> = None;
    let mut best_match_len = 0;

    for line in mounts_content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        let mount_point = parts[1];
        if path.starts_with(mount_point) && mount_point.len() > best_match_len {
            best_match = Some(MountInfo {
                device: parts[0].to_string(),
                mount_point: mount_point.to_string(),
                fs_type: parts[2].to_string(),
            });
            best_match_len = mount_point.len();
        }
    }

    best_match.ok_or_else(|| Error::volume_lookup("No mount point found for path"))
}

/// Check whether the filesystem behind a path is network-backed
#[cfg(unix)]
pub async fn is_network_mount<P: AsRef<Path>>(path: P) -> Result<bool> {
    let info = mount_info(path).await?;
    Ok(is_network_filesystem(&info.fs_type))
}

/// Check if a filesystem type is network-based
#[cfg(unix)]
pub fn is_network_filesystem(fs_type: &str) -> bool {
    matches!(
        fs_type,
        "nfs" | "nfs4" | "cifs" | "smb" | "smbfs" | "ftp" | "sftp" | "sshfs" | "davfs" | "ceph"
    )
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_device_id() {
        let current_dir = std::env::current_dir().unwrap();
        let id = device_id(&current_dir).await.unwrap();
        let again = device_id(&current_dir).await.unwrap();
        assert_eq!(id, again);
    }

    #[tokio::test]
    async fn test_mount_info() {
        let current_dir = std::env::current_dir().unwrap();

        let result = mount_info(&current_dir).await;
        assert!(result.is_ok());

        if let Ok(info) = result {
            assert!(!info.fs_type.is_empty());
            assert!(!info.mount_point.is_empty());
            assert!(!info.device.is_empty());
        }
    }

    #[test]
    fn test_network_filesystem_detection() {
        assert!(is_network_filesystem("nfs"));
        assert!(is_network_filesystem("cifs"));
        assert!(is_network_filesystem("sshfs"));
        assert!(!is_network_filesystem("ext4"));
        assert!(!is_network_filesystem("tmpfs"));
    }
}
