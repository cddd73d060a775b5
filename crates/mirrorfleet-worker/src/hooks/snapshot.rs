use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use tracing::info;

use super::JobHook;
use crate::error::{Error, Result};
use crate::runner::CmdJob;

enum SnapshotKind {
    /// `btrfs subvolume snapshot -r <working_dir> <snapshot_path>/<name>-<ts>`
    Btrfs { snapshot_path: PathBuf },
    /// `zfs snapshot <zpool>/<name>@<ts>`
    Zfs { zpool: String },
}

/// Takes a read-only filesystem snapshot after each successful sync.
pub struct SnapshotHook {
    name: String,
    working_dir: PathBuf,
    kind: SnapshotKind,
}

impl SnapshotHook {
    pub fn btrfs(name: &str, working_dir: PathBuf, snapshot_path: &str) -> Self {
        Self {
            name: name.to_string(),
            working_dir,
            kind: SnapshotKind::Btrfs {
                snapshot_path: PathBuf::from(snapshot_path),
            },
        }
    }

    pub fn zfs(name: &str, working_dir: PathBuf, zpool: &str) -> Self {
        Self {
            name: name.to_string(),
            working_dir,
            kind: SnapshotKind::Zfs {
                zpool: zpool.to_string(),
            },
        }
    }

    fn argv(&self) -> Vec<String> {
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        match &self.kind {
            SnapshotKind::Btrfs { snapshot_path } => vec![
                "btrfs".to_string(),
                "subvolume".to_string(),
                "snapshot".to_string(),
                "-r".to_string(),
                self.working_dir.display().to_string(),
                snapshot_path
                    .join(format!("{}-{}", self.name, stamp))
                    .display()
                    .to_string(),
            ],
            SnapshotKind::Zfs { zpool } => vec![
                "zfs".to_string(),
                "snapshot".to_string(),
                format!("{}/{}@{}", zpool, self.name, stamp),
            ],
        }
    }
}

#[async_trait]
impl JobHook for SnapshotHook {
    async fn post_success(&self) -> Result<()> {
        let argv = self.argv();
        info!("taking snapshot: {:?}", argv);
        let job = CmdJob::spawn(&argv, &self.working_dir, &HashMap::new(), None)?;
        let status = job.wait().await?;
        if !status.success() {
            return Err(Error::Sync(format!("snapshot command exited with {status}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btrfs_argv_targets_snapshot_dir() {
        let hook = SnapshotHook::btrfs("alpine", PathBuf::from("/data/alpine"), "/snapshots");
        let argv = hook.argv();
        assert_eq!(&argv[..4], ["btrfs", "subvolume", "snapshot", "-r"]);
        assert_eq!(argv[4], "/data/alpine");
        assert!(argv[5].starts_with("/snapshots/alpine-"));
    }

    #[test]
    fn zfs_argv_names_the_dataset() {
        let hook = SnapshotHook::zfs("alpine", PathBuf::from("/data/alpine"), "tank");
        let argv = hook.argv();
        assert_eq!(argv[0], "zfs");
        assert_eq!(argv[1], "snapshot");
        assert!(argv[2].starts_with("tank/alpine@"));
    }
}
