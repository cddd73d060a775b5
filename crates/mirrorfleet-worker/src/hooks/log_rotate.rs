use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use tracing::warn;

use super::JobHook;
use crate::error::Result;

const KEEP_ROTATED: usize = 10;

/// Rotates `latest.log` into timestamped files before each attempt and keeps
/// the newest ten. A failed attempt additionally leaves `latest.log.fail`.
pub struct LogRotateHook {
    name: String,
    log_dir: PathBuf,
    log_file: PathBuf,
}

impl LogRotateHook {
    pub fn new(name: &str, log_dir: PathBuf, log_file: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            log_dir,
            log_file,
        }
    }

    fn rotate(&self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;

        let non_empty = self
            .log_file
            .metadata()
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if non_empty {
            let stamp = Local::now().format("%Y-%m-%d_%H%M%S");
            let rotated = self.log_dir.join(format!("{}_{}.log", self.name, stamp));
            std::fs::rename(&self.log_file, &rotated)?;
        }
        self.prune()
    }

    fn prune(&self) -> Result<()> {
        let prefix = format!("{}_", self.name);
        let mut rotated: Vec<PathBuf> = std::fs::read_dir(&self.log_dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".log"))
            })
            .collect();
        // timestamped names sort chronologically
        rotated.sort();
        while rotated.len() > KEEP_ROTATED {
            let oldest = rotated.remove(0);
            if let Err(e) = std::fs::remove_file(&oldest) {
                warn!("failed to prune {}: {e}", oldest.display());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobHook for LogRotateHook {
    async fn pre_exec(&self) -> Result<()> {
        self.rotate()
    }

    async fn post_fail(&self) -> Result<()> {
        if self.log_file.exists() {
            let fail = self.log_file.with_extension("log.fail");
            std::fs::copy(&self.log_file, fail)?;
        }
        Ok(())
    }
}
