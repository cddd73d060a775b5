//! Command provider: one configured shell line per sync.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;

use crate::config::Config;
use crate::error::{Error, Result};

pub(crate) struct CommandOptions {
    pub command_line: String,
    /// Sync fails when this pattern appears in the log even if the command
    /// exited zero.
    pub fail_on_match: Option<Regex>,
    /// Extracts the data size from the log; without it the working dir is
    /// walked.
    pub size_pattern: Option<Regex>,
}

impl CommandOptions {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        if cfg.command.trim().is_empty() {
            return Err(Error::Config("command not set".to_string()));
        }
        let compile = |raw: &str| -> Result<Option<Regex>> {
            if raw.is_empty() {
                return Ok(None);
            }
            Regex::new(raw)
                .map(Some)
                .map_err(|e| Error::Config(format!("invalid pattern {raw}: {e}")))
        };
        Ok(Self {
            command_line: cfg.command.clone(),
            fail_on_match: compile(&cfg.fail_on_match)?,
            size_pattern: compile(&cfg.size_pattern)?,
        })
    }

    pub fn argv(&self) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            self.command_line.clone(),
        ]
    }

    /// Environment exposed to the command and to exec hooks.
    pub fn job_env(
        name: &str,
        upstream: &str,
        working_dir: &Path,
        log_dir: &Path,
        log_file: &Path,
    ) -> HashMap<String, String> {
        HashMap::from([
            ("NAME".to_string(), name.to_string()),
            ("UPSTREAM".to_string(), upstream.to_string()),
            (
                "WORKING_DIR".to_string(),
                working_dir.display().to_string(),
            ),
            ("LOG_DIR".to_string(), log_dir.display().to_string()),
            ("LOG_FILE".to_string(), log_file.display().to_string()),
        ])
    }
}
