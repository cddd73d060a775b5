use serde::Deserialize;

use crate::error::{Error, Result};

/// Worker configuration, read from flat environment variables (`NAME`,
/// `PROVIDER`, `UPSTREAM`, `LOG_DIR`, ...). Boolean-ish and list fields stay
/// strings on the wire: booleans follow strconv semantics with anything
/// unparseable meaning false, lists are `;`-separated.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub name: String,
    /// `rsync`, `two-stage-rsync` or `command`.
    pub provider: String,
    pub upstream: String,
    pub log_dir: String,
    pub mirror_dir: String,
    pub concurrent: usize,
    /// Minutes between syncs.
    pub interval: u64,
    pub retry: usize,
    /// Seconds before a running sync is force-terminated; 0 disables.
    pub timeout: u64,

    pub command: String,
    pub fail_on_match: String,
    pub size_pattern: String,
    pub ipv6: String,
    pub ipv4: String,
    pub exclude_file: String,
    pub rsync_no_timeout: String,
    pub rsync_timeout: u64,
    pub rsync_options: String,
    pub rsync_override: String,
    pub stage1_profile: String,

    pub exec_on_success: String,
    pub exec_on_failure: String,

    pub api: String,
    pub addr: String,

    pub zfs: String,
    pub zpool: String,
    pub btrfs: String,
    pub snapshot_path: String,

    pub verbose: String,
    pub debug: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider: String::new(),
            upstream: String::new(),
            log_dir: "/var/log".to_string(),
            mirror_dir: "/data".to_string(),
            concurrent: 0,
            interval: 0,
            retry: 0,
            timeout: 0,
            command: String::new(),
            fail_on_match: String::new(),
            size_pattern: String::new(),
            ipv6: String::new(),
            ipv4: String::new(),
            exclude_file: String::new(),
            rsync_no_timeout: String::new(),
            rsync_timeout: 0,
            rsync_options: String::new(),
            rsync_override: String::new(),
            stage1_profile: String::new(),
            exec_on_success: String::new(),
            exec_on_failure: String::new(),
            api: "http://manager:3000".to_string(),
            addr: ":6000".to_string(),
            zfs: String::new(),
            zpool: String::new(),
            btrfs: String::new(),
            snapshot_path: String::new(),
            verbose: String::new(),
            debug: String::new(),
        }
    }
}

/// strconv-style boolean: `1`, `t`, `true` (any case) are true, everything
/// else is false.
pub fn flag(raw: &str) -> bool {
    matches!(raw, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

/// Split a `;`-separated env list, dropping empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self> {
        let raw = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        let cfg: Config = raw
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()
    }

    fn validate(mut self) -> Result<Self> {
        if self.name.is_empty() || self.provider.is_empty() || self.upstream.is_empty() {
            return Err(Error::Config("failed to get mirror config".to_string()));
        }
        if self.concurrent == 0 {
            self.concurrent = 3;
        }
        if self.interval == 0 {
            self.interval = 1440;
        }
        Ok(self)
    }

    pub fn debug_enabled(&self) -> bool {
        flag(&self.debug)
    }

    pub fn verbose_enabled(&self) -> bool {
        flag(&self.verbose)
    }
}
