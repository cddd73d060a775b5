//! Two-stage rsync provider.
//!
//! Stage one transfers the bulk of the tree while excluding the metadata
//! files named by the stage-1 profile; stage two runs the full sync with
//! deletes, so clients never observe indexes pointing at missing packages.

use crate::config::{split_list, Config};
use crate::error::{Error, Result};

use super::rsync::common_network_options;

const STAGE_BASE_OPTIONS: &[&str] = &[
    "-aHvh",
    "--no-o",
    "--no-g",
    "--stats",
    "--filter",
    "risk .~tmp~/",
    "--exclude",
    ".~tmp~/",
    "--safe-links",
];

const STAGE2_DELETE_OPTIONS: &[&str] = &["--delete", "--delete-after", "--delay-updates"];

fn profile_excludes(profile: &str) -> Result<Vec<&'static str>> {
    match profile {
        "debian" => Ok(vec!["dists/"]),
        "debian-oldstyle" => Ok(vec![
            "Packages*",
            "Sources*",
            "Release*",
            "InRelease",
            "i18n/*",
            "ls-lR*",
            "dep11/*",
        ]),
        other => Err(Error::Config(format!("unknown stage1 profile: {other}"))),
    }
}

pub(crate) struct TwoStageOptions {
    pub command: String,
    stage1_excludes: Vec<&'static str>,
    extra: Vec<String>,
    common: Vec<String>,
}

impl TwoStageOptions {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        if !cfg.upstream.ends_with('/') {
            return Err(Error::Config(
                "rsync upstream URL should end with /".to_string(),
            ));
        }
        let command = if cfg.command.is_empty() {
            "rsync".to_string()
        } else {
            cfg.command.clone()
        };
        Ok(Self {
            command,
            stage1_excludes: profile_excludes(&cfg.stage1_profile)?,
            extra: split_list(&cfg.rsync_options),
            common: common_network_options(cfg),
        })
    }

    fn base(&self) -> Vec<String> {
        let mut argv = vec![self.command.clone()];
        argv.extend(STAGE_BASE_OPTIONS.iter().map(|s| s.to_string()));
        argv
    }

    pub fn stage1_argv(&self, upstream: &str, working_dir: &str) -> Vec<String> {
        let mut argv = self.base();
        // stage 1 only pre-seeds content; mtime comparison is left to stage 2
        argv.push("--size-only".to_string());
        for pattern in &self.stage1_excludes {
            argv.push("--exclude".to_string());
            argv.push((*pattern).to_string());
        }
        argv.extend(self.common.iter().cloned());
        argv.push(upstream.to_string());
        argv.push(working_dir.to_string());
        argv
    }

    pub fn stage2_argv(&self, upstream: &str, working_dir: &str) -> Vec<String> {
        let mut argv = self.base();
        argv.extend(STAGE2_DELETE_OPTIONS.iter().map(|s| s.to_string()));
        argv.extend(self.extra.iter().cloned());
        argv.extend(self.common.iter().cloned());
        argv.push(upstream.to_string());
        argv.push(working_dir.to_string());
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            name: "debian".into(),
            provider: "two-stage-rsync".into(),
            upstream: "rsync://deb.debian.org/debian/".into(),
            stage1_profile: "debian".into(),
            ..Default::default()
        }
    }

    #[test]
    fn stage_one_excludes_profile_paths_without_deleting() {
        let opts = TwoStageOptions::from_config(&base_config()).unwrap();
        let argv = opts.stage1_argv("rsync://deb.debian.org/debian/", "/data/debian");
        let joined = argv.join(" ");
        assert!(joined.contains("--exclude dists/"));
        assert!(!joined.contains("--delete"));
    }

    #[test]
    fn stage_one_transfers_by_size_only() {
        let opts = TwoStageOptions::from_config(&base_config()).unwrap();
        let argv = opts.stage1_argv("rsync://deb.debian.org/debian/", "/data/debian");
        assert!(argv.iter().any(|o| o == "--size-only"));
    }

    #[test]
    fn stage_two_deletes_after() {
        let opts = TwoStageOptions::from_config(&base_config()).unwrap();
        let argv = opts.stage2_argv("rsync://deb.debian.org/debian/", "/data/debian");
        let joined = argv.join(" ");
        assert!(joined.contains("--delete-after"));
        assert!(joined.contains("--delay-updates"));
        assert!(!joined.contains("--exclude dists/"));
        assert!(!joined.contains("--size-only"));
    }

    #[test]
    fn oldstyle_profile_excludes_index_files() {
        let mut cfg = base_config();
        cfg.stage1_profile = "debian-oldstyle".into();
        let opts = TwoStageOptions::from_config(&cfg).unwrap();
        let joined = opts
            .stage1_argv("rsync://deb.debian.org/debian/", "/data/debian")
            .join(" ");
        assert!(joined.contains("--exclude Packages*"));
        assert!(joined.contains("--exclude dep11/*"));
    }

    #[test]
    fn unknown_profile_is_a_config_error() {
        let mut cfg = base_config();
        cfg.stage1_profile = "gentoo".into();
        assert!(TwoStageOptions::from_config(&cfg).is_err());
    }
}
