//! Plain rsync provider: one pass over the upstream module.

use crate::config::{flag, split_list, Config};
use crate::error::{Error, Result};

/// Baseline option set for mirror syncs.
pub(crate) const DEFAULT_RSYNC_OPTIONS: &[&str] = &[
    "-aHvh",
    "--no-o",
    "--no-g",
    "--stats",
    "--filter",
    "risk .~tmp~/",
    "--exclude",
    ".~tmp~/",
    "--delete",
    "--delete-after",
    "--delay-updates",
    "--safe-links",
];

/// Network/selection options shared by every rsync invocation: the rsync-side
/// `--timeout`, address family pinning, and the exclude file.
pub(crate) fn common_network_options(cfg: &Config) -> Vec<String> {
    let mut options = Vec::new();
    if !flag(&cfg.rsync_no_timeout) {
        let timeo = if cfg.rsync_timeout > 0 {
            cfg.rsync_timeout
        } else {
            120
        };
        options.push(format!("--timeout={timeo}"));
    }
    if flag(&cfg.ipv6) {
        options.push("-6".to_string());
    } else if flag(&cfg.ipv4) {
        options.push("-4".to_string());
    }
    if !cfg.exclude_file.is_empty() {
        options.push("--exclude-from".to_string());
        options.push(cfg.exclude_file.clone());
    }
    options
}

pub(crate) struct RsyncOptions {
    pub command: String,
    pub options: Vec<String>,
}

impl RsyncOptions {
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

        let overridden = split_list(&cfg.rsync_override);
        let mut options: Vec<String> = if overridden.is_empty() {
            DEFAULT_RSYNC_OPTIONS.iter().map(|s| s.to_string()).collect()
        } else {
            overridden
        };
        options.extend(common_network_options(cfg));
        options.extend(split_list(&cfg.rsync_options));

        Ok(Self { command, options })
    }

    pub fn argv(&self, upstream: &str, working_dir: &str) -> Vec<String> {
        let mut argv = vec![self.command.clone()];
        argv.extend(self.options.iter().cloned());
        argv.push(upstream.to_string());
        argv.push(working_dir.to_string());
        argv
    }
}

/// Translate an rsync exit code into its documented meaning.
pub fn rsync_exit_message(code: i32) -> Option<&'static str> {
    Some(match code {
        0 => "Success",
        1 => "Syntax or usage error",
        2 => "Protocol incompatibility",
        3 => "Errors selecting input/output files, dirs",
        4 => "Requested action not supported: an attempt was made to manipulate 64-bit files on a platform that cannot support them; or an option was specified that is supported by the client and not by the server.",
        5 => "Error starting client-server protocol",
        6 => "Daemon unable to append to log-file",
        10 => "Error in socket I/O",
        11 => "Error in file I/O",
        12 => "Error in rsync protocol data stream",
        13 => "Errors with program diagnostics",
        14 => "Error in IPC code",
        20 => "Received SIGUSR1 or SIGINT",
        21 => "Some error returned by waitpid()",
        22 => "Error allocating core memory buffers",
        23 => "Partial transfer due to error",
        24 => "Partial transfer due to vanished source files",
        25 => "The --max-delete limit stopped deletions",
        30 => "Timeout in data send/receive",
        35 => "Timeout waiting for daemon connection",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            name: "alpine".into(),
            provider: "rsync".into(),
            upstream: "rsync://rsync.alpinelinux.org/alpine/".into(),
            ..Default::default()
        }
    }

    #[test]
    fn default_options_carry_the_mirror_set() {
        let opts = RsyncOptions::from_config(&base_config()).unwrap();
        assert_eq!(opts.command, "rsync");
        assert!(opts.options.iter().any(|o| o == "-aHvh"));
        assert!(opts.options.iter().any(|o| o == "--delete-after"));
        assert!(opts.options.iter().any(|o| o == "--timeout=120"));
    }

    #[test]
    fn override_replaces_the_default_set() {
        let mut cfg = base_config();
        cfg.rsync_override = "-av;--partial".into();
        cfg.rsync_no_timeout = "true".into();
        let opts = RsyncOptions::from_config(&cfg).unwrap();
        assert_eq!(opts.options, vec!["-av", "--partial"]);
    }

    #[test]
    fn ipv6_wins_over_ipv4() {
        let mut cfg = base_config();
        cfg.ipv6 = "true".into();
        cfg.ipv4 = "true".into();
        let opts = RsyncOptions::from_config(&cfg).unwrap();
        assert!(opts.options.iter().any(|o| o == "-6"));
        assert!(!opts.options.iter().any(|o| o == "-4"));
    }

    #[test]
    fn exclude_file_and_extras_are_appended() {
        let mut cfg = base_config();
        cfg.exclude_file = "/etc/excludes.txt".into();
        cfg.rsync_options = "--bwlimit=1000".into();
        let opts = RsyncOptions::from_config(&cfg).unwrap();
        let joined = opts.options.join(" ");
        assert!(joined.contains("--exclude-from /etc/excludes.txt"));
        assert!(joined.ends_with("--bwlimit=1000"));
    }

    #[test]
    fn upstream_must_end_with_slash() {
        let mut cfg = base_config();
        cfg.upstream = "rsync://rsync.alpinelinux.org/alpine".into();
        assert!(RsyncOptions::from_config(&cfg).is_err());
    }

    #[test]
    fn argv_ends_with_upstream_and_dest() {
        let opts = RsyncOptions::from_config(&base_config()).unwrap();
        let argv = opts.argv("rsync://rsync.alpinelinux.org/alpine/", "/data/alpine");
        assert_eq!(argv[0], "rsync");
        assert_eq!(argv[argv.len() - 2], "rsync://rsync.alpinelinux.org/alpine/");
        assert_eq!(argv[argv.len() - 1], "/data/alpine");
    }

    #[test]
    fn exit_codes_translate() {
        assert_eq!(rsync_exit_message(30), Some("Timeout in data send/receive"));
        assert_eq!(
            rsync_exit_message(35),
            Some("Timeout waiting for daemon connection")
        );
        assert_eq!(rsync_exit_message(99), None);
    }
}
