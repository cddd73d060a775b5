//! Log scraping and filesystem helpers shared by the providers.

use std::path::Path;

use regex::Regex;

use mirrorfleet_api::size::parse_size;

/// Last capture-group match of `re` in the log file, parsed as a size.
pub fn extract_size_from_log(log_file: &Path, re: &Regex) -> u64 {
    let Ok(content) = std::fs::read_to_string(log_file) else {
        return 0;
    };
    re.captures_iter(&content)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| parse_size(m.as_str()))
        .unwrap_or(0)
}

/// Extract the transferred tree size from an rsync `--stats` log.
pub fn extract_size_from_rsync_log(log_file: &Path) -> u64 {
    // unwrap: the pattern is a compile-time constant
    let re = Regex::new(r"(?m)^Total file size: ([0-9.]+[KMGTP]?) bytes").unwrap();
    extract_size_from_log(log_file, &re)
}

/// Total size of all regular files below `path`.
pub fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    let mut total = 0;
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            total += dir_size(&entry.path());
        } else if meta.is_file() {
            total += meta.len();
        }
    }
    total
}
