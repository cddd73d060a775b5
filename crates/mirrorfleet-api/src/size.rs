//! Human-readable size strings with binary prefixes.

const K: u64 = 1024;
const M: u64 = 1024 * K;
const G: u64 = 1024 * M;
const T: u64 = 1024 * G;

/// Format a byte count with binary prefixes, two decimals above 1K.
pub fn format_size(size: u64) -> String {
    if size > T {
        format!("{:.2}T", size as f64 / T as f64)
    } else if size > G {
        format!("{:.2}G", size as f64 / G as f64)
    } else if size > M {
        format!("{:.2}M", size as f64 / M as f64)
    } else if size > K {
        format!("{:.2}K", size as f64 / K as f64)
    } else {
        format!("{}B", size)
    }
}

/// Parse a size string back into bytes.
///
/// Tolerates whitespace, a trailing `b` (bits, divided by 8) or `B`, and an
/// `i` binary-suffix marker (`GiB`). Unparseable input yields 0.
pub fn parse_size(s: &str) -> u64 {
    if s.is_empty() || s == "unknown" {
        return 0;
    }
    let mut s: String = s.chars().filter(|c| !c.is_whitespace()).collect();

    let is_bit = if s.ends_with('b') {
        s.pop();
        true
    } else {
        if s.ends_with('B') {
            s.pop();
        }
        false
    };
    if s.ends_with('i') || s.ends_with('I') {
        s.pop();
    }
    let s = s.to_uppercase();
    if s.is_empty() {
        return 0;
    }

    let (head, unit) = s.split_at(s.len() - 1);
    let raw = match unit {
        "T" => head.parse::<f64>().map(|v| v * T as f64),
        "G" => head.parse::<f64>().map(|v| v * G as f64),
        "M" => head.parse::<f64>().map(|v| v * M as f64),
        "K" => head.parse::<f64>().map(|v| v * K as f64),
        _ => s.parse::<f64>(),
    };
    let Ok(raw) = raw else { return 0 };

    if is_bit {
        (raw / 8.0) as u64
    } else {
        raw as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_prefix() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(1536), "1.50K");
        assert_eq!(format_size(5 * M + M / 2), "5.50M");
        assert_eq!(format_size(2 * G), "2.00G");
        assert_eq!(format_size(3 * T + T / 4), "3.25T");
    }

    #[test]
    fn parses_plain_and_suffixed() {
        assert_eq!(parse_size("1024"), 1024);
        assert_eq!(parse_size("1.50K"), 1536);
        assert_eq!(parse_size("2.00GiB"), 2 * G);
        assert_eq!(parse_size("3T"), 3 * T);
        assert_eq!(parse_size(" 1.5 M "), M + M / 2);
    }

    #[test]
    fn bits_are_divided_by_eight() {
        assert_eq!(parse_size("8Kb"), 1024);
    }

    #[test]
    fn garbage_and_unknown_parse_to_zero() {
        assert_eq!(parse_size(""), 0);
        assert_eq!(parse_size("unknown"), 0);
        assert_eq!(parse_size("lots"), 0);
    }

    #[test]
    fn round_trip_within_rounding() {
        for n in [5 * G, 123 * M, 9 * T, 1536] {
            let parsed = parse_size(&format_size(n));
            let err = (parsed as f64 - n as f64).abs() / n as f64;
            assert!(err < 0.01, "{n} -> {parsed}");
        }
    }
}
