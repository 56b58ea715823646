//! Byte-size formatting and parsing for log lines and command-line options.

/// Controls compact (log fields) vs verbose (summaries) output.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FmtStyle {
    /// Compact: no spaces, short suffixes ("1.5G")
    Compact,
    /// Detail: spaces, full suffixes ("1.5 GiB")
    Detail,
}

/// Format byte count as human-readable size.
///
/// Compact: `"1.5G"`, `"100.3M"`, `"50.0K"`, `"512B"`
/// Detail:  `"1.5 GiB"`, `"100.3 MiB"`, `"50.0 KiB"`, `"512 B"`
pub fn format_bytes(bytes: u64, style: FmtStyle) -> String {
    let (g, m, k, b) = match style {
        FmtStyle::Compact => ("G", "M", "K", "B"),
        FmtStyle::Detail => (" GiB", " MiB", " KiB", " B"),
    };
    let f = bytes as f64;
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1}{}", f / (1024.0 * 1024.0 * 1024.0), g)
    } else if bytes >= 1024 * 1024 {
        format!("{:.1}{}", f / (1024.0 * 1024.0), m)
    } else if bytes >= 1024 {
        format!("{:.1}{}", f / 1024.0, k)
    } else {
        format!("{}{}", bytes, b)
    }
}

/// Parses a human-readable size string (e.g., "1G", "500M", "1024K") into bytes.
///
/// A bare number is taken as bytes.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix('G') {
        (num, 1024 * 1024 * 1024)
    } else if let Some(num) = s.strip_suffix('M') {
        (num, 1024 * 1024)
    } else if let Some(num) = s.strip_suffix('K') {
        (num, 1024)
    } else {
        (s, 1)
    };

    num_str
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid size '{}': {}", s, e))?
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512, FmtStyle::Compact), "512B");
        assert_eq!(format_bytes(1536, FmtStyle::Compact), "1.5K");
        assert_eq!(format_bytes(60 * 1024 * 1024, FmtStyle::Compact), "60.0M");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 / 2, FmtStyle::Detail), "1.5 GiB");
        assert_eq!(format_bytes(0, FmtStyle::Detail), "0 B");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024"), Ok(1024));
        assert_eq!(parse_size("4K"), Ok(4096));
        assert_eq!(parse_size("10M"), Ok(10 * 1024 * 1024));
        assert_eq!(parse_size(" 2G "), Ok(2 * 1024 * 1024 * 1024));
    }

    #[test]
    fn test_parse_size_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("-5M").is_err());
        assert!(parse_size("99999999999999999999G").is_err());
        assert!(parse_size("18446744073709551615G").is_err());
    }
}
