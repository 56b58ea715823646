//! Parsers for cgroup v2 files.

/// Parses memory.max file.
/// Format: number or "max"
///
/// Returns `None` when the cgroup is unlimited or the content is unreadable.
pub fn parse_memory_max(content: &str) -> Option<u64> {
    let trimmed = content.trim();
    if trimmed == "max" {
        None
    } else {
        trimmed.parse().ok()
    }
}

/// Parses memory.current file.
/// Format: number (bytes)
pub fn parse_memory_current(content: &str) -> Option<u64> {
    content.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_max() {
        assert_eq!(parse_memory_max("1073741824\n"), Some(1073741824));
        assert_eq!(parse_memory_max("max\n"), None);
        assert_eq!(parse_memory_max(""), None);
    }

    #[test]
    fn test_parse_memory_current() {
        assert_eq!(parse_memory_current("524288000\n"), Some(524288000));
        assert_eq!(parse_memory_current("garbage"), None);
    }
}
