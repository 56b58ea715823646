//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of various `/proc` files
//! into structured data. They are designed to be easily testable with string inputs.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Reads the numeric column of a `Key:   123 kB` line.
fn parse_kb(line: &str) -> u64 {
    line.split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Parsed data from `/proc/[pid]/smaps_rollup`.
///
/// All values are in kilobytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmapsRollup {
    pub rss: u64,
    pub shared_clean: u64,
    pub shared_dirty: u64,
    pub private_clean: u64,
    pub private_dirty: u64,
}

impl SmapsRollup {
    /// Shared resident memory (kB).
    pub fn shared(&self) -> u64 {
        self.shared_clean + self.shared_dirty
    }

    /// Private resident memory (kB).
    pub fn private(&self) -> u64 {
        self.private_clean + self.private_dirty
    }
}

/// Parses `/proc/[pid]/smaps_rollup` content.
///
/// The first line is the synthetic `[rollup]` mapping header and is skipped.
/// A file without an `Rss:` line is rejected: zombies and kernel threads
/// produce an empty rollup that must not read as "0 bytes resident".
pub fn parse_smaps_rollup(content: &str) -> Result<SmapsRollup, ParseError> {
    let mut rollup = SmapsRollup::default();
    let mut seen_rss = false;

    for line in content.lines() {
        let Some((key, _)) = line.split_once(':') else {
            continue;
        };
        match key {
            "Rss" => {
                rollup.rss = parse_kb(line);
                seen_rss = true;
            }
            "Shared_Clean" => rollup.shared_clean = parse_kb(line),
            "Shared_Dirty" => rollup.shared_dirty = parse_kb(line),
            "Private_Clean" => rollup.private_clean = parse_kb(line),
            "Private_Dirty" => rollup.private_dirty = parse_kb(line),
            _ => {}
        }
    }

    if !seen_rss {
        return Err(ParseError::new("missing Rss in smaps_rollup"));
    }

    Ok(rollup)
}

/// Parsed data from `/proc/[pid]/statm`.
///
/// All values are in pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statm {
    pub resident: u64,
}

/// Parses `/proc/[pid]/statm` content.
///
/// Format: size resident shared text lib data dt
pub fn parse_statm(content: &str) -> Result<Statm, ParseError> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(ParseError::new(format!(
            "not enough fields in statm: expected 2+, got {}",
            fields.len()
        )));
    }

    let resident = fields[1]
        .parse()
        .map_err(|_| ParseError::new("invalid resident"))?;

    Ok(Statm { resident })
}

/// Parsed data from `/proc/meminfo`.
///
/// All values are in kilobytes.
#[derive(Debug, Clone, Default)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: Option<u64>,
}

impl MemInfo {
    /// Memory available for new allocations without swapping (kB).
    ///
    /// Kernels older than 3.14 lack `MemAvailable`; `MemFree` stands in.
    pub fn available(&self) -> u64 {
        self.mem_available.unwrap_or(self.mem_free)
    }
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();
    let mut seen_total = false;

    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            info.mem_total = parse_kb(line);
            seen_total = true;
        } else if line.starts_with("MemFree:") {
            info.mem_free = parse_kb(line);
        } else if line.starts_with("MemAvailable:") {
            info.mem_available = Some(parse_kb(line));
        }
    }

    if !seen_total {
        return Err(ParseError::new("missing MemTotal in meminfo"));
    }

    Ok(info)
}

/// The state and parent fields of `/proc/[pid]/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcStat {
    pub state: char,
    pub ppid: u32,
}

impl ProcStat {
    /// Zombie (`Z`) or dead (`X`/`x`): exited, waiting to be reaped.
    pub fn has_exited(&self) -> bool {
        matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Parses the leading fields of `/proc/[pid]/stat`.
///
/// The comm field can contain spaces and parentheses, so it is delimited by
/// the first '(' and the last ')'.
/// Format: pid (comm) state ppid ...
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    content[..open_paren]
        .trim()
        .parse::<u32>()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let mut fields = content[close_paren + 1..].split_whitespace();
    let state = fields
        .next()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| ParseError::new("missing field state"))?;
    let ppid = fields
        .next()
        .ok_or_else(|| ParseError::new("missing field ppid"))?
        .parse()
        .map_err(|_| ParseError::new("invalid ppid"))?;

    Ok(ProcStat { state, ppid })
}
