//! In-memory mock filesystem for testing sources without real `/proc`.
//!
//! This module provides `MockFs` which simulates a filesystem in memory,
//! allowing tests to run on macOS and in CI environments without Linux.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores files and directories in memory, allowing tests to simulate
/// various `/proc` filesystem states without needing actual Linux access.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Removes a file, simulating a process exiting between reads.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Adds a process with `stat` and `smaps_rollup` files.
    ///
    /// # Arguments
    /// * `pid` - Process ID
    /// * `ppid` - Parent process ID
    /// * `comm` - Command name
    /// * `shared_kb` - Shared resident memory in kB
    /// * `private_kb` - Private resident memory in kB
    pub fn add_process(&mut self, pid: u32, ppid: u32, comm: &str, shared_kb: u64, private_kb: u64) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat_line(pid, ppid, comm));
        self.add_file(base.join("smaps_rollup"), smaps_rollup(shared_kb, private_kb));
    }

    /// Adds a process that only exposes `statm` (no shared/private breakdown).
    pub fn add_statm_process(&mut self, pid: u32, ppid: u32, comm: &str, resident_pages: u64) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat_line(pid, ppid, comm));
        self.add_file(
            base.join("statm"),
            format!("{} {} 0 0 0 {} 0\n", resident_pages * 4, resident_pages, resident_pages),
        );
    }
}

/// Builds a `/proc/[pid]/stat` line with the given identity fields.
pub fn stat_line(pid: u32, ppid: u32, comm: &str) -> String {
    format!(
        "{} ({}) S {} {} {} 0 -1 4194560 1000 0 0 0 50 10 0 0 20 0 1 0 5000 104857600 2560 \
         18446744073709551615 1 1 0 0 0 0 0 4096 0 0 0 0 17 0 0 0 0 0 0\n",
        pid, comm, ppid, pid, pid
    )
}

/// Builds a `/proc/[pid]/smaps_rollup` file for the given breakdown.
pub fn smaps_rollup(shared_kb: u64, private_kb: u64) -> String {
    format!(
        "\
00400000-7fffffffe000 ---p 00000000 00:00 0                          [rollup]
Rss:            {rss:>8} kB
Shared_Clean:   {shared:>8} kB
Shared_Dirty:          0 kB
Private_Clean:         0 kB
Private_Dirty:  {private:>8} kB
Referenced:     {rss:>8} kB
Anonymous:      {private:>8} kB
Swap:                  0 kB
",
        rss = shared_kb + private_kb,
        shared = shared_kb,
        private = private_kb,
    )
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::procfs::parser::{parse_proc_stat, parse_smaps_rollup};

    #[test]
    fn test_mock_fs_add_file() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/meminfo", "MemTotal: 16384 kB\n");

        assert!(fs.exists(Path::new("/proc/meminfo")));
        assert!(fs.exists(Path::new("/proc")));

        let content = fs.read_to_string(Path::new("/proc/meminfo")).unwrap();
        assert_eq!(content, "MemTotal: 16384 kB\n");
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/1/stat", "stat content");
        fs.add_file("/proc/1/statm", "statm content");
        fs.add_file("/proc/2/stat", "stat content 2");

        let proc_entries = fs.read_dir(Path::new("/proc")).unwrap();
        assert_eq!(proc_entries.len(), 2);

        let proc1_entries = fs.read_dir(Path::new("/proc/1")).unwrap();
        assert_eq!(proc1_entries.len(), 2);
    }

    #[test]
    fn test_mock_fs_remove_file() {
        let mut fs = MockFs::new();
        fs.add_process(42, 1, "worker", 100, 200);
        fs.remove_file("/proc/42/smaps_rollup");

        assert!(!fs.exists(Path::new("/proc/42/smaps_rollup")));
        assert!(fs.exists(Path::new("/proc/42/stat")));
    }

    #[test]
    fn test_generated_files_parse() {
        let stat = parse_proc_stat(&stat_line(1234, 1000, "puma: cluster worker 0")).unwrap();
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.ppid, 1000);

        let rollup = parse_smaps_rollup(&smaps_rollup(100, 300)).unwrap();
        assert_eq!(rollup.rss, 400);
        assert_eq!(rollup.shared(), 100);
        assert_eq!(rollup.private(), 300);
    }

    #[test]
    fn test_mock_fs_not_found() {
        let fs = MockFs::new();
        let result = fs.read_to_string(Path::new("/nonexistent"));
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
