//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` filesystem states
//! for a supervisor with a pool of forked workers.

use super::filesystem::MockFs;

const MEMINFO: &str = "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
";

impl MockFs {
    /// A master process (PID 1000) with three forked workers.
    ///
    /// | PID  | PPID | shared | private |
    /// |------|------|--------|---------|
    /// | 1001 | 1000 | 10 MiB | 50 MiB  |
    /// | 1002 | 1000 | 10 MiB | 30 MiB  |
    /// | 1003 | 1000 |  8 MiB | 20 MiB  |
    pub fn worker_pool() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/meminfo", MEMINFO);
        fs.add_process(1, 0, "init", 2048, 1024);
        fs.add_process(1000, 1, "puma 6.4.0 (tcp://0.0.0.0:3000)", 10240, 40960);
        fs.add_process(1001, 1000, "puma: cluster worker 0", 10240, 51200);
        fs.add_process(1002, 1000, "puma: cluster worker 1", 10240, 30720);
        fs.add_process(1003, 1000, "puma: cluster worker 2", 8192, 20480);

        fs
    }

    /// Workers on a kernel without `smaps_rollup`: only `statm` is readable.
    pub fn without_smaps_rollup() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/meminfo", MEMINFO);
        fs.add_statm_process(2000, 1, "unicorn master", 5120);
        fs.add_statm_process(2001, 2000, "unicorn worker[0]", 2560);
        fs.add_statm_process(2002, 2000, "unicorn worker[1]", 3072);

        fs
    }

    /// The worker pool inside a cgroup limited to 1 GiB, 700 MiB in use.
    pub fn containerized_pool() -> Self {
        let mut fs = Self::worker_pool();

        fs.add_file("/sys/fs/cgroup/memory.max", "1073741824\n");
        fs.add_file("/sys/fs/cgroup/memory.current", "734003200\n");

        fs
    }
}
