//! leakwatchd - Memory supervisor for process pools.
//!
//! Samples the memory of a set of processes on a fixed interval, signals the
//! ones that leak, and signals the largest ones while the pool is over its
//! total size limit or the host is under its free memory minimum.

mod supervise;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use nix::sys::signal::Signal;
use serde::Serialize;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

#[cfg(target_os = "linux")]
use leakwatch_core::collector::RealFs;
#[cfg(not(target_os = "linux"))]
use leakwatch_core::collector::mock::MockFs;
use leakwatch_core::collector::{MemorySource, ProcfsSource};
use leakwatch_core::fmt::{FmtStyle, format_bytes, parse_size};
use leakwatch_core::{Cluster, ClusterSnapshot, MonitorOptions};

use supervise::{Supervisor, Terminator};

/// Memory leak and limit supervisor for process pools.
#[derive(Parser, Debug)]
#[command(
    name = "leakwatchd",
    about = "Memory leak and limit supervisor for process pools",
    version
)]
struct Args {
    /// Process ID to monitor. Repeat for several processes.
    #[arg(short, long = "pid", value_name = "PID")]
    pids: Vec<u32>,

    /// Monitor every child of this process. Children are re-discovered each cycle.
    #[arg(long, value_name = "PID")]
    children_of: Option<u32>,

    /// Check interval in seconds.
    #[arg(short, long, default_value = "10")]
    interval: u64,

    /// Growth over the baseline that counts as an increase (e.g., "10M").
    #[arg(long, default_value = "10M", value_parser = parse_size)]
    threshold_size: u64,

    /// Increases after which a process is leaking. 0 disables the check.
    #[arg(long, default_value = "20")]
    increase_limit: u32,

    /// Resident size above which a process is leaking (e.g., "1G").
    #[arg(long, value_parser = parse_size)]
    maximum_size_limit: Option<u64>,

    /// Limit on the pool's total memory: largest shared size plus all private sizes.
    #[arg(long, value_parser = parse_size)]
    total_size_limit: Option<u64>,

    /// Free memory to keep available on the host (or in the cgroup).
    #[arg(long, value_parser = parse_size)]
    free_size_minimum: Option<u64>,

    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// cgroup v2 directory whose memory limit bounds free memory.
    #[arg(long, value_name = "PATH")]
    cgroup_path: Option<String>,

    /// Signal sent to selected processes (e.g., TERM, KILL, SIGQUIT).
    #[arg(long, default_value = "TERM", value_parser = parse_signal)]
    signal: Signal,

    /// Log selections without signalling anything.
    #[arg(long)]
    dry_run: bool,

    /// Print the cluster snapshot as one JSON line per cycle.
    #[arg(long)]
    json: bool,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            threshold_size: self.threshold_size,
            increase_limit: (self.increase_limit > 0).then_some(self.increase_limit),
            maximum_size_limit: self.maximum_size_limit,
        }
    }
}

/// Parses a signal name with or without the `SIG` prefix.
fn parse_signal(s: &str) -> Result<Signal, String> {
    let name = s.trim().to_ascii_uppercase();
    let name = if name.starts_with("SIG") {
        name
    } else {
        format!("SIG{}", name)
    };
    name.parse::<Signal>()
        .map_err(|_| format!("unknown signal '{}'", s))
}

/// One line of `--json` output.
#[derive(Serialize)]
struct CycleOutput<'a> {
    timestamp: String,
    cluster: &'a ClusterSnapshot,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["leakwatchd", "leakwatch_core"] {
        match format!("{}={}", target, level).parse::<Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_snapshot(snapshot: &ClusterSnapshot) {
    let output = CycleOutput {
        timestamp: Utc::now().to_rfc3339(),
        cluster: snapshot,
    };
    match serde_json::to_string(&output) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to serialize snapshot: {}", e),
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("leakwatchd {} starting", env!("CARGO_PKG_VERSION"));

    #[cfg(target_os = "linux")]
    let fs = RealFs::new();
    #[cfg(not(target_os = "linux"))]
    let fs = MockFs::new();

    let mut source = ProcfsSource::new(fs, &args.proc_path);
    if let Some(ref cgroup_path) = args.cgroup_path {
        source = source.with_cgroup(cgroup_path);
        info!("Free memory accounted against cgroup {}", cgroup_path);
    }

    match (source.free_memory(), source.total_memory()) {
        (Some(free), Some(total)) => info!(
            "Memory: {} free of {}",
            format_bytes(free, FmtStyle::Detail),
            format_bytes(total, FmtStyle::Detail)
        ),
        _ => {
            if args.free_size_minimum.is_some() {
                warn!("Free memory is not readable; --free-size-minimum will have no effect");
            }
        }
    }

    let mut cluster = Cluster::new(source);
    cluster.set_total_size_limit(args.total_size_limit);
    cluster.set_free_size_minimum(args.free_size_minimum);

    let options = args.monitor_options();
    info!(
        "Config: interval={}s, threshold={}, increase_limit={:?}, maximum_size_limit={}, signal={}{}",
        args.interval,
        format_bytes(options.threshold_size, FmtStyle::Compact),
        options.increase_limit,
        options
            .maximum_size_limit
            .map_or_else(|| "-".to_string(), |s| format_bytes(s, FmtStyle::Compact)),
        args.signal,
        if args.dry_run { " (dry run)" } else { "" }
    );

    let terminator = Terminator::new(args.signal, args.dry_run);
    let mut supervisor = match Supervisor::new(
        cluster,
        terminator,
        options,
        args.pids.clone(),
        args.children_of,
    ) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let interval = Duration::from_secs(args.interval);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    while running.load(Ordering::SeqCst) {
        supervisor.cycle();

        if args.json {
            print_snapshot(&supervisor.cluster().snapshot());
        }

        if args.once {
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete");
}
