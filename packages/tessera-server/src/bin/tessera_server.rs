//! tessera-server - unix socket server for the graph engine
//!
//! Loads the assigned partitions from a data directory and serves the
//! query surface until SIGINT/SIGTERM.
//!
//! Usage:
//!   tessera-server /path/to/graph --partitions 0,1 [--socket /tmp/tessera.sock]
//!
//! Protocol:
//!   Request:  [4-byte length BE] [MessagePack payload]
//!   Response: [4-byte length BE] [MessagePack payload]

use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::thread;

use tessera::{EngineOptions, GraphEngine, StorageType};

const DEFAULT_SOCKET: &str = "/tmp/tessera.sock";

fn print_usage() {
    println!("tessera-server {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Partitioned graph-serving engine");
    println!();
    println!("Usage: tessera-server <data-path> --partitions <csv> [options]");
    println!();
    println!("Arguments:");
    println!("  <data-path>         Directory with meta.json, node maps and partition files");
    println!();
    println!("Options:");
    println!("  --partitions <csv>  Partition numbers assigned to this server (e.g. 0,1,2)");
    println!("  --socket <path>     Unix socket path (default: {})", DEFAULT_SOCKET);
    println!("  --storage <kind>    Storage backend: disk | remote (default: disk)");
    println!("  --config <path>     Extra configuration for remote backends");
    println!("  --threadpool        Fan feature queries out over a worker pool");
    println!("  -V, --version       Print version information");
    println!("  -h, --help          Print this help message");
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_partitions(csv: &str) -> Option<Vec<u32>> {
    csv.split(',')
        .map(|p| p.trim().parse::<u32>().ok())
        .collect()
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("tessera-server {}", env!("CARGO_PKG_VERSION"));
        exit(0);
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        exit(0);
    }
    if args.len() < 2 || args[1].starts_with("--") {
        eprintln!("Error: first argument must be the data path.");
        eprintln!();
        print_usage();
        exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = PathBuf::from(&args[1]);

    let partitions = match flag_value(&args, "--partitions").as_deref().map(parse_partitions) {
        Some(Some(partitions)) if !partitions.is_empty() => partitions,
        Some(_) => {
            eprintln!("Error: --partitions expects a comma-separated list of numbers.");
            exit(1);
        }
        None => {
            eprintln!("Error: --partitions is required.");
            exit(1);
        }
    };

    let storage_type = match flag_value(&args, "--storage").as_deref() {
        None | Some("disk") => StorageType::Disk,
        Some("remote") => StorageType::Remote,
        Some(other) => {
            eprintln!("Error: unknown storage backend '{}'.", other);
            exit(1);
        }
    };

    let options = EngineOptions {
        path,
        partitions,
        storage_type,
        config_path: flag_value(&args, "--config").map(PathBuf::from),
        enable_threadpool: args.iter().any(|a| a == "--threadpool"),
    };

    let socket_path = flag_value(&args, "--socket").unwrap_or_else(|| DEFAULT_SOCKET.to_string());

    let engine = match GraphEngine::load(options) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("[tessera-server] Failed to load graph: {}", e);
            exit(1);
        }
    };
    eprintln!(
        "[tessera-server] Loaded {} partitions, {} nodes",
        engine.partition_count(),
        engine.known_node_count()
    );

    // Remove a stale socket from an earlier run before binding.
    let _ = std::fs::remove_file(&socket_path);
    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("[tessera-server] Failed to bind {}: {}", socket_path, e);
            exit(1);
        }
    };
    eprintln!("[tessera-server] Listening on {}", socket_path);

    let socket_path_for_signal = socket_path.clone();
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
    ])
    .expect("Failed to register signal handlers");

    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            eprintln!("[tessera-server] Received signal {}, shutting down", sig);
            let _ = std::fs::remove_file(&socket_path_for_signal);
            exit(0);
        }
    });

    if let Err(e) = tessera::server::serve(listener, engine) {
        eprintln!("[tessera-server] Server error: {}", e);
        let _ = std::fs::remove_file(&socket_path);
        exit(1);
    }
}
