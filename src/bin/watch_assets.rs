//! Asset watcher: registers every file under a directory with an asset
//! dependency tracker and prints artifact completions as they arrive.
//!
//! Usage: cargo run --bin watch_assets -- --root <DIR> [OPTIONS]
//!
//! Options:
//!   --root <DIR>        Source asset directory
//!   --config <FILE>     Tracker config (JSON, `TrackerConfig`)
//!   --seconds <N>       Stop after N seconds (default: run until killed)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scenedeps::assets::{AssetDatabase, SourceImporter};
use scenedeps::tracker::{AssetDependencyTracker, TrackerConfig};

/// Delay between polls of the completion feed
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() {
    scenedeps::core::logging::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(root) = parse_str_arg(&args, "--root").map(PathBuf::from) else {
        eprintln!("Usage: watch_assets --root <DIR> [--config <FILE>] [--seconds <N>]");
        std::process::exit(2);
    };
    let seconds = parse_u64_arg(&args, "--seconds");

    if let Err(e) = run(root, parse_str_arg(&args, "--config").map(PathBuf::from), seconds) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(root: PathBuf, config_path: Option<PathBuf>, seconds: Option<u64>) -> scenedeps::core::Result<()> {
    let config = match config_path {
        Some(path) => TrackerConfig::load(&path)?,
        None => TrackerConfig::default(),
    };

    let database = Arc::new(AssetDatabase::new(&root));
    let assets = database.import_all()?;

    let mut tracker: AssetDependencyTracker<PathBuf> =
        AssetDependencyTracker::new(Arc::clone(&database), Arc::new(SourceImporter), &config)?;

    for asset in &assets {
        if let Some(path) = database.path_of(*asset) {
            tracker.add(*asset, path, true)?;
        }
    }
    log::info!("Watching {} assets under {}", tracker.total_assets()?, root.display());

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut completed = Vec::new();

    while deadline.is_none_or(|d| Instant::now() < d) {
        tracker.get_completed(&mut completed)?;
        for c in &completed {
            if c.artifact.is_zero() {
                println!("{}  <missing>", c.key.display());
            } else {
                println!("{}  {}", c.key.display(), c.artifact);
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    tracker.close();
    Ok(())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
