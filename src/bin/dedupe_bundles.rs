//! Bundle dedupe tool: computes the dedupe bundle layout for a build.
//!
//! Usage: cargo run --bin dedupe_bundles -- --input <FILE> [OPTIONS]
//!
//! Options:
//!   --input <FILE>      Dependency manifest (JSON, `DependencyManifest`)
//!   --output <FILE>     Layout output path (default: bundle_layout.json)
//!   --validate-only     Only validate the manifest, write nothing
//!
//! The layout file is deterministic: the same manifest always produces the
//! same bytes.

use std::path::PathBuf;

use scenedeps::build::{compute_dedupe_bundles, validate_input, DependencyManifest};

fn main() {
    scenedeps::core::logging::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(input) = parse_str_arg(&args, "--input").map(PathBuf::from) else {
        print_usage();
        std::process::exit(2);
    };
    let output = parse_str_arg(&args, "--output")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bundle_layout.json"));
    let validate_only = args.iter().any(|a| a == "--validate-only");

    let manifest = match DependencyManifest::load(&input) {
        Ok(m) => m,
        Err(e) => {
            log::error!("Failed to read manifest {}: {}", input.display(), e);
            std::process::exit(1);
        }
    };
    let sections = manifest.sections.as_deref();

    if validate_only {
        match validate_input(sections) {
            Ok(()) => println!("{}: valid ({} sections)", input.display(), sections.map_or(0, |s| s.len())),
            Err(e) => {
                eprintln!("{}: invalid: {}", input.display(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    let layout = match compute_dedupe_bundles(sections) {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = layout.write_to(&output) {
        log::error!("Failed to write layout {}: {}", output.display(), e);
        std::process::exit(1);
    }

    println!("Bundles: {}", layout.bundle_count());
    println!("Scenes:  {}", layout.dependency_mapping.len());
    println!("Output:  {}", output.display());
}

fn print_usage() {
    eprintln!("dedupe_bundles - compute sub-scene dedupe bundles");
    eprintln!();
    eprintln!("Usage: dedupe_bundles --input <FILE> [--output <FILE>] [--validate-only]");
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
