//! pysurface - Command-line tool for reconstructing the API surface of Python services.
//!
//! This binary analyzes a Python project without running it and reports, per
//! service, the handlers reachable from its URL routing table (entry points)
//! and the outbound HTTP calls its own code issues (exit points).
//!
//! # Usage
//!
//! ```bash
//! pysurface [OPTIONS] <PROJECT_PATH>
//! ```
//!
//! # Examples
//!
//! Print the surface as YAML:
//! ```bash
//! pysurface ./platform
//! ```
//!
//! Write JSON with a custom analyzer configuration:
//! ```bash
//! pysurface ./platform -c pysurface.yaml -f json -o surface.json
//! ```
//!
//! Enable verbose logging:
//! ```bash
//! pysurface ./platform -v
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use pysurface::cli;

fn main() -> Result<()> {
    // Parse once so the verbose flag is known before the logger exists
    let args_for_verbose = cli::CliArgs::parse();

    let rust_log = std::env::var("RUST_LOG").ok();
    let mut logger = env_logger::Builder::from_default_env();
    if let Some(level) = cli::log_level(args_for_verbose.verbose, rust_log.as_deref()) {
        logger.filter_level(level);
    }
    logger.init();

    info!("pysurface starting...");

    let args = cli::parse_args_from_parsed(args_for_verbose)?;

    cli::run(args)?;

    info!("API surface extraction completed successfully");

    Ok(())
}
