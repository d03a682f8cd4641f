use crate::config::AnalyzerConfig;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use std::path::PathBuf;

/// pysurface - Reconstruct the API surface (entry and exit points) of Python services
#[derive(Parser, Debug)]
#[command(name = "pysurface")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the project directory (or a single Python file)
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// System name (defaults to the project directory name)
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Analyzer configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Number of worker threads (0 = one per CPU)
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Drop the first (request) parameter from handler parameter names
    #[arg(long = "strip-request")]
    pub strip_request: bool,

    /// Name entry points after their function even when the route declares a name
    #[arg(long = "prefer-function-name")]
    pub prefer_function_name: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Level filter to force on the logger, given `-v` and the `RUST_LOG` value.
///
/// `-v` always means debug. Otherwise a non-empty `RUST_LOG` is left in
/// charge and nothing is forced; without it the level is info.
pub fn log_level(verbose: bool, rust_log: Option<&str>) -> Option<log::LevelFilter> {
    if verbose {
        return Some(log::LevelFilter::Debug);
    }
    match rust_log {
        Some(filter) if !filter.trim().is_empty() => None,
        _ => Some(log::LevelFilter::Info),
    }
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.project_path.exists() {
        anyhow::bail!(
            "Project path does not exist: {}",
            args.project_path.display()
        );
    }

    if let Some(ref config) = args.config_path {
        if !config.is_file() {
            anyhow::bail!("Configuration file does not exist: {}", config.display());
        }
    }

    info!("Project path: {}", args.project_path.display());
    info!("Output format: {:?}", args.output_format);
    if let Some(ref output) = args.output_path {
        info!("Output file: {}", output.display());
    } else {
        info!("Output: stdout");
    }

    Ok(args)
}

/// Builds the analyzer configuration: the config file (or defaults), then
/// command-line overrides.
pub fn load_config(args: &CliArgs) -> Result<AnalyzerConfig> {
    let mut config = match &args.config_path {
        Some(path) => AnalyzerConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };

    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if args.strip_request {
        config.strip_request_parameter = true;
    }
    if args.prefer_function_name {
        config.prefer_declared_name = false;
    }

    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
    use crate::system_builder::SystemBuilder;

    let config = load_config(&args)?;

    info!("Analyzing {}...", args.project_path.display());
    let builder = SystemBuilder::new(config);
    let system = builder
        .build(&args.project_path, args.name.as_deref())
        .with_context(|| format!("Failed to analyze {}", args.project_path.display()))?;

    info!("Serializing to {:?} format...", args.output_format);
    let content = match args.output_format {
        OutputFormat::Yaml => serialize_yaml(&system)?,
        OutputFormat::Json => serialize_json(&system)?,
    };

    if let Some(output_path) = &args.output_path {
        info!("Writing output to: {}", output_path.display());
        write_to_file(&content, output_path)?;
        info!("Successfully wrote API surface to {}", output_path.display());
    } else {
        println!("{}", content);
    }

    info!("Analysis complete!");
    info!("Summary:");
    info!("  - System: {}", system.name);
    info!("  - Interfaces: {}", system.interfaces.len());
    info!("  - Entry points: {}", system.entry_point_count());
    info!("  - Exit points: {}", system.exit_point_count());

    Ok(())
}
