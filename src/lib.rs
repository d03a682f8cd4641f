//! pysurface - Static reconstruction of the API surface of Python services.
//!
//! This library inspects a Python code base without executing it and
//! reconstructs, for every service in the project, the set of **entry points**
//! (handlers reachable from a Django-style URL routing table) and **exit
//! points** (outbound HTTP calls made through a `requests`-style client).
//!
//! # Architecture
//!
//! The library is organized into several modules that work together:
//!
//! 1. [`scanner`] - Lists the services of a project and their Python files
//! 2. [`parser`] - Parses Python files into an owned syntax tree, cached per run
//! 3. [`import_resolver`] - Follows names through imports to their declaring file
//! 4. [`detector`] - Finds a service's root URL conf and HTTP-client imports
//! 5. [`extractor`] - Extracts entry points and exit points from parsed files
//! 6. [`shape`] - Infers payload and response shapes
//! 7. [`system_builder`] - Runs the analysis and assembles the result tree
//! 8. [`serializer`] - Serializes the result to YAML or JSON
//!
//! # Example Usage
//!
//! ```no_run
//! use pysurface::config::AnalyzerConfig;
//! use pysurface::serializer::serialize_json;
//! use pysurface::system_builder::SystemBuilder;
//! use std::path::Path;
//!
//! let config = AnalyzerConfig::default();
//! let system = SystemBuilder::new(config)
//!     .build(Path::new("./platform"), Some("platform"))
//!     .unwrap();
//!
//! for interface in &system.interfaces {
//!     println!(
//!         "{}: {} entry points, {} exit points",
//!         interface.name,
//!         interface.entry_points.len(),
//!         interface.exit_points.len()
//!     );
//! }
//!
//! println!("{}", serialize_json(&system).unwrap());
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module which provides a complete CLI application.

pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod import_resolver;
pub mod parser;
pub mod scanner;
pub mod serializer;
pub mod shape;
pub mod system_builder;

pub use system_builder::{build_system, Interface, System, SystemBuilder};
