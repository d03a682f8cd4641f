//! Aggregation of per-file facts into the System → Interface tree.
//!
//! The builder lists the services of a project, then analyzes every file of
//! every service on a bounded rayon pool. Parsed files are shared through one
//! [`ParseCache`] that lives exactly as long as a single build. Results are
//! collected in input order, so the output does not depend on scheduling.

use crate::config::AnalyzerConfig;
use crate::detector::ProjectDetector;
use crate::error::{Error, Result};
use crate::extractor::django::DjangoExtractor;
use crate::extractor::requests::RequestsExtractor;
use crate::extractor::{EntryPoint, EntryPointExtractor, ExitPoint, ExitPointExtractor};
use crate::import_resolver::ImportResolver;
use crate::parser::ParseCache;
use crate::scanner::{FileScanner, ServiceListing};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Stack for analysis workers; tree walks recurse once per nesting level.
const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// The root result: every service of one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct System {
    pub name: String,
    pub interfaces: Vec<Interface>,
}

/// The API surface of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interface {
    pub name: String,
    pub entry_points: Vec<EntryPoint>,
    pub exit_points: Vec<ExitPoint>,
}

impl System {
    pub fn entry_point_count(&self) -> usize {
        self.interfaces.iter().map(|i| i.entry_points.len()).sum()
    }

    pub fn exit_point_count(&self) -> usize {
        self.interfaces.iter().map(|i| i.exit_points.len()).sum()
    }
}

/// Builds a [`System`] with the default configuration.
///
/// # Errors
///
/// Returns [`Error::RootUnreadable`] if `project_root` does not exist or
/// cannot be read. Nothing below the root aborts the build.
pub fn build_system(project_root: &Path, name: Option<&str>) -> Result<System> {
    SystemBuilder::new(AnalyzerConfig::default()).build(project_root, name)
}

/// Analyzes projects with a fixed configuration.
///
/// # Example
///
/// ```no_run
/// use pysurface::config::AnalyzerConfig;
/// use pysurface::system_builder::SystemBuilder;
/// use std::path::Path;
///
/// let builder = SystemBuilder::new(AnalyzerConfig::default());
/// let system = builder.build(Path::new("./platform"), None).unwrap();
/// for interface in &system.interfaces {
///     println!("{}: {} entry points", interface.name, interface.entry_points.len());
/// }
/// ```
pub struct SystemBuilder {
    config: AnalyzerConfig,
}

impl SystemBuilder {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Lists the services under `project_root` and analyzes them.
    ///
    /// # Arguments
    ///
    /// * `project_root` - Project directory, or a single Python file
    /// * `name` - System name; defaults to the root's leaf name
    ///
    /// # Errors
    ///
    /// Returns [`Error::RootUnreadable`] if the root is missing or cannot be
    /// listed.
    pub fn build(&self, project_root: &Path, name: Option<&str>) -> Result<System> {
        let unreadable = |reason: String| Error::RootUnreadable {
            path: project_root.to_path_buf(),
            reason,
        };

        let metadata = fs::metadata(project_root).map_err(|e| unreadable(e.to_string()))?;
        if metadata.is_dir() {
            fs::read_dir(project_root).map_err(|e| unreadable(e.to_string()))?;
        }
        let root = fs::canonicalize(project_root).map_err(|e| unreadable(e.to_string()))?;

        info!("Analyzing project: {}", root.display());
        let listings = FileScanner::new(&self.config)
            .list_services(&root)
            .map_err(|e| unreadable(format!("{:#}", e)))?;

        let name = name.map(str::to_string).unwrap_or_else(|| leaf_name(&root));
        let mut system = self.analyze_services(&root, name, &listings)?;

        // A single-file project is named after the file, not its directory.
        if root.is_file() {
            if let Some(interface) = system.interfaces.first_mut() {
                interface.name = leaf_name(&root);
            }
        }
        Ok(system)
    }

    /// Analyzes pre-listed services.
    ///
    /// One [`Interface`] is produced per listing, in listing order, even when
    /// a service has no entry or exit points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerPool`] if the thread pool cannot be created.
    pub fn analyze_services(
        &self,
        project_root: &Path,
        name: String,
        listings: &[ServiceListing],
    ) -> Result<System> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .stack_size(WORKER_STACK_SIZE)
            .thread_name(|i| format!("pysurface-{}", i))
            .build()?;
        let cache = ParseCache::new();

        let interfaces: Vec<Interface> = pool.install(|| {
            listings
                .par_iter()
                .map(|listing| self.analyze_service(project_root, listing, &cache))
                .collect()
        });

        let system = System { name, interfaces };
        info!(
            "Analyzed {} service(s), {} file(s) parsed: {} entry point(s), {} exit point(s)",
            system.interfaces.len(),
            cache.len(),
            system.entry_point_count(),
            system.exit_point_count()
        );
        Ok(system)
    }

    fn analyze_service(&self, project_root: &Path, listing: &ServiceListing, cache: &ParseCache) -> Interface {
        let name = leaf_name(&listing.dir);
        debug!("Analyzing service {} ({} files)", name, listing.files.len());

        let detection = ProjectDetector::detect(&listing.dir, cache);
        let files = order_files(&listing.files, detection.root_urlconf.as_deref());

        let resolver = ImportResolver::new(
            cache,
            vec![listing.dir.clone(), project_root.to_path_buf()],
        );
        let django = DjangoExtractor::new(&self.config, &resolver);
        let requests = RequestsExtractor::new(&self.config);

        let per_file: Vec<(Vec<EntryPoint>, Vec<ExitPoint>)> = files
            .par_iter()
            .map(|file| match cache.get_or_parse(file) {
                Ok(tree) => (
                    django.extract_entry_points(&tree),
                    requests.extract_exit_points(&tree),
                ),
                Err(e) => {
                    warn!("Skipping file: {}", e);
                    (Vec::new(), Vec::new())
                }
            })
            .collect();

        let mut interface = Interface {
            name,
            entry_points: Vec::new(),
            exit_points: Vec::new(),
        };
        for (entries, exits) in per_file {
            interface.entry_points.extend(entries);
            interface.exit_points.extend(exits);
        }
        interface
    }
}

/// Puts the root URL conf first, leaving the rest in listing order.
fn order_files(files: &[PathBuf], root_urlconf: Option<&Path>) -> Vec<PathBuf> {
    let Some(root_urlconf) = root_urlconf else {
        return files.to_vec();
    };
    let is_root = |f: &PathBuf| fs::canonicalize(f).map(|c| c == root_urlconf).unwrap_or(false);

    let mut ordered: Vec<PathBuf> = files.iter().filter(|f| is_root(f)).cloned().collect();
    ordered.extend(files.iter().filter(|f| !is_root(f)).cloned());
    ordered
}

fn leaf_name(path: &Path) -> String {
    let leaf = if path.is_file() {
        path.file_stem()
    } else {
        path.file_name()
    };
    leaf.map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
