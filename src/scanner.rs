use crate::config::AnalyzerConfig;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File scanner for listing the services of a project and their files.
///
/// The `FileScanner` decides which directories count as services and which
/// Python files belong to each. It skips directories matching the configured
/// ignore rules (hidden directories, virtualenvs, `__pycache__`, ...).
///
/// # Example
///
/// ```no_run
/// use pysurface::config::AnalyzerConfig;
/// use pysurface::scanner::FileScanner;
/// use std::path::Path;
///
/// let config = AnalyzerConfig::default();
/// let scanner = FileScanner::new(&config);
/// for service in scanner.list_services(Path::new("./platform")).unwrap() {
///     println!("{}: {} files", service.dir.display(), service.files.len());
/// }
/// ```
pub struct FileScanner<'a> {
    config: &'a AnalyzerConfig,
}

/// One service directory and the Python files to analyze in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceListing {
    /// Absolute service directory
    pub dir: PathBuf,
    /// Absolute `.py` files, sorted by path
    pub files: Vec<PathBuf>,
    /// Warning messages for entries that could not be accessed
    pub warnings: Vec<String>,
}

impl<'a> FileScanner<'a> {
    pub fn new(config: &'a AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Lists the services under `root`, sorted by directory name.
    ///
    /// Each direct subdirectory of `root` that is not ignored is a service.
    /// The root itself is the only service when it has no such
    /// subdirectories, or when it holds a `manage.py` (a single Django
    /// project whose apps are subdirectories).
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be read.
    pub fn list_services(&self, root: &Path) -> Result<Vec<ServiceListing>> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("Failed to resolve project root {}", root.display()))?;

        if root.is_file() {
            return Ok(vec![ServiceListing {
                dir: root.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone()),
                files: vec![root],
                warnings: Vec::new(),
            }]);
        }

        let mut service_dirs = Vec::new();
        if !root.join("manage.py").is_file() {
            let entries = fs::read_dir(&root)
                .with_context(|| format!("Failed to read project root {}", root.display()))?;
            for entry in entries {
                let entry = entry
                    .with_context(|| format!("Failed to read entry of {}", root.display()))?;
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.path().is_dir() && !self.config.is_ignored_dir(&name) {
                    service_dirs.push(entry.path());
                }
            }
        }
        service_dirs.sort();

        if service_dirs.is_empty() {
            debug!("Treating {} as a single service", root.display());
            service_dirs.push(root);
        }

        service_dirs
            .into_iter()
            .map(|dir| self.list_service(dir))
            .collect()
    }

    /// Lists the Python files of one service directory.
    pub fn list_service(&self, dir: PathBuf) -> Result<ServiceListing> {
        let mut files = Vec::new();
        let mut warnings = Vec::new();

        for entry in WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                // Don't filter the service directory itself
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                !self.config.is_ignored_dir(&e.file_name().to_string_lossy())
            })
        {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && path.extension().and_then(|s| s.to_str()) == Some("py")
                    {
                        files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
        files.sort();

        debug!("Service {}: {} Python files", dir.display(), files.len());
        Ok(ServiceListing {
            dir,
            files,
            warnings,
        })
    }
}
