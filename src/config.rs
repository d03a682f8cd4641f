//! Analyzer configuration.
//!
//! Every identifier the engine pattern-matches on (the route table name, the
//! path registration functions, the HTTP client module, ...) lives here so
//! that projects with non-default conventions can be analyzed by supplying a
//! YAML file instead of code changes.

use crate::error::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Name of the module-level route table assignment
    pub route_table_name: String,
    /// Callees that register a route inside the table
    pub path_functions: Vec<String>,
    /// Module whose import marks a file as issuing outbound HTTP calls
    pub http_client_module: String,
    /// Client methods recognized as outbound calls
    pub http_verbs: Vec<String>,
    /// Keyword arguments carrying the request payload, tried in order
    pub payload_keywords: Vec<String>,
    /// Keyword argument carrying the URL when there is no positional one
    pub url_keyword: String,
    /// Directory-name prefixes that never count as services or source dirs
    pub ignore_prefixes: Vec<String>,
    /// Directory names skipped while listing a service's files
    pub ignore_dirs: Vec<String>,
    /// Use a route's `name=` as the entry point display name when present
    pub prefer_declared_name: bool,
    /// Drop the first (request) parameter from `parameter_names`
    pub strip_request_parameter: bool,
    /// Upper bound on name-to-assignment hops during inference
    pub max_binding_hops: usize,
    /// Worker threads; 0 lets rayon decide
    pub jobs: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            route_table_name: "urlpatterns".to_string(),
            path_functions: strings(&["path", "re_path", "url"]),
            http_client_module: "requests".to_string(),
            http_verbs: strings(&["get", "post", "put", "patch", "delete", "head", "options"]),
            payload_keywords: strings(&["data", "json"]),
            url_keyword: "url".to_string(),
            ignore_prefixes: strings(&[".", "_"]),
            ignore_dirs: strings(&["venv", "env", "node_modules", "migrations", "__pycache__"]),
            prefer_declared_name: true,
            strip_request_parameter: false,
            max_binding_hops: 4,
            jobs: 0,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl AnalyzerConfig {
    /// Loads a configuration file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AnalyzerConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.route_table_name.trim().is_empty() {
            return Err(Error::Config("route_table_name must not be empty".into()));
        }
        if self.http_client_module.trim().is_empty() {
            return Err(Error::Config("http_client_module must not be empty".into()));
        }
        if self.path_functions.is_empty() {
            return Err(Error::Config("path_functions must not be empty".into()));
        }
        Ok(())
    }

    /// True if a directory name should be skipped.
    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignore_prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || self.ignore_dirs.iter().any(|d| d == name)
    }

    pub fn is_http_verb(&self, name: &str) -> bool {
        self.http_verbs.iter().any(|v| v == name)
    }

    pub fn is_path_function(&self, name: &str) -> bool {
        self.path_functions.iter().any(|p| p == name)
    }
}
