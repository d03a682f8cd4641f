use crate::config::AnalyzerConfig;
use crate::import_resolver::{imports_of, module_candidates};
use crate::parser::ast::{walk_exprs, walk_functions, Expr, Literal, Stmt};
use crate::parser::{ParseCache, SourceTree};
use log::debug;
use std::path::{Path, PathBuf};

const SETTINGS_VARIABLE: &str = "DJANGO_SETTINGS_MODULE";
const ROOT_URLCONF: &str = "ROOT_URLCONF";

/// Project detector for Django services and HTTP-client usage.
///
/// The `ProjectDetector` follows the chain a Django process itself follows at
/// start-up: `manage.py` names the settings module through
/// `os.environ.setdefault("DJANGO_SETTINGS_MODULE", ...)`, and the settings
/// module names the root URL conf through `ROOT_URLCONF`. Every step is
/// optional; a broken link simply ends detection.
pub struct ProjectDetector;

/// Result of project detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
    /// Dotted settings module named by `manage.py`
    pub settings_module: Option<String>,
    /// File of the root URL conf named by the settings module
    pub root_urlconf: Option<PathBuf>,
}

impl ProjectDetector {
    /// Detects the Django settings and root URL conf of a service.
    ///
    /// # Arguments
    ///
    /// * `service_dir` - Directory containing the service's `manage.py`
    /// * `cache` - Parse cache shared with the rest of the run
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pysurface::detector::ProjectDetector;
    /// use pysurface::parser::ParseCache;
    /// use std::path::Path;
    ///
    /// let cache = ParseCache::new();
    /// let result = ProjectDetector::detect(Path::new("services/shop"), &cache);
    /// println!("Root URL conf: {:?}", result.root_urlconf);
    /// ```
    pub fn detect(service_dir: &Path, cache: &ParseCache) -> DetectionResult {
        let mut result = DetectionResult::default();

        let manage = service_dir.join("manage.py");
        if !manage.is_file() {
            return result;
        }
        let Ok(manage_tree) = cache.get_or_parse(&manage) else {
            return result;
        };

        result.settings_module = settings_module(&manage_tree);
        let Some(settings) = result.settings_module.as_deref() else {
            return result;
        };
        debug!("Settings module of {}: {}", service_dir.display(), settings);

        let Some(settings_tree) = find_module(service_dir, settings)
            .and_then(|path| cache.get_or_parse(&path).ok())
        else {
            return result;
        };

        result.root_urlconf = root_urlconf(&settings_tree)
            .and_then(|module| find_module(service_dir, &module))
            .map(|path| std::fs::canonicalize(&path).unwrap_or(path));
        debug!("Root URL conf of {}: {:?}", service_dir.display(), result.root_urlconf);

        result
    }

    /// Local names under which `tree` can reach the configured HTTP client
    /// module. Empty when the module is not imported.
    pub fn client_aliases(tree: &SourceTree, config: &AnalyzerConfig) -> Vec<String> {
        let module = config.http_client_module.as_str();
        let mut aliases: Vec<String> = imports_of(tree)
            .iter()
            .filter_map(|record| match record.declaring_module.as_deref() {
                // `import requests`, `import requests as r`, `import requests.adapters`
                None => {
                    let first = record.imported_name.split('.').next()?;
                    if first != module {
                        return None;
                    }
                    Some(match &record.local_alias {
                        Some(alias) => alias.clone(),
                        None => first.to_string(),
                    })
                }
                // `from requests import Session`
                Some(declaring) if declaring == module && record.imported_name != "*" => {
                    Some(record.key().to_string())
                }
                Some(_) => None,
            })
            .collect();
        aliases.dedup();
        aliases
    }
}

/// The settings module named by `os.environ.setdefault(...)`, anywhere in the
/// file including `main()`.
fn settings_module(tree: &SourceTree) -> Option<String> {
    let mut found = None;
    let mut check = |expr: &Expr| {
        if found.is_some() {
            return;
        }
        let Expr::Call { func, args, .. } = expr else {
            return;
        };
        let is_setdefault = func
            .dotted_name()
            .map(|name| name.ends_with("environ.setdefault"))
            .unwrap_or(false);
        if !is_setdefault {
            return;
        }
        let key = args.first().and_then(|a| a.literal()).and_then(Literal::as_str);
        let value = args.get(1).and_then(|a| a.literal()).and_then(Literal::as_str);
        if let (Some(SETTINGS_VARIABLE), Some(value)) = (key, value) {
            found = Some(value.to_string());
        }
    };

    walk_exprs(&tree.body, &mut check);
    walk_functions(&tree.body, &mut |function| {
        walk_exprs(&function.body, &mut check);
    });
    found
}

fn root_urlconf(settings: &SourceTree) -> Option<String> {
    settings.body.iter().rev().find_map(|stmt| match stmt {
        Stmt::Assign { targets, value, .. }
            if targets
                .iter()
                .any(|t| matches!(t, Expr::Name { id, .. } if id == ROOT_URLCONF)) =>
        {
            value.literal().and_then(Literal::as_str).map(str::to_string)
        }
        _ => None,
    })
}

fn find_module(root: &Path, dotted: &str) -> Option<PathBuf> {
    module_candidates(root, dotted)
        .into_iter()
        .find(|p| p.is_file())
}
