//! Import resolver - maps a name used in one file to the file that declares it.
//!
//! Resolution is purely syntactic: the import statements at the top level of a
//! file are turned into [`ImportRecord`]s, a dotted name is matched against
//! them (longest prefix first), and the declaring module is located on disk
//! and parsed through the shared [`ParseCache`]. Nothing is executed.

use crate::error::{ResolveFailure, Unresolved};
use crate::parser::ast::Stmt;
use crate::parser::{ParseCache, SourceTree};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Longest chain of re-exports followed before giving up.
const MAX_CHAIN_DEPTH: usize = 32;

/// One imported symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// `from <module> import ...` module, leading dots kept; `None` for
    /// plain `import` statements
    pub declaring_module: Option<String>,
    /// Name as imported (`*` for wildcard imports)
    pub imported_name: String,
    pub local_alias: Option<String>,
}

impl ImportRecord {
    /// Name under which the import is visible in the importing file.
    pub fn key(&self) -> &str {
        self.local_alias.as_deref().unwrap_or(&self.imported_name)
    }

    /// Number of leading dots of a relative import.
    pub fn level(&self) -> usize {
        self.declaring_module
            .as_deref()
            .map(|m| m.chars().take_while(|c| *c == '.').count())
            .unwrap_or(0)
    }

    fn is_wildcard(&self) -> bool {
        self.imported_name == "*"
    }
}

/// Collects the import records of a file's top-level import statements.
pub fn imports_of(tree: &SourceTree) -> Vec<ImportRecord> {
    let mut records = Vec::new();
    for stmt in &tree.body {
        match stmt {
            Stmt::Import { names, .. } => {
                records.extend(names.iter().map(|n| ImportRecord {
                    declaring_module: None,
                    imported_name: n.name.clone(),
                    local_alias: n.alias.clone(),
                }));
            }
            Stmt::ImportFrom {
                module,
                names,
                wildcard,
                ..
            } => {
                records.extend(names.iter().map(|n| ImportRecord {
                    declaring_module: Some(module.clone()),
                    imported_name: n.name.clone(),
                    local_alias: n.alias.clone(),
                }));
                if *wildcard {
                    records.push(ImportRecord {
                        declaring_module: Some(module.clone()),
                        imported_name: "*".to_string(),
                        local_alias: None,
                    });
                }
            }
            _ => {}
        }
    }
    records
}

/// Files currently being resolved through, innermost last.
///
/// Resolution that lands in a file already on the chain is circular and is
/// cut off instead of followed.
#[derive(Debug, Clone, Default)]
pub struct ResolutionChain {
    files: Vec<PathBuf>,
}

impl ResolutionChain {
    pub fn starting_at(path: &Path) -> Self {
        Self {
            files: vec![path.to_path_buf()],
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f == path)
    }

    fn enter(&mut self, name: &str, path: &Path) -> Result<(), Unresolved> {
        if self.contains(path) {
            debug!("Circular resolution of `{}` through {}", name, path.display());
            return Err(Unresolved::new(name, ResolveFailure::Circular));
        }
        if self.files.len() >= MAX_CHAIN_DEPTH {
            debug!("Giving up on `{}` after {} files", name, self.files.len());
            return Err(Unresolved::new(name, ResolveFailure::TooDeep));
        }
        self.files.push(path.to_path_buf());
        Ok(())
    }
}

/// The outcome of resolving a name through the imports of one file.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Import that bound the name
    pub record: ImportRecord,
    /// Parsed declaring file
    pub tree: Arc<SourceTree>,
    /// Remaining dotted segments to look up inside `tree`; empty when the
    /// name denotes the module itself
    pub member: Vec<String>,
}

/// A function declaration found by following a reference.
#[derive(Debug, Clone)]
pub struct ResolvedFunction {
    pub tree: Arc<SourceTree>,
    pub name: String,
}

/// Resolves names across files using a shared parse cache.
pub struct ImportResolver<'a> {
    cache: &'a ParseCache,
    /// Directories absolute imports are looked up under, in order
    search_roots: Vec<PathBuf>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(cache: &'a ParseCache, search_roots: Vec<PathBuf>) -> Self {
        Self {
            cache,
            search_roots,
        }
    }

    /// Resolves `name` as seen from `tree`.
    ///
    /// The name is matched against the file's imports by alias, else by
    /// imported name; when nothing matches, the last dotted segment is
    /// stripped and the lookup retried until no segment remains.
    pub fn resolve(
        &self,
        name: &str,
        tree: &SourceTree,
        chain: &mut ResolutionChain,
    ) -> Result<Resolution, Unresolved> {
        let records = imports_of(tree);
        let segments: Vec<&str> = name.split('.').collect();

        for len in (1..=segments.len()).rev() {
            let prefix = segments[..len].join(".");
            // A later import shadows an earlier one.
            if let Some(record) = records
                .iter()
                .rev()
                .find(|r| !r.is_wildcard() && r.key() == prefix)
            {
                debug!("`{}` bound by import of `{}`", prefix, record.imported_name);
                let rest: Vec<String> = segments[len..].iter().map(|s| s.to_string()).collect();
                return self.locate(name, record, tree, rest, chain);
            }
        }

        for record in records.iter().filter(|r| r.is_wildcard()) {
            let rest: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
            let mut attempt = chain.clone();
            if let Ok(resolution) = self.locate(name, record, tree, rest, &mut attempt) {
                if defines(&resolution.tree, segments[0]) {
                    *chain = attempt;
                    return Ok(resolution);
                }
            }
        }

        Err(Unresolved::new(name, ResolveFailure::NotImported))
    }

    /// Follows `name` to a function definition, through local definitions,
    /// imports and re-exports.
    pub fn resolve_function(
        &self,
        name: &str,
        tree: &Arc<SourceTree>,
        chain: &mut ResolutionChain,
    ) -> Result<ResolvedFunction, Unresolved> {
        if !name.contains('.') && tree.find_function(name).is_some() {
            return Ok(ResolvedFunction {
                tree: Arc::clone(tree),
                name: name.to_string(),
            });
        }

        let resolution = self.resolve(name, tree, chain)?;
        match resolution.member.as_slice() {
            [symbol] => {
                if resolution.tree.find_function(symbol).is_some() {
                    return Ok(ResolvedFunction {
                        tree: Arc::clone(&resolution.tree),
                        name: symbol.clone(),
                    });
                }
                if imports_of(&resolution.tree)
                    .iter()
                    .any(|r| r.key() == symbol.as_str() || r.is_wildcard())
                {
                    debug!(
                        "`{}` is re-exported by {}",
                        symbol,
                        resolution.tree.path.display()
                    );
                    return self.resolve_function(symbol, &resolution.tree, chain);
                }
                Err(Unresolved::new(name, ResolveFailure::NotAFunction))
            }
            _ => Err(Unresolved::new(name, ResolveFailure::NotAFunction)),
        }
    }

    fn locate(
        &self,
        name: &str,
        record: &ImportRecord,
        from: &SourceTree,
        rest: Vec<String>,
        chain: &mut ResolutionChain,
    ) -> Result<Resolution, Unresolved> {
        let level = record.level();

        let (path, member) = match record.declaring_module.as_deref() {
            Some(module) => {
                let dotted = module.trim_start_matches('.');
                let as_submodule = if record.is_wildcard() {
                    None
                } else if dotted.is_empty() {
                    self.module_file(from, level, &record.imported_name)
                } else {
                    self.module_file(from, level, &format!("{}.{}", dotted, record.imported_name))
                };
                match as_submodule {
                    Some(path) => (path, rest),
                    None => {
                        let path = self
                            .module_file(from, level, dotted)
                            .ok_or_else(|| Unresolved::new(name, ResolveFailure::ModuleNotFound))?;
                        let mut member = Vec::with_capacity(rest.len() + 1);
                        if !record.is_wildcard() {
                            member.push(record.imported_name.clone());
                        }
                        member.extend(rest);
                        (path, member)
                    }
                }
            }
            None => {
                let path = self
                    .module_file(from, 0, &record.imported_name)
                    .ok_or_else(|| Unresolved::new(name, ResolveFailure::ModuleNotFound))?;
                (path, rest)
            }
        };

        let tree = self.open(name, &path, chain)?;
        let (tree, member) = self.descend(name, tree, member, chain)?;

        Ok(Resolution {
            record: record.clone(),
            tree,
            member,
        })
    }

    /// Walks into sub-modules of a package while the remaining segments name
    /// files rather than symbols.
    fn descend(
        &self,
        name: &str,
        mut tree: Arc<SourceTree>,
        mut member: Vec<String>,
        chain: &mut ResolutionChain,
    ) -> Result<(Arc<SourceTree>, Vec<String>), Unresolved> {
        while member.len() > 1 && is_package_init(&tree.path) {
            let package = tree.dir().to_path_buf();
            match module_candidates(&package, &member[0]).into_iter().find(|p| p.is_file()) {
                Some(path) => {
                    tree = self.open(name, &path, chain)?;
                    member.remove(0);
                }
                None => break,
            }
        }
        Ok((tree, member))
    }

    fn open(
        &self,
        name: &str,
        path: &Path,
        chain: &mut ResolutionChain,
    ) -> Result<Arc<SourceTree>, Unresolved> {
        let tree = self.cache.get_or_parse(path).map_err(|e| {
            debug!("Cannot follow `{}`: {}", name, e);
            Unresolved::new(name, ResolveFailure::NotParsed)
        })?;
        chain.enter(name, &tree.path)?;
        Ok(tree)
    }

    /// Locates the file of a dotted module, relative to the importing file
    /// for relative imports or to the search roots otherwise.
    fn module_file(&self, from: &SourceTree, level: usize, dotted: &str) -> Option<PathBuf> {
        let roots: Vec<PathBuf> = if level > 0 {
            let mut base = from.dir().to_path_buf();
            for _ in 1..level {
                base = base.parent()?.to_path_buf();
            }
            vec![base]
        } else {
            self.search_roots.clone()
        };

        roots
            .iter()
            .flat_map(|root| module_candidates(root, dotted))
            .find(|p| p.is_file())
    }
}

/// `a.b` under `root` is `root/a/b.py` or `root/a/b/__init__.py`; the empty
/// module is the package at `root` itself.
pub(crate) fn module_candidates(root: &Path, dotted: &str) -> Vec<PathBuf> {
    if dotted.is_empty() {
        return vec![root.join("__init__.py")];
    }
    let relative: PathBuf = dotted.split('.').collect();
    vec![
        root.join(&relative).with_extension("py"),
        root.join(&relative).join("__init__.py"),
    ]
}

fn is_package_init(path: &Path) -> bool {
    path.file_name().map(|n| n == "__init__.py").unwrap_or(false)
}

/// True if `tree` binds `name` at top level.
fn defines(tree: &SourceTree, name: &str) -> bool {
    tree.find_function(name).is_some()
        || tree.find_class(name).is_some()
        || imports_of(tree).iter().any(|r| r.key() == name)
}
