//! Source model: parses Python files into an owned syntax tree.
//!
//! The `AstParser` uses tree-sitter to build a concrete syntax tree, which is
//! lowered once into the [`ast`] types and then shared, immutably, by every
//! analysis. A [`ParseCache`] keeps each file parsed at most once per run.

pub mod ast;
mod lower;

use crate::error::ParseError;
use ast::{ClassDef, FunctionDef, Stmt};
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tree_sitter::{Language, Parser};

/// Python source parser.
///
/// # Example
///
/// ```no_run
/// use pysurface::parser::AstParser;
/// use std::path::Path;
///
/// let tree = AstParser::parse_file(Path::new("app/urls.py")).unwrap();
/// println!("Parsed {} statements", tree.body.len());
/// ```
pub struct AstParser;

/// A successfully parsed Python file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTree {
    /// Path to the source file
    pub path: PathBuf,
    /// Top-level statements in source order
    pub body: Vec<Stmt>,
}

impl SourceTree {
    /// Directory containing the file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Top-level function definition by name. The last definition wins, as
    /// it would at import time.
    pub fn find_function(&self, name: &str) -> Option<&FunctionDef> {
        self.body.iter().rev().find_map(|stmt| match stmt {
            Stmt::FunctionDef(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    /// Top-level class definition by name.
    pub fn find_class(&self, name: &str) -> Option<&ClassDef> {
        self.body.iter().rev().find_map(|stmt| match stmt {
            Stmt::ClassDef(c) if c.name == name => Some(c),
            _ => None,
        })
    }
}

impl AstParser {
    /// Parses a single Python source file.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the file cannot be read or contains a
    /// syntax error.
    pub fn parse_file(path: &Path) -> Result<SourceTree, ParseError> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| ParseError {
            file: path.to_path_buf(),
            reason: format!("failed to read file: {}", e),
        })?;

        Self::parse_source(path, &content)
    }

    /// Parses already-loaded source text attributed to `path`.
    pub fn parse_source(path: &Path, content: &str) -> Result<SourceTree, ParseError> {
        let parse_error = |reason: String| ParseError {
            file: path.to_path_buf(),
            reason,
        };

        let language: Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| parse_error(format!("failed to load Python grammar: {}", e)))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| parse_error("parser returned no tree".to_string()))?;

        let root = tree.root_node();
        if let Some(line) = lower::first_error_line(root) {
            return Err(parse_error(format!("syntax error at line {}", line)));
        }

        let body = lower::Lowerer::new(content.as_bytes()).lower_block(root);
        debug!(
            "Successfully parsed file: {} ({} statements)",
            path.display(),
            body.len()
        );

        Ok(SourceTree {
            path: path.to_path_buf(),
            body,
        })
    }
}

type CachedParse = Result<Arc<SourceTree>, ParseError>;

/// Per-run cache of parsed files keyed by absolute path.
///
/// Both successes and failures are cached, so a file is read at most once
/// per run no matter how many services or resolution chains reach it.
#[derive(Default)]
pub struct ParseCache {
    entries: RwLock<HashMap<PathBuf, CachedParse>>,
}

impl ParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the parsed tree for `path`, parsing it on first use.
    pub fn get_or_parse(&self, path: &Path) -> CachedParse {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = entries.get(&key) {
                return cached.clone();
            }
        }

        let parsed = AstParser::parse_file(&key).map(Arc::new);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(key).or_insert(parsed).clone()
    }

    /// Number of files parsed (or attempted) so far.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
