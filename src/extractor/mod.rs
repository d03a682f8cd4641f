//! Interface extraction: entry points from route tables, exit points from
//! outbound HTTP calls.
//!
//! Each extractor knows one convention and turns a parsed file into records.
//! Records are only created for things that could be fully recognized;
//! everything else is logged and dropped, never filled in with placeholders.
//!
//! # Supported Conventions
//!
//! - **Django URL confs**: See [`django::DjangoExtractor`]
//! - **`requests`-style HTTP clients**: See [`requests::RequestsExtractor`]
//!
//! # Example
//!
//! ```no_run
//! use pysurface::config::AnalyzerConfig;
//! use pysurface::extractor::{ExitPointExtractor, requests::RequestsExtractor};
//! use pysurface::parser::AstParser;
//! use std::path::Path;
//!
//! let tree = AstParser::parse_file(Path::new("billing/sync.py")).unwrap();
//! let config = AnalyzerConfig::default();
//! let exits = RequestsExtractor::new(&config).extract_exit_points(&tree);
//! println!("Found {} outbound calls", exits.len());
//! ```

pub mod django;
pub mod requests;

pub use crate::parser::ast::Literal;

use crate::parser::SourceTree;
use crate::shape::Shape;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Extracts entry points from a parsed file.
pub trait EntryPointExtractor {
    /// Returns the entry points declared by `tree`, in declaration order.
    ///
    /// Routes whose handler cannot be resolved are omitted.
    fn extract_entry_points(&self, tree: &Arc<SourceTree>) -> Vec<EntryPoint>;
}

/// Extracts outbound calls from a parsed file.
pub trait ExitPointExtractor {
    /// Returns the outbound calls issued by `tree`, in source order.
    fn extract_exit_points(&self, tree: &SourceTree) -> Vec<ExitPoint>;
}

/// Symbolic reference to a route handler, as written in the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerRef {
    /// `index`
    Name(String),
    /// `views.index`, flattened
    Attribute(String),
    /// `views.Index.as_view()`, `include("app.urls")`; rendered callee
    Call(String),
    /// Anything else (lambdas, subscripts, ...), by node kind
    Other(String),
}

impl HandlerRef {
    /// Text used when reporting the reference.
    pub fn display(&self) -> &str {
        match self {
            HandlerRef::Name(s)
            | HandlerRef::Attribute(s)
            | HandlerRef::Call(s)
            | HandlerRef::Other(s) => s,
        }
    }
}

/// One entry of a route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    pub url_path: String,
    pub declared_name: Option<String>,
    pub handler_ref: HandlerRef,
    /// Line of the registration call
    pub line: usize,
}

/// A decorator applied to a handler.
///
/// Call-style decorators map each keyword argument to the literal elements
/// of its value; bare decorators have no arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecoratorInfo {
    pub name: String,
    pub arguments: BTreeMap<String, Vec<Literal>>,
}

/// A handler reachable through a routed URL path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryPoint {
    pub display_name: String,
    /// The route's `name=` keyword, if it had a literal one
    pub declared_name: Option<String>,
    pub resolved_function_name: String,
    pub source_file: PathBuf,
    pub declaration_line: usize,
    pub url_path: String,
    pub parameter_names: Vec<String>,
    pub decorators: Vec<DecoratorInfo>,
    pub payload_shape: Option<Shape>,
    pub response_shape: Option<Shape>,
}

/// An outbound HTTP call issued by the project's own code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitPoint {
    pub http_verb: String,
    pub enclosing_function_name: String,
    pub source_file: PathBuf,
    pub declaration_line: usize,
    pub url: String,
    pub payload_shape: Option<Shape>,
    pub response_shape: Option<Shape>,
}
