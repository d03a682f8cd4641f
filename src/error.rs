use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that abort an analysis run or a configuration load.
///
/// Everything below the project root (unreadable or malformed files,
/// unresolvable references) is reported through [`ParseError`] and
/// [`Unresolved`] instead and never aborts a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("project root is not readable: {}: {reason}", path.display())]
    RootUnreadable { path: PathBuf, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Error::WorkerPool(err.to_string())
    }
}

/// A file that could not be read or is not syntactically valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error {}: {reason}", file.display())]
pub struct ParseError {
    pub file: PathBuf,
    pub reason: String,
}

/// A symbolic reference that could not be followed to a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved reference `{name}`: {reason}")]
pub struct Unresolved {
    pub name: String,
    pub reason: ResolveFailure,
}

impl Unresolved {
    pub fn new(name: impl Into<String>, reason: ResolveFailure) -> Self {
        Self {
            name: name.into(),
            reason,
        }
    }
}

/// Why a reference could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveFailure {
    /// No import or local definition binds the name.
    NotImported,
    /// The import names a module with no file under any search root.
    ModuleNotFound,
    /// The declaring file exists but does not define a function by that name.
    NotAFunction,
    /// Following the reference leads back into the current resolution chain.
    Circular,
    /// The re-export chain is longer than the resolver follows.
    TooDeep,
    /// The declaring file could not be parsed.
    NotParsed,
    /// The handler is a call expression and is not followed.
    CallHandler,
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            ResolveFailure::NotImported => "name is not imported or defined",
            ResolveFailure::ModuleNotFound => "module file not found",
            ResolveFailure::NotAFunction => "declaration is not a function",
            ResolveFailure::Circular => "circular import",
            ResolveFailure::TooDeep => "re-export chain too deep",
            ResolveFailure::NotParsed => "declaring file could not be parsed",
            ResolveFailure::CallHandler => "handler is a call expression",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_display() {
        let err = Unresolved::new("views.index", ResolveFailure::Circular);
        assert_eq!(
            err.to_string(),
            "unresolved reference `views.index`: circular import"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError {
            file: PathBuf::from("app/views.py"),
            reason: "syntax error at line 3".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parse error app/views.py: syntax error at line 3"
        );
    }
}
