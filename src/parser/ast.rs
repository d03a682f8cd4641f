//! Owned, language-agnostic syntax tree for one Python source file.
//!
//! The tree-sitter concrete syntax tree is lowered once into these types (see
//! [`super::lower`]) so that analyses can pattern-match on statements and
//! expressions without carrying tree-sitter lifetimes around, and so that a
//! parsed file can be shared between worker threads.

use serde::Serialize;

/// A literal constant appearing in source.
///
/// Serializes untagged, so `Literal::Str("a")` becomes `"a"` and
/// `Literal::None` becomes `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl Literal {
    /// Returns the string value if this is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the literal the way it would be used as a dictionary key.
    pub fn to_key(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Bool(true) => "True".to_string(),
            Literal::Bool(false) => "False".to_string(),
            Literal::None => "None".to_string(),
        }
    }
}

/// Kind of a sequence display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqKind {
    List,
    Tuple,
    Set,
}

/// A keyword argument in a call. `arg` is `None` for `**mapping` splats.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub arg: Option<String>,
    pub value: Expr,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name {
        id: String,
        line: usize,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
        line: usize,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
        line: usize,
    },
    Literal {
        value: Literal,
        line: usize,
    },
    /// An f-string. `fragments` holds the literal text with every
    /// interpolation removed.
    FormattedStr {
        fragments: String,
        line: usize,
    },
    /// Dictionary display. A `None` key marks a `**mapping` entry.
    Dict {
        entries: Vec<(Option<Expr>, Expr)>,
        line: usize,
    },
    Seq {
        kind: SeqKind,
        elts: Vec<Expr>,
        line: usize,
    },
    BinOp {
        left: Box<Expr>,
        op: String,
        right: Box<Expr>,
        line: usize,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
        line: usize,
    },
    /// Any expression the analyses do not inspect structurally.
    Other {
        kind: String,
        children: Vec<Expr>,
        line: usize,
    },
}

impl Expr {
    /// Kind tag of the node.
    pub fn kind(&self) -> &str {
        match self {
            Expr::Name { .. } => "name",
            Expr::Attribute { .. } => "attribute",
            Expr::Call { .. } => "call",
            Expr::Literal { .. } => "literal",
            Expr::FormattedStr { .. } => "formatted_string",
            Expr::Dict { .. } => "dict",
            Expr::Seq { kind: SeqKind::List, .. } => "list",
            Expr::Seq { kind: SeqKind::Tuple, .. } => "tuple",
            Expr::Seq { kind: SeqKind::Set, .. } => "set",
            Expr::BinOp { .. } => "binary_operator",
            Expr::Subscript { .. } => "subscript",
            Expr::Other { kind, .. } => kind.as_str(),
        }
    }

    /// 1-indexed source line where the expression starts.
    pub fn line(&self) -> usize {
        match self {
            Expr::Name { line, .. }
            | Expr::Attribute { line, .. }
            | Expr::Call { line, .. }
            | Expr::Literal { line, .. }
            | Expr::FormattedStr { line, .. }
            | Expr::Dict { line, .. }
            | Expr::Seq { line, .. }
            | Expr::BinOp { line, .. }
            | Expr::Subscript { line, .. }
            | Expr::Other { line, .. } => *line,
        }
    }

    /// Direct child expressions, in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Name { .. } | Expr::Literal { .. } | Expr::FormattedStr { .. } => Vec::new(),
            Expr::Attribute { value, .. } => vec![value.as_ref()],
            Expr::Call {
                func,
                args,
                keywords,
                ..
            } => {
                let mut out = vec![func.as_ref()];
                out.extend(args.iter());
                out.extend(keywords.iter().map(|k| &k.value));
                out
            }
            Expr::Dict { entries, .. } => entries
                .iter()
                .flat_map(|(k, v)| k.iter().chain(std::iter::once(v)))
                .collect(),
            Expr::Seq { elts, .. } => elts.iter().collect(),
            Expr::BinOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Subscript { value, index, .. } => vec![value.as_ref(), index.as_ref()],
            Expr::Other { children, .. } => children.iter().collect(),
        }
    }

    /// Literal value, if this node is a literal.
    pub fn literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Flattens a name or attribute chain into a dotted name.
    ///
    /// Returns `None` when any link of the chain is not a plain reference
    /// (for example `factory().view`).
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Expr::Name { id, .. } => Some(id.clone()),
            Expr::Attribute { value, attr, .. } => {
                let base = value.dotted_name()?;
                Some(format!("{}.{}", base, attr))
            }
            _ => None,
        }
    }

    /// Visits this expression and every descendant in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(&mut *visit);
        }
    }
}

/// One name bound by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportName {
    /// Imported name as written (`a.b` for `import a.b`).
    pub name: String,
    pub alias: Option<String>,
}

/// How a parameter binds its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub line: usize,
    pub params: Vec<Param>,
    pub decorators: Vec<Expr>,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    /// Positional parameter names in declaration order.
    pub fn positional_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.kind == ParamKind::Positional)
            .map(|p| p.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub line: usize,
    pub bases: Vec<Expr>,
    pub decorators: Vec<Expr>,
    pub body: Vec<Stmt>,
}

/// Statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Import {
        names: Vec<ImportName>,
        line: usize,
    },
    /// `from <module> import ...`. `module` keeps its leading dots.
    ImportFrom {
        module: String,
        names: Vec<ImportName>,
        wildcard: bool,
        line: usize,
    },
    /// `a = b = value` has targets `[a, b]`.
    Assign {
        targets: Vec<Expr>,
        value: Expr,
        line: usize,
    },
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return {
        value: Option<Expr>,
        line: usize,
    },
    Expr(Expr),
    /// `if`/`for`/`while`/`try`/`with`/`match` and friends: the expressions
    /// they own plus every nested block, in source order.
    Compound {
        kind: String,
        exprs: Vec<Expr>,
        blocks: Vec<Vec<Stmt>>,
        line: usize,
    },
    /// Simple statements the analyses do not inspect structurally.
    Other {
        kind: String,
        children: Vec<Expr>,
        line: usize,
    },
}

impl Stmt {
    pub fn kind(&self) -> &str {
        match self {
            Stmt::Import { .. } => "import",
            Stmt::ImportFrom { .. } => "import_from",
            Stmt::Assign { .. } => "assignment",
            Stmt::FunctionDef(_) => "function_definition",
            Stmt::ClassDef(_) => "class_definition",
            Stmt::Return { .. } => "return",
            Stmt::Expr(_) => "expression_statement",
            Stmt::Compound { kind, .. } | Stmt::Other { kind, .. } => kind.as_str(),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Stmt::Import { line, .. }
            | Stmt::ImportFrom { line, .. }
            | Stmt::Assign { line, .. }
            | Stmt::Return { line, .. }
            | Stmt::Compound { line, .. }
            | Stmt::Other { line, .. } => *line,
            Stmt::FunctionDef(f) => f.line,
            Stmt::ClassDef(c) => c.line,
            Stmt::Expr(e) => e.line(),
        }
    }

    /// Expressions owned directly by this statement (not by nested blocks).
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Import { .. } | Stmt::ImportFrom { .. } => Vec::new(),
            Stmt::Assign { targets, value, .. } => {
                targets.iter().chain(std::iter::once(value)).collect()
            }
            Stmt::FunctionDef(f) => f.decorators.iter().collect(),
            Stmt::ClassDef(c) => c.decorators.iter().chain(c.bases.iter()).collect(),
            Stmt::Return { value, .. } => value.iter().collect(),
            Stmt::Expr(e) => vec![e],
            Stmt::Compound { exprs, .. } => exprs.iter().collect(),
            Stmt::Other { children, .. } => children.iter().collect(),
        }
    }

    /// Nested statement blocks, excluding function and class bodies.
    pub fn blocks(&self) -> Vec<&[Stmt]> {
        match self {
            Stmt::Compound { blocks, .. } => blocks.iter().map(|b| b.as_slice()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Visits every statement of `body` in source order, descending into
/// compound-statement blocks but not into function or class bodies.
pub fn walk_stmts<'a>(body: &'a [Stmt], visit: &mut dyn FnMut(&'a Stmt)) {
    for stmt in body {
        visit(stmt);
        for block in stmt.blocks() {
            walk_stmts(block, &mut *visit);
        }
    }
}

/// Visits every expression reachable from `body` without entering nested
/// function or class bodies.
pub fn walk_exprs<'a>(body: &'a [Stmt], visit: &mut dyn FnMut(&'a Expr)) {
    walk_stmts(body, &mut |stmt| {
        for expr in stmt.exprs() {
            expr.walk(&mut *visit);
        }
    });
}

/// Visits every function definition in `body`, including methods and
/// functions nested inside other functions, in source order.
pub fn walk_functions<'a>(body: &'a [Stmt], visit: &mut dyn FnMut(&'a FunctionDef)) {
    for stmt in body {
        match stmt {
            Stmt::FunctionDef(f) => {
                visit(f);
                walk_functions(&f.body, &mut *visit);
            }
            Stmt::ClassDef(c) => walk_functions(&c.body, &mut *visit),
            other => {
                for block in other.blocks() {
                    walk_functions(block, &mut *visit);
                }
            }
        }
    }
}
