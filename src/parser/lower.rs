//! Lowering from the tree-sitter Python CST into [`super::ast`].

use std::cell::Cell;
use tree_sitter::Node;

use super::ast::{
    ClassDef, Expr, FunctionDef, ImportName, Keyword, Literal, Param, ParamKind, SeqKind, Stmt,
};

/// Deepest block or expression nesting that is lowered structurally.
/// Anything below it becomes an opaque [`Expr::Other`] or an empty block.
pub const MAX_NESTING: usize = 200;

/// Statement kinds that own nested blocks.
const COMPOUND_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "while_statement",
    "try_statement",
    "with_statement",
    "match_statement",
];

/// Clause kinds whose blocks belong to the enclosing compound statement.
const CLAUSE_KINDS: &[&str] = &[
    "elif_clause",
    "else_clause",
    "except_clause",
    "except_group_clause",
    "finally_clause",
    "case_clause",
    "with_clause",
    "with_item",
    "block",
];

fn named_children(node: Node) -> Vec<Node> {
    node.named_children(&mut node.walk())
        .filter(|n| n.kind() != "comment")
        .collect()
}

fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

/// Finds the first syntax error in a tree, returning its 1-indexed line.
///
/// Walks with a cursor, so arbitrarily deep trees do not grow the stack.
pub fn first_error_line(root: Node) -> Option<usize> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(line_of(node));
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

pub struct Lowerer<'src> {
    source: &'src [u8],
    depth: Cell<usize>,
}

impl<'src> Lowerer<'src> {
    pub fn new(source: &'src [u8]) -> Self {
        Self {
            source,
            depth: Cell::new(0),
        }
    }

    /// Runs `lower` one nesting level deeper, or returns `None` at the cap.
    fn nested<T>(&self, lower: impl FnOnce() -> T) -> Option<T> {
        let depth = self.depth.get();
        if depth >= MAX_NESTING {
            return None;
        }
        self.depth.set(depth + 1);
        let lowered = lower();
        self.depth.set(depth);
        Some(lowered)
    }

    fn text(&self, node: Node) -> &'src str {
        node.utf8_text(self.source).unwrap_or("")
    }

    /// Lowers a `module` or `block` node into its statements.
    pub fn lower_block(&self, node: Node) -> Vec<Stmt> {
        self.nested(|| {
            named_children(node)
                .into_iter()
                .map(|child| self.lower_stmt(child))
                .collect()
        })
        .unwrap_or_default()
    }

    fn lower_stmt(&self, node: Node) -> Stmt {
        let line = line_of(node);
        match node.kind() {
            "import_statement" => Stmt::Import {
                names: self.import_names(node),
                line,
            },
            "import_from_statement" => {
                let module = node
                    .child_by_field_name("module_name")
                    .map(|m| self.text(m).split_whitespace().collect::<String>())
                    .unwrap_or_default();
                let wildcard = named_children(node)
                    .iter()
                    .any(|c| c.kind() == "wildcard_import");
                Stmt::ImportFrom {
                    module,
                    names: self.import_names(node),
                    wildcard,
                    line,
                }
            }
            "expression_statement" => {
                let children = named_children(node);
                match children.as_slice() {
                    [only] if only.kind() == "assignment" => self.lower_assignment(*only),
                    [only] => Stmt::Expr(self.lower_expr(*only)),
                    _ => Stmt::Other {
                        kind: "expression_statement".to_string(),
                        children: children.iter().map(|c| self.lower_expr(*c)).collect(),
                        line,
                    },
                }
            }
            "function_definition" => Stmt::FunctionDef(self.lower_function(node, Vec::new())),
            "class_definition" => Stmt::ClassDef(self.lower_class(node, Vec::new())),
            "decorated_definition" => {
                let decorators: Vec<Expr> = named_children(node)
                    .into_iter()
                    .filter(|c| c.kind() == "decorator")
                    .filter_map(|d| named_children(d).into_iter().next())
                    .map(|e| self.lower_expr(e))
                    .collect();
                match node.child_by_field_name("definition") {
                    Some(def) if def.kind() == "function_definition" => {
                        Stmt::FunctionDef(self.lower_function(def, decorators))
                    }
                    Some(def) if def.kind() == "class_definition" => {
                        Stmt::ClassDef(self.lower_class(def, decorators))
                    }
                    _ => Stmt::Other {
                        kind: "decorated_definition".to_string(),
                        children: decorators,
                        line,
                    },
                }
            }
            "return_statement" => Stmt::Return {
                value: named_children(node)
                    .into_iter()
                    .next()
                    .map(|v| self.lower_expr(v)),
                line,
            },
            kind if COMPOUND_KINDS.contains(&kind) => {
                let mut exprs = Vec::new();
                let mut blocks = Vec::new();
                self.collect_compound(node, &mut exprs, &mut blocks);
                Stmt::Compound {
                    kind: kind.to_string(),
                    exprs,
                    blocks,
                    line,
                }
            }
            kind => Stmt::Other {
                kind: kind.to_string(),
                children: named_children(node)
                    .into_iter()
                    .map(|c| self.lower_expr(c))
                    .collect(),
                line,
            },
        }
    }

    fn collect_compound(&self, node: Node, exprs: &mut Vec<Expr>, blocks: &mut Vec<Vec<Stmt>>) {
        for child in named_children(node) {
            match child.kind() {
                "block" => blocks.push(self.lower_block(child)),
                kind if CLAUSE_KINDS.contains(&kind) => {
                    self.collect_compound(child, exprs, blocks)
                }
                _ => exprs.push(self.lower_expr(child)),
            }
        }
    }

    fn import_names(&self, node: Node) -> Vec<ImportName> {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        names
            .into_iter()
            .filter_map(|n| match n.kind() {
                "dotted_name" => Some(ImportName {
                    name: self.text(n).to_string(),
                    alias: None,
                }),
                "aliased_import" => {
                    let name = n.child_by_field_name("name")?;
                    Some(ImportName {
                        name: self.text(name).to_string(),
                        alias: n
                            .child_by_field_name("alias")
                            .map(|a| self.text(a).to_string()),
                    })
                }
                _ => None,
            })
            .collect()
    }

    fn lower_assignment(&self, node: Node) -> Stmt {
        let line = line_of(node);
        let mut targets = Vec::new();
        let mut current = node;
        loop {
            if let Some(left) = current.child_by_field_name("left") {
                targets.push(self.lower_expr(left));
            }
            match current.child_by_field_name("right") {
                Some(right) if right.kind() == "assignment" => current = right,
                Some(right) => {
                    return Stmt::Assign {
                        targets,
                        value: self.lower_expr(right),
                        line,
                    }
                }
                // Bare annotation such as `x: int`.
                None => {
                    return Stmt::Other {
                        kind: "annotation".to_string(),
                        children: targets,
                        line,
                    }
                }
            }
        }
    }

    fn lower_function(&self, node: Node, decorators: Vec<Expr>) -> FunctionDef {
        FunctionDef {
            name: node
                .child_by_field_name("name")
                .map(|n| self.text(n).to_string())
                .unwrap_or_default(),
            line: line_of(node),
            params: node
                .child_by_field_name("parameters")
                .map(|p| self.lower_params(p))
                .unwrap_or_default(),
            decorators,
            body: node
                .child_by_field_name("body")
                .map(|b| self.lower_block(b))
                .unwrap_or_default(),
        }
    }

    fn lower_params(&self, node: Node) -> Vec<Param> {
        let mut params = Vec::new();
        let mut positional = true;

        for child in named_children(node) {
            let (name, kind) = match child.kind() {
                "identifier" => (self.text(child).to_string(), None),
                "default_parameter" | "typed_default_parameter" => match child
                    .child_by_field_name("name")
                {
                    Some(n) => (self.text(n).to_string(), None),
                    None => continue,
                },
                "typed_parameter" => match named_children(child).into_iter().next() {
                    Some(inner) if inner.kind() == "identifier" => {
                        (self.text(inner).to_string(), None)
                    }
                    Some(inner) if inner.kind() == "list_splat_pattern" => {
                        positional = false;
                        (self.splat_name(inner), Some(ParamKind::VarPositional))
                    }
                    Some(inner) if inner.kind() == "dictionary_splat_pattern" => {
                        (self.splat_name(inner), Some(ParamKind::VarKeyword))
                    }
                    _ => continue,
                },
                "list_splat_pattern" => {
                    positional = false;
                    (self.splat_name(child), Some(ParamKind::VarPositional))
                }
                "dictionary_splat_pattern" => {
                    (self.splat_name(child), Some(ParamKind::VarKeyword))
                }
                "keyword_separator" => {
                    positional = false;
                    continue;
                }
                _ => continue,
            };

            let kind = kind.unwrap_or(if positional {
                ParamKind::Positional
            } else {
                ParamKind::KeywordOnly
            });
            params.push(Param { name, kind });
        }

        params
    }

    fn splat_name(&self, node: Node) -> String {
        named_children(node)
            .into_iter()
            .next()
            .map(|n| self.text(n).to_string())
            .unwrap_or_default()
    }

    fn lower_class(&self, node: Node, decorators: Vec<Expr>) -> ClassDef {
        ClassDef {
            name: node
                .child_by_field_name("name")
                .map(|n| self.text(n).to_string())
                .unwrap_or_default(),
            line: line_of(node),
            bases: node
                .child_by_field_name("superclasses")
                .map(|s| {
                    named_children(s)
                        .into_iter()
                        .map(|b| self.lower_expr(b))
                        .collect()
                })
                .unwrap_or_default(),
            decorators,
            body: node
                .child_by_field_name("body")
                .map(|b| self.lower_block(b))
                .unwrap_or_default(),
        }
    }

    pub fn lower_expr(&self, node: Node) -> Expr {
        self.nested(|| self.lower_expr_node(node))
            .unwrap_or_else(|| Expr::Other {
                kind: node.kind().to_string(),
                children: Vec::new(),
                line: line_of(node),
            })
    }

    fn lower_expr_node(&self, node: Node) -> Expr {
        let line = line_of(node);
        match node.kind() {
            "identifier" => Expr::Name {
                id: self.text(node).to_string(),
                line,
            },
            "attribute" => match (
                node.child_by_field_name("object"),
                node.child_by_field_name("attribute"),
            ) {
                (Some(object), Some(attr)) => Expr::Attribute {
                    value: Box::new(self.lower_expr(object)),
                    attr: self.text(attr).to_string(),
                    line,
                },
                _ => self.other(node),
            },
            "call" => self.lower_call(node),
            "string" => self.lower_string(node),
            "concatenated_string" => {
                let parts: Vec<Expr> = named_children(node)
                    .into_iter()
                    .map(|s| self.lower_string(s))
                    .collect();
                let mut text = String::new();
                let mut formatted = false;
                for part in &parts {
                    match part {
                        Expr::Literal {
                            value: Literal::Str(s),
                            ..
                        } => text.push_str(s),
                        Expr::FormattedStr { fragments, .. } => {
                            formatted = true;
                            text.push_str(fragments);
                        }
                        _ => {}
                    }
                }
                if formatted {
                    Expr::FormattedStr {
                        fragments: text,
                        line,
                    }
                } else {
                    Expr::Literal {
                        value: Literal::Str(text),
                        line,
                    }
                }
            }
            "integer" => {
                let raw = self.text(node).replace('_', "");
                let value = match parse_int(&raw) {
                    Some(i) => Literal::Int(i),
                    None => raw
                        .parse::<f64>()
                        .map(Literal::Float)
                        .unwrap_or(Literal::Str(raw)),
                };
                Expr::Literal { value, line }
            }
            "float" => {
                let raw = self.text(node).replace('_', "");
                let value = raw
                    .parse::<f64>()
                    .map(Literal::Float)
                    .unwrap_or(Literal::Str(raw));
                Expr::Literal { value, line }
            }
            "true" => Expr::Literal {
                value: Literal::Bool(true),
                line,
            },
            "false" => Expr::Literal {
                value: Literal::Bool(false),
                line,
            },
            "none" => Expr::Literal {
                value: Literal::None,
                line,
            },
            "dictionary" => {
                let entries = named_children(node)
                    .into_iter()
                    .filter_map(|entry| match entry.kind() {
                        "pair" => {
                            let key = entry.child_by_field_name("key")?;
                            let value = entry.child_by_field_name("value")?;
                            Some((Some(self.lower_expr(key)), self.lower_expr(value)))
                        }
                        "dictionary_splat" => {
                            let inner = named_children(entry).into_iter().next()?;
                            Some((None, self.lower_expr(inner)))
                        }
                        _ => None,
                    })
                    .collect();
                Expr::Dict { entries, line }
            }
            "list" => self.seq(node, SeqKind::List),
            "tuple" | "expression_list" => self.seq(node, SeqKind::Tuple),
            "set" => self.seq(node, SeqKind::Set),
            "binary_operator" => match (
                node.child_by_field_name("left"),
                node.child_by_field_name("operator"),
                node.child_by_field_name("right"),
            ) {
                (Some(left), Some(op), Some(right)) => Expr::BinOp {
                    left: Box::new(self.lower_expr(left)),
                    op: self.text(op).to_string(),
                    right: Box::new(self.lower_expr(right)),
                    line,
                },
                _ => self.other(node),
            },
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.lower_expr(inner),
                None => self.other(node),
            },
            "subscript" => match (
                node.child_by_field_name("value"),
                node.child_by_field_name("subscript"),
            ) {
                (Some(value), Some(index)) => Expr::Subscript {
                    value: Box::new(self.lower_expr(value)),
                    index: Box::new(self.lower_expr(index)),
                    line,
                },
                _ => self.other(node),
            },
            _ => self.other(node),
        }
    }

    fn other(&self, node: Node) -> Expr {
        Expr::Other {
            kind: node.kind().to_string(),
            children: named_children(node)
                .into_iter()
                .map(|c| self.lower_expr(c))
                .collect(),
            line: line_of(node),
        }
    }

    fn seq(&self, node: Node, kind: SeqKind) -> Expr {
        Expr::Seq {
            kind,
            elts: named_children(node)
                .into_iter()
                .map(|c| self.lower_expr(c))
                .collect(),
            line: line_of(node),
        }
    }

    fn lower_call(&self, node: Node) -> Expr {
        let line = line_of(node);
        let func = match node.child_by_field_name("function") {
            Some(f) => self.lower_expr(f),
            None => return self.other(node),
        };

        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if let Some(arguments) = node.child_by_field_name("arguments") {
            if arguments.kind() == "argument_list" {
                for arg in named_children(arguments) {
                    match arg.kind() {
                        "keyword_argument" => {
                            let name = arg.child_by_field_name("name");
                            let value = arg.child_by_field_name("value");
                            if let (Some(name), Some(value)) = (name, value) {
                                keywords.push(Keyword {
                                    arg: Some(self.text(name).to_string()),
                                    value: self.lower_expr(value),
                                });
                            }
                        }
                        "dictionary_splat" => {
                            if let Some(inner) = named_children(arg).into_iter().next() {
                                keywords.push(Keyword {
                                    arg: None,
                                    value: self.lower_expr(inner),
                                });
                            }
                        }
                        _ => args.push(self.lower_expr(arg)),
                    }
                }
            } else {
                // Bare generator argument: `f(x for x in y)`.
                args.push(self.lower_expr(arguments));
            }
        }

        Expr::Call {
            func: Box::new(func),
            args,
            keywords,
            line,
        }
    }

    fn lower_string(&self, node: Node) -> Expr {
        let line = line_of(node);
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();

        let start = children.iter().find(|c| c.kind() == "string_start");
        let end = children.iter().rev().find(|c| c.kind() == "string_end");

        let (prefix, content_start, content_end) = match (start, end) {
            (Some(s), Some(e)) => {
                let opening = self.text(*s);
                let prefix: String = opening
                    .chars()
                    .take_while(|c| *c != '\'' && *c != '"')
                    .collect();
                (prefix, s.end_byte(), e.start_byte())
            }
            _ => (String::new(), node.start_byte(), node.end_byte()),
        };

        let prefix = prefix.to_ascii_lowercase();
        let formatted = prefix.contains('f');
        let raw = prefix.contains('r');

        // Interpolations are cut out; the literal text around them is kept.
        let mut text = String::new();
        let mut cursor_byte = content_start;
        for child in children.iter().filter(|c| c.kind() == "interpolation") {
            if child.start_byte() > cursor_byte {
                text.push_str(&self.slice(cursor_byte, child.start_byte()));
            }
            cursor_byte = cursor_byte.max(child.end_byte());
        }
        if content_end > cursor_byte {
            text.push_str(&self.slice(cursor_byte, content_end));
        }

        let text = if raw { text } else { unescape(&text) };

        if formatted {
            Expr::FormattedStr {
                fragments: text,
                line,
            }
        } else {
            Expr::Literal {
                value: Literal::Str(text),
                line,
            }
        }
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.source
            .get(start..end)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let lower = raw.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse::<i64>().ok()
    }
}

/// Decodes the common backslash escapes; unknown escapes are kept verbatim.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
