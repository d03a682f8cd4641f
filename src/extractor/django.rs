use crate::config::AnalyzerConfig;
use crate::error::{ResolveFailure, Unresolved};
use crate::extractor::{DecoratorInfo, EntryPoint, EntryPointExtractor, HandlerRef, Literal, RoutePattern};
use crate::import_resolver::{ImportResolver, ResolutionChain};
use crate::parser::ast::{Expr, FunctionDef, SeqKind, Stmt};
use crate::parser::SourceTree;
use crate::shape::Scope;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Django URL-conf extractor.
///
/// Finds the module-level route table (`urlpatterns` by default), turns each
/// `path(...)`-style registration into a [`RoutePattern`] and follows its
/// handler reference, across files if needed, to the function that serves it.
pub struct DjangoExtractor<'a> {
    config: &'a AnalyzerConfig,
    resolver: &'a ImportResolver<'a>,
}

impl EntryPointExtractor for DjangoExtractor<'_> {
    fn extract_entry_points(&self, tree: &Arc<SourceTree>) -> Vec<EntryPoint> {
        let routes = self.find_route_table(tree);
        if routes.is_empty() {
            return Vec::new();
        }
        debug!(
            "Found {} route(s) in {}",
            routes.len(),
            tree.path.display()
        );

        routes
            .iter()
            .filter_map(|route| match self.resolve_handler(route, tree) {
                Ok(entry) => Some(entry),
                Err(e) if e.reason == ResolveFailure::CallHandler => {
                    debug!("Skipping route '{}': {}", route.url_path, e);
                    None
                }
                Err(e) => {
                    warn!(
                        "Dropping route '{}' ({}) in {}:{}: {}",
                        route.url_path,
                        route.handler_ref.display(),
                        tree.path.display(),
                        route.line,
                        e
                    );
                    None
                }
            })
            .collect()
    }
}

impl<'a> DjangoExtractor<'a> {
    pub fn new(config: &'a AnalyzerConfig, resolver: &'a ImportResolver<'a>) -> Self {
        Self { config, resolver }
    }

    /// Extracts the entries of the file's route table.
    ///
    /// Only the first top-level assignment to the configured table name is
    /// read. A list, a tuple, or a `+` concatenation of them is accepted.
    /// Elements that are not calls to a path function, or whose path is not
    /// a literal string, are skipped.
    ///
    /// # Returns
    ///
    /// The route patterns in declaration order; empty when the file has no
    /// route table.
    pub fn find_route_table(&self, tree: &SourceTree) -> Vec<RoutePattern> {
        let table = tree.body.iter().find_map(|stmt| match stmt {
            Stmt::Assign { targets, value, .. }
                if targets.iter().any(|t| {
                    matches!(t, Expr::Name { id, .. } if *id == self.config.route_table_name)
                }) =>
            {
                Some(value)
            }
            _ => None,
        });

        let Some(table) = table else {
            return Vec::new();
        };

        let mut elements = Vec::new();
        collect_elements(table, &mut elements);

        let scope = Scope::new(tree, None, self.config.max_binding_hops);
        elements
            .into_iter()
            .filter_map(|element| self.route_pattern(element, &scope))
            .collect()
    }

    fn route_pattern(&self, element: &Expr, scope: &Scope) -> Option<RoutePattern> {
        let Expr::Call {
            func,
            args,
            keywords,
            line,
        } = element
        else {
            return None;
        };

        let callee = match func.as_ref() {
            Expr::Name { id, .. } => id.as_str(),
            Expr::Attribute { attr, .. } => attr.as_str(),
            _ => return None,
        };
        if !self.config.is_path_function(callee) {
            return None;
        }

        let Some(url_path) = args.first().and_then(|a| a.literal()).and_then(|l| l.as_str()) else {
            debug!("Route at line {} has no literal path", line);
            return None;
        };

        let Some(handler) = args.get(1) else {
            debug!("Route '{}' at line {} has no handler", url_path, line);
            return None;
        };

        // `name=` when given, else the first keyword.
        let declared = keywords
            .iter()
            .find(|k| k.arg.as_deref() == Some("name"))
            .or_else(|| keywords.iter().find(|k| k.arg.is_some()));
        let declared_name = declared.and_then(|k| literal_string(&k.value, scope));

        Some(RoutePattern {
            url_path: url_path.to_string(),
            declared_name,
            handler_ref: handler_ref(handler),
            line: *line,
        })
    }

    /// Follows a route's handler to its function and builds the entry point.
    ///
    /// # Arguments
    ///
    /// * `route` - Route pattern from `tree`'s route table
    /// * `tree` - The file declaring the route table
    ///
    /// # Errors
    ///
    /// Returns `Unresolved` when the handler is a call expression, cannot be
    /// followed through the imports, or does not end at a function.
    pub fn resolve_handler(
        &self,
        route: &RoutePattern,
        tree: &Arc<SourceTree>,
    ) -> Result<EntryPoint, Unresolved> {
        let name = match &route.handler_ref {
            HandlerRef::Name(name) | HandlerRef::Attribute(name) => name,
            HandlerRef::Call(callee) => {
                return Err(Unresolved::new(callee.clone(), ResolveFailure::CallHandler))
            }
            HandlerRef::Other(kind) => {
                return Err(Unresolved::new(kind.clone(), ResolveFailure::NotAFunction))
            }
        };

        let mut chain = ResolutionChain::starting_at(&tree.path);
        let resolved = self.resolver.resolve_function(name, tree, &mut chain)?;
        let function = resolved
            .tree
            .find_function(&resolved.name)
            .ok_or_else(|| Unresolved::new(name.clone(), ResolveFailure::NotAFunction))?;

        debug!(
            "Resolved handler `{}` to {}:{}",
            name,
            resolved.tree.path.display(),
            function.line
        );

        Ok(self.entry_point(route, &resolved.tree, function))
    }

    fn entry_point(&self, route: &RoutePattern, tree: &SourceTree, function: &FunctionDef) -> EntryPoint {
        let positional: Vec<&str> = function.positional_params().collect();
        let skip = usize::from(self.config.strip_request_parameter && !positional.is_empty());
        let parameter_names = positional[skip..].iter().map(|p| p.to_string()).collect();

        let scope = Scope::new(tree, Some(function), self.config.max_binding_hops);
        let payload_shape = positional.first().map(|first| scope.name_shape(first));
        let response_shape = scope.return_shape();

        let display_name = match (&route.declared_name, self.config.prefer_declared_name) {
            (Some(declared), true) => declared.clone(),
            _ => function.name.clone(),
        };

        EntryPoint {
            display_name,
            declared_name: route.declared_name.clone(),
            resolved_function_name: function.name.clone(),
            source_file: tree.path.clone(),
            declaration_line: function.line,
            url_path: route.url_path.clone(),
            parameter_names,
            decorators: function.decorators.iter().filter_map(decorator_info).collect(),
            payload_shape,
            response_shape,
        }
    }
}

/// Flattens a route table value into its elements.
fn collect_elements<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::Seq {
            kind: SeqKind::List | SeqKind::Tuple,
            elts,
            ..
        } => out.extend(elts.iter()),
        Expr::BinOp {
            left, op, right, ..
        } if op == "+" => {
            collect_elements(left, out);
            collect_elements(right, out);
        }
        _ => {}
    }
}

fn handler_ref(expr: &Expr) -> HandlerRef {
    match expr {
        Expr::Name { id, .. } => HandlerRef::Name(id.clone()),
        Expr::Attribute { .. } => match expr.dotted_name() {
            Some(dotted) => HandlerRef::Attribute(dotted),
            None => HandlerRef::Other(expr.kind().to_string()),
        },
        Expr::Call { func, .. } => {
            let callee = func.dotted_name().unwrap_or_else(|| func.kind().to_string());
            HandlerRef::Call(format!("{}()", callee))
        }
        other => HandlerRef::Other(other.kind().to_string()),
    }
}

/// A literal string, directly or through a module-level constant.
fn literal_string(expr: &Expr, scope: &Scope) -> Option<String> {
    match expr {
        Expr::Literal {
            value: Literal::Str(s),
            ..
        } => Some(s.clone()),
        Expr::Name { id, line } => match scope.binding(id, *line)? {
            Expr::Literal {
                value: Literal::Str(s),
                ..
            } => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn decorator_info(decorator: &Expr) -> Option<DecoratorInfo> {
    match decorator {
        Expr::Name { .. } | Expr::Attribute { .. } => Some(DecoratorInfo {
            name: decorator.dotted_name()?,
            arguments: BTreeMap::new(),
        }),
        Expr::Call { func, keywords, .. } => {
            let name = func.dotted_name()?;
            let arguments = keywords
                .iter()
                .filter_map(|k| Some((k.arg.clone()?, literal_elements(&k.value))))
                .collect();
            Some(DecoratorInfo { name, arguments })
        }
        other => {
            debug!("Skipping decorator of kind {}", other.kind());
            None
        }
    }
}

fn literal_elements(value: &Expr) -> Vec<Literal> {
    match value {
        Expr::Seq { elts, .. } => elts.iter().filter_map(|e| e.literal().cloned()).collect(),
        Expr::Literal { value, .. } => vec![value.clone()],
        _ => Vec::new(),
    }
}
