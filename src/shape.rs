//! Payload shape inference.
//!
//! A [`Shape`] is a best-effort description of a value: the keys of a
//! dictionary or the attributes of a constructed object. Inference is a fixed
//! sequence of explicit cases tried in order:
//!
//! 1. a dictionary display gives its literal keys;
//! 2. a call to a class defined in the same module gives the attributes its
//!    own methods assign on their first parameter (base classes are not
//!    walked);
//! 3. a bare name is followed to the assignment that most recently bound it,
//!    a bounded number of hops, and cases 1-2 are applied to that value;
//! 4. subscripts and `.get()` calls with literal keys on a name (or on an
//!    attribute chain rooted at it) give a dictionary shape.
//!
//! Anything else is [`ShapeKind::Unknown`], which is an expected outcome and
//! never an error.

use crate::parser::ast::{walk_exprs, walk_stmts, ClassDef, Expr, FunctionDef, Stmt};
use crate::parser::SourceTree;
use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Dict,
    Object,
    Unknown,
}

/// Structural description of a payload or response value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub keys_or_attributes: BTreeSet<String>,
}

impl Shape {
    pub fn unknown() -> Self {
        Self {
            kind: ShapeKind::Unknown,
            keys_or_attributes: BTreeSet::new(),
        }
    }

    pub fn dict(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            kind: ShapeKind::Dict,
            keys_or_attributes: keys.into_iter().collect(),
        }
    }

    pub fn object(attributes: impl IntoIterator<Item = String>) -> Self {
        Self {
            kind: ShapeKind::Object,
            keys_or_attributes: attributes.into_iter().collect(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == ShapeKind::Unknown
    }
}

/// Lexical scope an expression is inferred in: its module and, when inside
/// one, the enclosing function.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    module: &'a SourceTree,
    function: Option<&'a FunctionDef>,
    max_hops: usize,
}

impl<'a> Scope<'a> {
    pub fn new(module: &'a SourceTree, function: Option<&'a FunctionDef>, max_hops: usize) -> Self {
        Self {
            module,
            function,
            max_hops,
        }
    }

    /// Infers the shape of `expr` (cases 1-3).
    pub fn infer_shape(&self, expr: &Expr) -> Shape {
        self.infer_bounded(expr, self.max_hops)
    }

    fn infer_bounded(&self, expr: &Expr, hops_left: usize) -> Shape {
        match expr {
            Expr::Dict { entries, .. } => Shape::dict(
                entries
                    .iter()
                    .filter_map(|(key, _)| key.as_ref()?.literal().map(|l| l.to_key())),
            ),
            Expr::Call { func, .. } => match func.as_ref() {
                Expr::Name { id, .. } => match self.module.find_class(id) {
                    Some(class) => Shape::object(assigned_attributes(class)),
                    None => Shape::unknown(),
                },
                _ => Shape::unknown(),
            },
            Expr::Name { id, line } if hops_left > 0 => match self.binding(id, *line) {
                Some(value) => {
                    debug!("Following `{}` to its binding at line {}", id, value.line());
                    self.infer_bounded(value, hops_left - 1)
                }
                None => Shape::unknown(),
            },
            _ => Shape::unknown(),
        }
    }

    /// Shape of the value bound to `name` within the function: its binding
    /// (case 3), else the keys read from it (case 4).
    pub fn name_shape(&self, name: &str) -> Shape {
        if let Some(value) = self.binding(name, usize::MAX) {
            let shape = self.infer_bounded(value, self.max_hops.saturating_sub(1));
            if !shape.is_unknown() {
                return shape;
            }
        }
        let keys = self.key_access(&[name]);
        if keys.is_empty() {
            Shape::unknown()
        } else {
            Shape::dict(keys)
        }
    }

    /// Follows `name` to the value of the closest assignment preceding
    /// `before_line`, searching the enclosing function first and then the
    /// module top level. Parameters not reassigned in the body have no
    /// binding.
    pub fn binding(&self, name: &str, before_line: usize) -> Option<&'a Expr> {
        if let Some(function) = self.function {
            if let Some(value) = last_assignment(&function.body, name, Some(before_line)) {
                return Some(value);
            }
            // A parameter is bound by the caller, never by a module global.
            if function.params.iter().any(|p| p.name == name) {
                return None;
            }
            // The whole module has run by the time a function body executes.
            return last_assignment(&self.module.body, name, None);
        }
        last_assignment(&self.module.body, name, Some(before_line))
    }

    /// Literal keys read via `x["k"]` or `x.get("k")` from any of `names`
    /// (or an attribute chain rooted at one) inside the function body.
    pub fn key_access(&self, names: &[&str]) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        let Some(function) = self.function else {
            return keys;
        };

        walk_exprs(&function.body, &mut |expr| match expr {
            Expr::Subscript { value, index, .. } if rooted_at_any(value, names) => {
                if let Some(lit) = index.literal() {
                    keys.insert(lit.to_key());
                }
            }
            Expr::Call { func, args, .. } => {
                if let Expr::Attribute { value, attr, .. } = func.as_ref() {
                    if attr == "get" && rooted_at_any(value, names) {
                        if let Some(lit) = args.first().and_then(|a| a.literal()) {
                            keys.insert(lit.to_key());
                        }
                    }
                }
            }
            _ => {}
        });

        keys
    }

    /// Names assigned from `<name>.json()` in the function body.
    pub fn json_aliases(&self, name: &str) -> Vec<String> {
        let mut aliases = Vec::new();
        let Some(function) = self.function else {
            return aliases;
        };
        walk_stmts(&function.body, &mut |stmt| {
            if let Stmt::Assign { targets, value, .. } = stmt {
                if is_json_call_on(value, name) {
                    aliases.extend(targets.iter().filter_map(|t| match t {
                        Expr::Name { id, .. } => Some(id.clone()),
                        _ => None,
                    }));
                }
            }
        });
        aliases
    }

    /// Shape of the first `return` whose value (or, for a call, its first
    /// positional argument) infers to something other than unknown.
    pub fn return_shape(&self) -> Option<Shape> {
        let function = self.function?;
        let mut found = None;
        walk_stmts(&function.body, &mut |stmt| {
            if found.is_some() {
                return;
            }
            if let Stmt::Return {
                value: Some(value), ..
            } = stmt
            {
                let mut shape = self.infer_shape(value);
                if shape.is_unknown() {
                    if let Expr::Call { args, .. } = value {
                        if let Some(first) = args.first() {
                            shape = self.infer_shape(first);
                        }
                    }
                }
                if !shape.is_unknown() {
                    found = Some(shape);
                }
            }
        });
        found
    }
}

/// Attributes assigned on the first parameter of the class's own methods.
fn assigned_attributes(class: &ClassDef) -> BTreeSet<String> {
    let mut attributes = BTreeSet::new();
    for stmt in &class.body {
        let Stmt::FunctionDef(method) = stmt else {
            continue;
        };
        let Some(receiver) = method.positional_params().next() else {
            continue;
        };
        walk_stmts(&method.body, &mut |stmt| {
            if let Stmt::Assign { targets, .. } = stmt {
                for target in targets {
                    if let Expr::Attribute { value, attr, .. } = target {
                        if matches!(value.as_ref(), Expr::Name { id, .. } if id == receiver) {
                            attributes.insert(attr.clone());
                        }
                    }
                }
            }
        });
    }
    attributes
}

fn last_assignment<'a>(body: &'a [Stmt], name: &str, before_line: Option<usize>) -> Option<&'a Expr> {
    let mut found: Option<&'a Expr> = None;
    walk_stmts(body, &mut |stmt| {
        if let Stmt::Assign {
            targets,
            value,
            line,
        } = stmt
        {
            if before_line.map_or(false, |limit| *line >= limit) {
                return;
            }
            let binds = targets
                .iter()
                .any(|t| matches!(t, Expr::Name { id, .. } if id == name));
            if binds {
                found = Some(value);
            }
        }
    });
    found
}

/// True if `expr` is `name`, or an attribute chain or no-argument call chain
/// ending in it (`request.POST`, `r.json()`).
fn rooted_at_any(expr: &Expr, names: &[&str]) -> bool {
    match expr {
        Expr::Name { id, .. } => names.contains(&id.as_str()),
        Expr::Attribute { value, .. } => rooted_at_any(value, names),
        Expr::Call { func, args, .. } if args.is_empty() => rooted_at_any(func, names),
        _ => false,
    }
}

fn is_json_call_on(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Call { func, .. } => matches!(
            func.as_ref(),
            Expr::Attribute { value, attr, .. }
                if attr == "json" && matches!(value.as_ref(), Expr::Name { id, .. } if id == name)
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::AstParser;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn parse(code: &str) -> SourceTree {
        AstParser::parse_source(Path::new("shapes.py"), code).unwrap()
    }

    fn keys(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn returned(tree: &SourceTree, function: &str) -> Shape {
        let func = tree.find_function(function).unwrap();
        let scope = Scope::new(tree, Some(func), 4);
        match func.body.last().unwrap() {
            Stmt::Return {
                value: Some(value), ..
            } => scope.infer_shape(value),
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_dict_literal_keys() {
        let tree = parse("def f():\n    return {'a': 1, \"b\": 2, key: 3, **rest}\n");
        let shape = returned(&tree, "f");
        assert_eq!(shape.kind, ShapeKind::Dict);
        assert_eq!(shape.keys_or_attributes, keys(&["a", "b"]));
    }

    #[test]
    fn test_constructed_object_attributes() {
        let code = r#"
class Order:
    kind = "order"

    def __init__(self, sku):
        self.sku = sku
        if sku:
            self.quantity = 1

    def describe(self):
        self.described = True
        return self.sku

def f():
    return Order("x")
"#;
        let tree = parse(code);
        let shape = returned(&tree, "f");
        assert_eq!(shape.kind, ShapeKind::Object);
        assert_eq!(
            shape.keys_or_attributes,
            keys(&["described", "quantity", "sku"])
        );
    }

    #[test]
    fn test_base_classes_are_not_walked() {
        let code = r#"
class Base:
    def __init__(self):
        self.inherited = 1

class Child(Base):
    def setup(this):
        this.own = 2

def f():
    return Child()
"#;
        let tree = parse(code);
        assert_eq!(returned(&tree, "f").keys_or_attributes, keys(&["own"]));
    }

    #[test]
    fn test_name_binding_is_followed() {
        let code = r#"
def f():
    payload = {"old": 1}
    payload = {"k": "v"}
    alias = payload
    return alias
"#;
        let tree = parse(code);
        let shape = returned(&tree, "f");
        assert_eq!(shape, Shape::dict(keys(&["k"])));
    }

    #[test]
    fn test_module_level_binding() {
        let tree = parse("def f():\n    return DEFAULTS\n\nDEFAULTS = {'timeout': 3}\n");
        assert_eq!(returned(&tree, "f"), Shape::dict(keys(&["timeout"])));
    }

    #[test]
    fn test_parameter_shadows_module_global() {
        let code = r#"
data = {"secret": 1}

def send(data):
    return data

def reassigned(data):
    data = {"fresh": 2}
    return data
"#;
        let tree = parse(code);
        assert!(returned(&tree, "send").is_unknown());
        assert_eq!(returned(&tree, "reassigned"), Shape::dict(keys(&["fresh"])));

        let func = tree.find_function("send").unwrap();
        let scope = Scope::new(&tree, Some(func), 4);
        assert!(scope.binding("data", usize::MAX).is_none());
        assert!(scope.name_shape("data").is_unknown());
    }

    #[test]
    fn test_binding_hops_are_bounded() {
        let code = "def f():\n    a = {'k': 1}\n    b = a\n    c = b\n    return c\n";
        let tree = parse(code);
        let func = tree.find_function("f").unwrap();
        let Stmt::Return { value: Some(value), .. } = &func.body[3] else {
            panic!("expected return");
        };

        assert_eq!(Scope::new(&tree, Some(func), 3).infer_shape(value).kind, ShapeKind::Dict);
        assert!(Scope::new(&tree, Some(func), 2).infer_shape(value).is_unknown());
    }

    #[test]
    fn test_self_referencing_binding_terminates() {
        let tree = parse("def f():\n    x = x\n    return x\n");
        assert!(returned(&tree, "f").is_unknown());
    }

    #[test]
    fn test_opaque_expression_is_unknown() {
        let tree = parse("def f():\n    return build_payload()\n");
        let shape = returned(&tree, "f");
        assert_eq!(shape, Shape::unknown());
        assert!(shape.keys_or_attributes.is_empty());
    }

    #[test]
    fn test_key_access_on_parameter() {
        let code = r#"
def handler(request):
    name = request.POST["name"]
    if request.data.get("email"):
        pass
    page = request.GET.get(page_key)
"#;
        let tree = parse(code);
        let func = tree.find_function("handler").unwrap();
        let shape = Scope::new(&tree, Some(func), 4).name_shape("request");
        assert_eq!(shape, Shape::dict(keys(&["email", "name"])));
    }

    #[test]
    fn test_name_shape_without_evidence() {
        let tree = parse("def handler(request):\n    return None\n");
        let func = tree.find_function("handler").unwrap();
        assert!(Scope::new(&tree, Some(func), 4).name_shape("request").is_unknown());
    }

    #[test]
    fn test_return_shape_unwraps_response_call() {
        let code = r#"
def handler(request):
    if not request:
        return HttpResponse(status=400)
    return JsonResponse({"id": 1, "name": "w"})
"#;
        let tree = parse(code);
        let func = tree.find_function("handler").unwrap();
        let shape = Scope::new(&tree, Some(func), 4).return_shape();
        assert_eq!(shape, Some(Shape::dict(keys(&["id", "name"]))));
    }

    #[test]
    fn test_json_aliases_and_keys() {
        let code = r#"
def fetch():
    r = requests.get("http://x")
    body = r.json()
    first = r.json()["id"]
    return body.get("items")
"#;
        let tree = parse(code);
        let func = tree.find_function("fetch").unwrap();
        let scope = Scope::new(&tree, Some(func), 4);

        let aliases = scope.json_aliases("r");
        assert_eq!(aliases, vec!["body".to_string()]);

        let mut names = vec!["r"];
        names.extend(aliases.iter().map(|s| s.as_str()));
        assert_eq!(scope.key_access(&names), keys(&["id", "items"]));
    }

    #[test]
    fn test_shape_serialization() {
        let json = serde_json::to_string(&Shape::dict(keys(&["b", "a"]))).unwrap();
        assert_eq!(json, r#"{"kind":"dict","keys_or_attributes":["a","b"]}"#);
    }
}
