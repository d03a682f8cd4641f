use crate::config::AnalyzerConfig;
use crate::detector::ProjectDetector;
use crate::extractor::{ExitPoint, ExitPointExtractor, Literal};
use crate::parser::ast::{walk_functions, walk_stmts, Expr, FunctionDef, Keyword, Stmt};
use crate::parser::SourceTree;
use crate::shape::{Scope, Shape};
use log::debug;

/// Outbound-call extractor for `requests`-style HTTP clients.
///
/// A file is only inspected when it imports the configured client module.
/// Every function is then searched for `<client>.<verb>(...)` calls, where
/// the client reference may be reached through an attribute or call chain
/// (`requests.Session().post`) or through a local name bound to one.
pub struct RequestsExtractor<'a> {
    config: &'a AnalyzerConfig,
}

impl ExitPointExtractor for RequestsExtractor<'_> {
    fn extract_exit_points(&self, tree: &SourceTree) -> Vec<ExitPoint> {
        self.find_exit_points(tree)
    }
}

impl<'a> RequestsExtractor<'a> {
    pub fn new(config: &'a AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Finds the outbound calls in `tree`, ordered by source line.
    pub fn find_exit_points(&self, tree: &SourceTree) -> Vec<ExitPoint> {
        let aliases = ProjectDetector::client_aliases(tree, self.config);
        if aliases.is_empty() {
            return Vec::new();
        }
        debug!(
            "{} imports {} as {:?}",
            tree.path.display(),
            self.config.http_client_module,
            aliases
        );

        let mut exits = Vec::new();
        walk_functions(&tree.body, &mut |function| {
            self.scan_function(tree, function, &aliases, &mut exits);
        });
        // Nested functions are visited after their parent.
        exits.sort_by_key(|e| e.declaration_line);
        exits
    }

    fn scan_function(
        &self,
        tree: &SourceTree,
        function: &FunctionDef,
        aliases: &[String],
        exits: &mut Vec<ExitPoint>,
    ) {
        let scope = Scope::new(tree, Some(function), self.config.max_binding_hops);

        walk_stmts(&function.body, &mut |stmt| {
            // `r = client.verb(...)` binds the response to `r`.
            let bound = match stmt {
                Stmt::Assign { targets, value, .. } if targets.len() == 1 => match &targets[0] {
                    Expr::Name { id, .. } => Some((id.as_str(), value)),
                    _ => None,
                },
                _ => None,
            };

            for expr in stmt.exprs() {
                expr.walk(&mut |node| {
                    let Some(verb) = self.client_verb(node, aliases, &scope) else {
                        return;
                    };
                    let response_name = bound
                        .filter(|(_, value)| std::ptr::eq(*value, node))
                        .map(|(name, _)| name);
                    if let Some(exit) = self.exit_point(tree, function, node, verb, response_name, &scope) {
                        exits.push(exit);
                    }
                });
            }
        });
    }

    /// Returns the verb if `node` is a call to a client verb method.
    fn client_verb<'n>(&self, node: &'n Expr, aliases: &[String], scope: &Scope) -> Option<&'n str> {
        let Expr::Call { func, .. } = node else {
            return None;
        };
        let Expr::Attribute { value, attr, .. } = func.as_ref() else {
            return None;
        };
        if !self.config.is_http_verb(attr) {
            return None;
        }

        if self.is_client(value, aliases) {
            return Some(attr.as_str());
        }

        // `session = requests.Session()` and later `session.post(...)`.
        let Expr::Name { id, line } = value.as_ref() else {
            return None;
        };
        let bound = scope.binding(id, *line)?;
        self.is_client(bound, aliases).then_some(attr.as_str())
    }

    /// True if `expr` reaches a client alias only through attribute access
    /// and constructor-style calls (`requests`, `requests.Session()`).
    ///
    /// A call to a verb or to `json()` along the chain yields a response or
    /// its decoded body, which is not a client.
    fn is_client(&self, expr: &Expr, aliases: &[String]) -> bool {
        match expr {
            Expr::Name { id, .. } => aliases.iter().any(|a| a == id),
            Expr::Attribute { value, .. } => self.is_client(value, aliases),
            Expr::Call { func, .. } => match func.as_ref() {
                Expr::Attribute { attr, .. }
                    if attr == "json" || self.config.is_http_verb(attr) =>
                {
                    false
                }
                // `from requests import get` then `get(url)`.
                Expr::Name { id, .. } if self.config.is_http_verb(id) => false,
                callee => self.is_client(callee, aliases),
            },
            _ => false,
        }
    }

    fn exit_point(
        &self,
        tree: &SourceTree,
        function: &FunctionDef,
        call: &Expr,
        verb: &str,
        response_name: Option<&str>,
        scope: &Scope,
    ) -> Option<ExitPoint> {
        let Expr::Call { args, keywords, line, .. } = call else {
            return None;
        };

        let url_expr = args
            .first()
            .or_else(|| keyword(keywords, &self.config.url_keyword));
        let Some(url) = url_expr.and_then(|e| url_string(e, scope, self.config.max_binding_hops)) else {
            debug!(
                "Dropping {} call at {}:{}: no URL could be extracted",
                verb,
                tree.path.display(),
                line
            );
            return None;
        };

        let payload = args.get(1).or_else(|| {
            self.config
                .payload_keywords
                .iter()
                .find_map(|k| keyword(keywords, k))
        });
        let payload_shape = payload.map(|p| scope.infer_shape(p));

        let response_shape = response_name.map(|name| {
            let aliases = scope.json_aliases(name);
            let mut names = vec![name];
            names.extend(aliases.iter().map(String::as_str));
            let keys = scope.key_access(&names);
            if keys.is_empty() {
                Shape::unknown()
            } else {
                Shape::dict(keys)
            }
        });

        Some(ExitPoint {
            http_verb: verb.to_string(),
            enclosing_function_name: function.name.clone(),
            source_file: tree.path.clone(),
            declaration_line: *line,
            url,
            payload_shape,
            response_shape,
        })
    }
}

fn keyword<'e>(keywords: &'e [Keyword], name: &str) -> Option<&'e Expr> {
    keywords
        .iter()
        .find(|k| k.arg.as_deref() == Some(name))
        .map(|k| &k.value)
}

/// Assembles a URL from literals, concatenations, f-strings and `%`/
/// `.format()` templates, following bare names to their binding.
///
/// Operands of a concatenation that cannot be read contribute nothing;
/// `None` means no part of the expression was readable as a string.
fn url_string(expr: &Expr, scope: &Scope, hops_left: usize) -> Option<String> {
    match expr {
        Expr::Literal {
            value: Literal::Str(s),
            ..
        } => Some(s.clone()),
        Expr::FormattedStr { fragments, .. } => Some(fragments.clone()),
        Expr::BinOp {
            left, op, right, ..
        } => match op.as_str() {
            "+" => {
                let left = url_string(left, scope, hops_left).unwrap_or_default();
                let right = url_string(right, scope, hops_left).unwrap_or_default();
                Some(left + &right)
            }
            "%" => url_string(left, scope, hops_left),
            _ => None,
        },
        Expr::Call { func, .. } => match func.as_ref() {
            Expr::Attribute { value, attr, .. } if attr == "format" => {
                url_string(value, scope, hops_left)
            }
            _ => None,
        },
        Expr::Name { id, line } if hops_left > 0 => {
            let value = scope.binding(id, *line)?;
            url_string(value, scope, hops_left - 1)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::AstParser;
    use crate::shape::ShapeKind;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn exits_of(code: &str) -> Vec<ExitPoint> {
        let config = AnalyzerConfig::default();
        let tree = AstParser::parse_source(Path::new("client.py"), code).unwrap();
        RequestsExtractor::new(&config).extract_exit_points(&tree)
    }

    #[test]
    fn test_post_with_concatenated_url() {
        let code = r#"
import requests

def sync():
    requests.post("http://x/a" + "/b", data={"k": "v"})
"#;
        let exits = exits_of(code);
        assert_eq!(exits.len(), 1);

        let exit = &exits[0];
        assert_eq!(exit.http_verb, "post");
        assert_eq!(exit.url, "http://x/a/b");
        assert_eq!(exit.enclosing_function_name, "sync");
        assert_eq!(exit.declaration_line, 5);
        assert_eq!(exit.source_file, Path::new("client.py"));
        assert_eq!(
            exit.payload_shape,
            Some(Shape::dict(vec!["k".to_string()]))
        );
        assert_eq!(exit.response_shape, None);
    }

    #[test]
    fn test_no_client_import_short_circuits() {
        let code = "import http\n\ndef sync():\n    requests.post('http://x')\n";
        assert!(exits_of(code).is_empty());
    }

    #[test]
    fn test_aliased_client_and_module_constant_url() {
        let code = r#"
import requests as http

BASE = "https://billing.internal"

def fetch_invoice(invoice_id):
    url = BASE + "/invoices/" + invoice_id
    resp = http.get(url, timeout=5)
    body = resp.json()
    return body["total"], resp.json().get("currency")
"#;
        let exits = exits_of(code);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].http_verb, "get");
        assert_eq!(exits[0].url, "https://billing.internal/invoices/");
        assert_eq!(exits[0].payload_shape, None);
        assert_eq!(
            exits[0].response_shape,
            Some(Shape::dict(vec!["currency".to_string(), "total".to_string()]))
        );
    }

    #[test]
    fn test_unread_response_is_unknown() {
        let code = "import requests\n\ndef ping():\n    r = requests.head('http://x/health')\n    return r.status_code\n";
        let exits = exits_of(code);
        assert_eq!(exits[0].response_shape, Some(Shape::unknown()));
    }

    #[test]
    fn test_fstring_keyword_url_and_json_payload() {
        let code = r#"
import requests

class Event:
    def __init__(self, name):
        self.name = name
        self.at = None

def push(host):
    requests.put(url=f"https://{host}/events/{1}", json=Event("x"))

def pull(host):
    requests.get(f"{host}/events")
"#;
        let exits = exits_of(code);
        assert_eq!(exits.len(), 2);
        assert_eq!(exits[0].url, "https:///events/");
        let payload = exits[0].payload_shape.as_ref().unwrap();
        assert_eq!(payload.kind, ShapeKind::Object);
        assert!(payload.keys_or_attributes.contains("name"));
        assert!(payload.keys_or_attributes.contains("at"));
        assert_eq!(exits[1].url, "/events");
        assert_eq!(exits[1].enclosing_function_name, "pull");
    }

    #[test]
    fn test_session_and_chained_clients() {
        let code = r#"
import requests

def a():
    session = requests.Session()
    session.delete("http://x/items/1")

def b():
    requests.Session().patch("http://x/items/2", {"qty": 1})
"#;
        let exits = exits_of(code);
        let verbs: Vec<&str> = exits.iter().map(|e| e.http_verb.as_str()).collect();
        assert_eq!(verbs, vec!["delete", "patch"]);
        assert_eq!(
            exits[1].payload_shape,
            Some(Shape::dict(vec!["qty".to_string()]))
        );
    }

    #[test]
    fn test_reads_on_response_data_are_not_calls() {
        let code = r#"
import requests

def total(u):
    return requests.get(u + "/x").json().get("total")

def items(url):
    data = requests.get(url + "/items").json()
    resp = requests.get(url + "/other")
    return data.get("items"), resp.headers.get("etag")
"#;
        let exits = exits_of(code);
        let urls: Vec<&str> = exits.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/x", "/items", "/other"]);
        assert!(exits.iter().all(|e| e.http_verb == "get"));
    }

    #[test]
    fn test_parameters_do_not_bind_to_module_globals() {
        let code = r#"
import requests

url = "http://default"
data = {"secret": 1}

def send(url, data):
    requests.post(url, data)
    requests.post(url + "/audit", data)
"#;
        let exits = exits_of(code);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].url, "/audit");
        assert_eq!(exits[0].payload_shape, Some(Shape::unknown()));
    }

    #[test]
    fn test_deeply_nested_url_does_not_overflow() {
        let operands: Vec<String> = (0..5000).map(|i| format!("'p{}'", i)).collect();
        let code = format!(
            "import requests\n\ndef f():\n    requests.get({})\n",
            operands.join(" + ")
        );
        let exits = exits_of(&code);
        assert_eq!(exits.len(), 1);
        assert!(exits[0].url.ends_with("p4999"));
    }

    #[test]
    fn test_opaque_url_is_dropped() {
        let code = "import requests\n\ndef f():\n    requests.get(build_url())\n    requests.get()\n";
        assert!(exits_of(code).is_empty());
    }

    #[test]
    fn test_non_verb_and_module_level_calls_ignored() {
        let code = r#"
import requests

requests.get("http://at-import-time")

def f():
    requests.request("GET", "http://x")
    requests.get("http://x/ok")
"#;
        let exits = exits_of(code);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].url, "http://x/ok");
    }

    #[test]
    fn test_nested_functions_attributed_to_innermost() {
        let code = r#"
import requests

def outer():
    def inner():
        requests.get("http://x/inner")
    requests.get("http://x/outer")
"#;
        let exits = exits_of(code);
        let owners: Vec<&str> = exits
            .iter()
            .map(|e| e.enclosing_function_name.as_str())
            .collect();
        assert_eq!(owners, vec!["inner", "outer"]);
    }
}
