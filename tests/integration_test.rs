use pretty_assertions::assert_eq;
use pysurface::{
    build_system,
    config::AnalyzerConfig,
    error::Error,
    serializer::{serialize_json, serialize_yaml},
    shape::{Shape, ShapeKind},
    Interface, System, SystemBuilder,
};
use std::path::Path;
use tempfile::TempDir;

/// Helper function to create a temporary test project
fn create_test_project(files: Vec<(&str, &str)>) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&file_path, content).expect("Failed to write test file");
    }

    temp_dir
}

/// A two-service platform: a Django shop and a billing worker
fn platform_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("shop/manage.py", include_str!("fixtures/manage.py")),
        ("shop/config/__init__.py", ""),
        ("shop/config/settings.py", include_str!("fixtures/settings.py")),
        ("shop/config/urls.py", include_str!("fixtures/shop_urls.py")),
        ("shop/widgets/__init__.py", ""),
        ("shop/widgets/views.py", include_str!("fixtures/shop_views.py")),
        ("billing/sync.py", include_str!("fixtures/billing_sync.py")),
        ("billing/broken.py", include_str!("fixtures/malformed.py")),
        (".venv/lib/site.py", "import requests\n\ndef f():\n    requests.get('http://x')\n"),
    ]
}

fn interface<'a>(system: &'a System, name: &str) -> &'a Interface {
    system
        .interfaces
        .iter()
        .find(|i| i.name == name)
        .unwrap_or_else(|| panic!("no interface named {}", name))
}

fn keys(shape: &Option<Shape>) -> Vec<String> {
    shape
        .as_ref()
        .expect("shape should be present")
        .keys_or_attributes
        .iter()
        .cloned()
        .collect()
}

#[test]
fn test_platform_end_to_end() {
    let temp_dir = create_test_project(platform_files());
    let system = build_system(temp_dir.path(), Some("platform")).expect("Failed to build system");

    assert_eq!(system.name, "platform");
    let names: Vec<&str> = system.interfaces.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["billing", "shop"]);
}

#[test]
fn test_widgets_entry_point() {
    let temp_dir = create_test_project(platform_files());
    let system = build_system(temp_dir.path(), None).unwrap();
    let shop = interface(&system, "shop");

    let paths: Vec<&str> = shop.entry_points.iter().map(|e| e.url_path.as_str()).collect();
    assert_eq!(paths, vec!["widgets/", "widgets/<int:pk>/", "ping/"]);

    let widgets = &shop.entry_points[0];
    assert_eq!(widgets.url_path, "widgets/");
    assert_eq!(widgets.declared_name.as_deref(), Some("widgets"));
    assert_eq!(widgets.display_name, "widgets");
    assert_eq!(widgets.resolved_function_name, "list_widgets");
    assert_eq!(widgets.parameter_names, vec!["request"]);
    assert_eq!(widgets.decorators.len(), 1);
    assert_eq!(widgets.decorators[0].name, "require_post");
    assert_eq!(widgets.declaration_line, 14);
    assert!(widgets.source_file.ends_with("shop/widgets/views.py"));
    assert!(widgets.source_file.is_file());
    assert_eq!(keys(&widgets.payload_shape), vec!["color"]);
    assert_eq!(keys(&widgets.response_shape), vec!["count", "widgets"]);
}

#[test]
fn test_aliased_handler_with_object_response() {
    let temp_dir = create_test_project(platform_files());
    let system = build_system(temp_dir.path(), None).unwrap();
    let shop = interface(&system, "shop");

    let detail = &shop.entry_points[1];
    assert_eq!(detail.display_name, "widget-detail");
    assert_eq!(detail.resolved_function_name, "widget_detail");
    assert_eq!(detail.parameter_names, vec!["request", "pk"]);
    assert_eq!(detail.decorators[0].name, "cache_page");
    assert_eq!(detail.decorators[0].arguments["vary_on"].len(), 2);
    assert_eq!(detail.payload_shape, Some(Shape::unknown()));

    let response = detail.response_shape.as_ref().unwrap();
    assert_eq!(response.kind, ShapeKind::Object);
    assert_eq!(keys(&detail.response_shape), vec!["name", "pk"]);

    let ping = &shop.entry_points[2];
    assert_eq!(ping.display_name, "ping");
    assert_eq!(ping.declared_name, None);
    assert!(ping.source_file.ends_with("shop/config/urls.py"));
}

#[test]
fn test_call_handlers_and_unresolved_routes_are_excluded() {
    let temp_dir = create_test_project(platform_files());
    let system = build_system(temp_dir.path(), None).unwrap();
    let shop = interface(&system, "shop");

    for entry in &shop.entry_points {
        assert_ne!(entry.url_path, "orders/");
        assert_ne!(entry.url_path, "health/");
        assert_ne!(entry.url_path, "missing/");
    }
}

#[test]
fn test_requests_post_exit_point() {
    let temp_dir = create_test_project(platform_files());
    let system = build_system(temp_dir.path(), None).unwrap();
    let billing = interface(&system, "billing");

    assert_eq!(billing.exit_points.len(), 2);

    let post = &billing.exit_points[0];
    assert_eq!(post.http_verb, "post");
    assert_eq!(post.url, "http://x/a/b");
    assert_eq!(post.enclosing_function_name, "sync");
    assert_eq!(post.declaration_line, 7);
    let payload = post.payload_shape.as_ref().unwrap();
    assert_eq!(payload.kind, ShapeKind::Dict);
    assert_eq!(keys(&post.payload_shape), vec!["k"]);
    assert_eq!(post.response_shape, None);

    let get = &billing.exit_points[1];
    assert_eq!(get.http_verb, "get");
    assert_eq!(get.url, "https://invoices.internal/api/invoices/");
    assert_eq!(get.enclosing_function_name, "fetch_invoice");
    assert_eq!(get.payload_shape, None);
    assert_eq!(keys(&get.response_shape), vec!["total"]);
}

#[test]
fn test_malformed_file_does_not_hide_others() {
    let temp_dir = create_test_project(vec![
        ("billing/a_broken.py", include_str!("fixtures/malformed.py")),
        ("billing/sync.py", include_str!("fixtures/billing_sync.py")),
        ("billing/z_broken.py", "def (\n"),
    ]);
    let system = build_system(temp_dir.path(), None).unwrap();
    let billing = interface(&system, "billing");

    assert_eq!(billing.exit_points.len(), 2);
    assert!(billing
        .exit_points
        .iter()
        .all(|e| e.source_file.ends_with("billing/sync.py")));
}

#[test]
fn test_deeply_nested_file_does_not_abort_run() {
    let operands: Vec<String> = (0..20000).map(|i| format!("'s{}'", i)).collect();
    let deep = format!(
        "import requests\n\ndef flood():\n    requests.get({})\n",
        operands.join(" + ")
    );
    let temp_dir = create_test_project(vec![
        ("billing/deep.py", deep.as_str()),
        ("billing/sync.py", include_str!("fixtures/billing_sync.py")),
    ]);
    let system = build_system(temp_dir.path(), None).unwrap();
    let billing = interface(&system, "billing");

    let functions: Vec<&str> = billing
        .exit_points
        .iter()
        .map(|e| e.enclosing_function_name.as_str())
        .collect();
    assert_eq!(functions, vec!["flood", "sync", "fetch_invoice"]);
    assert!(billing.exit_points[0].url.ends_with("s19999"));
}

#[test]
fn test_project_without_surface() {
    let temp_dir = create_test_project(vec![(
        "tool.py",
        "import json\n\ndef main():\n    print(json.dumps({'a': 1}))\n",
    )]);
    let system = build_system(temp_dir.path(), None).unwrap();

    assert_eq!(system.interfaces.len(), 1);
    assert!(system.interfaces[0].entry_points.is_empty());
    assert!(system.interfaces[0].exit_points.is_empty());

    let json = serialize_json(&system).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["interfaces"][0]["entry_points"], serde_json::json!([]));
    assert_eq!(value["interfaces"][0]["exit_points"], serde_json::json!([]));
}

#[test]
fn test_hidden_directories_are_not_services() {
    let temp_dir = create_test_project(platform_files());
    let system = build_system(temp_dir.path(), None).unwrap();
    assert!(system.interfaces.iter().all(|i| i.name != ".venv"));
}

#[test]
fn test_output_is_idempotent() {
    let temp_dir = create_test_project(platform_files());
    let builder = SystemBuilder::new(AnalyzerConfig::default());

    let first = serialize_json(&builder.build(temp_dir.path(), None).unwrap()).unwrap();
    let second = serialize_json(&builder.build(temp_dir.path(), None).unwrap()).unwrap();
    assert_eq!(first, second);

    let first = serialize_yaml(&builder.build(temp_dir.path(), None).unwrap()).unwrap();
    let second = serialize_yaml(&builder.build(temp_dir.path(), None).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_output_independent_of_worker_count() {
    let temp_dir = create_test_project(platform_files());
    let single = AnalyzerConfig {
        jobs: 1,
        ..AnalyzerConfig::default()
    };
    let many = AnalyzerConfig {
        jobs: 8,
        ..AnalyzerConfig::default()
    };

    let a = SystemBuilder::new(single).build(temp_dir.path(), None).unwrap();
    let b = SystemBuilder::new(many).build(temp_dir.path(), None).unwrap();
    assert_eq!(serialize_json(&a).unwrap(), serialize_json(&b).unwrap());
}

#[test]
fn test_configuration_options() {
    let temp_dir = create_test_project(platform_files());
    let config = AnalyzerConfig {
        prefer_declared_name: false,
        strip_request_parameter: true,
        ..AnalyzerConfig::default()
    };
    let system = SystemBuilder::new(config).build(temp_dir.path(), None).unwrap();
    let shop = interface(&system, "shop");

    let widgets = &shop.entry_points[0];
    assert_eq!(widgets.display_name, "list_widgets");
    assert_eq!(widgets.declared_name.as_deref(), Some("widgets"));
    assert!(widgets.parameter_names.is_empty());
    assert_eq!(shop.entry_points[1].parameter_names, vec!["pk"]);
}

#[test]
fn test_custom_route_table_and_client() {
    let temp_dir = create_test_project(vec![(
        "svc/routes.py",
        r#"import httpx

def index(request):
    httpx.delete("http://cache/flush")

routes = [route("home/", index)]
"#,
    )]);
    let config = AnalyzerConfig::from_yaml(
        "route_table_name: routes\npath_functions: [route]\nhttp_client_module: httpx\n",
    )
    .unwrap();
    let system = SystemBuilder::new(config).build(temp_dir.path(), None).unwrap();
    let svc = interface(&system, "svc");

    assert_eq!(svc.entry_points.len(), 1);
    assert_eq!(svc.entry_points[0].url_path, "home/");
    assert_eq!(svc.exit_points.len(), 1);
    assert_eq!(svc.exit_points[0].http_verb, "delete");
}

#[test]
fn test_unreadable_root_aborts() {
    let err = build_system(Path::new("/nonexistent/platform"), None).unwrap_err();
    assert!(matches!(err, Error::RootUnreadable { .. }));
}
