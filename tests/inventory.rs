// Integration tests over the inventory corpus

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use forge::inventory::{
    discover_inventory_files, parse_inventory_files, parse_inventory_files_with, Inventory,
    InventoryFile, ResolveOptions, Transport,
};
use forge::parser::ast::Value;
use forge::Diagnostics;
use pretty_assertions::assert_eq;

fn corpus(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("corpus")
        .join(path)
}

fn load(paths: &[&str]) -> (Vec<InventoryFile>, Option<Inventory>, Diagnostics) {
    let paths: Vec<PathBuf> = paths.iter().map(|p| corpus(p)).collect();
    let files = discover_inventory_files(&paths).expect("corpus files should be readable");
    let (inventory, diags) = parse_inventory_files(&files);
    (files, inventory, diags)
}

fn load_valid(paths: &[&str]) -> Inventory {
    let (_, inventory, diags) = load(paths);
    assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
    inventory.expect("inventory should resolve")
}

fn target(inventory: &Inventory, name: &str) -> Vec<String> {
    inventory.targets()[name].iter().cloned().collect()
}

fn var<'a>(inventory: &'a Inventory, host: &str, name: &str) -> &'a Value {
    &inventory.host(host).unwrap().vars()[name]
}

/// (summary, detail) pairs, sorted so the comparison ignores order
fn summarize(diags: &Diagnostics) -> Vec<(String, String)> {
    let mut pairs: Vec<_> = diags
        .iter()
        .map(|d| (d.summary.clone(), d.detail.clone()))
        .collect();
    pairs.sort();
    pairs
}

fn expect_errors(path: &str, expected: &[(&str, &str)]) -> Diagnostics {
    let (_, inventory, diags) = load(&[path]);
    assert!(inventory.is_none(), "inventory should not resolve for {}", path);

    let mut expected: Vec<(String, String)> = expected
        .iter()
        .map(|(s, d)| (s.to_string(), d.to_string()))
        .collect();
    expected.sort();
    assert_eq!(summarize(&diags), expected);
    diags
}

#[test]
fn simple_inventory() {
    let (files, _, _) = load(&["simple"]);
    assert_eq!(files.len(), 1);

    let inventory = load_valid(&["simple"]);
    assert_eq!(var(&inventory, "web1", "environment"), &Value::from("test"));
    assert_eq!(var(&inventory, "web1", "hostname"), &Value::from("web1.example.com"));
    assert_eq!(var(&inventory, "db1", "port"), &Value::Int(5432));
    assert_eq!(var(&inventory, "db1", "role"), &Value::from("database"));

    assert_eq!(target(&inventory, "webservers"), vec!["web1", "web2"]);
    assert_eq!(target(&inventory, "all"), vec!["db1", "web1", "web2"]);
    assert_eq!(target(&inventory, "web2"), vec!["web2"]);

    match &inventory.host("web2").unwrap().transport {
        Transport::Ssh(ssh) => assert_eq!(ssh.target(), "deploy@10.0.1.11:22"),
        other => panic!("expected ssh transport, got {:?}", other),
    }
}

#[test]
fn parent_hierarchy() {
    let inventory = load_valid(&["parent-hierarchy"]);

    assert_eq!(
        target(&inventory, "infrastructure"),
        vec!["api1", "api2", "cdn1", "web1", "web2", "web3"]
    );
    assert_eq!(target(&inventory, "frontend"), vec!["cdn1", "web1", "web2", "web3"]);
    assert_eq!(target(&inventory, "backend"), vec!["api1", "api2"]);
    assert_eq!(target(&inventory, "cdn"), vec!["cdn1"]);

    let cdn1 = inventory.host("cdn1").unwrap();
    assert_eq!(cdn1.groups, vec!["infrastructure", "frontend", "cdn"]);
    assert_eq!(cdn1.vars()["managed"], Value::Bool(true));
    assert_eq!(cdn1.vars()["role"], Value::from("frontend"));
    assert_eq!(cdn1.vars()["app_port"], Value::Int(8080));
    assert_eq!(
        cdn1.vars()["edge_locations"],
        Value::from(vec!["us-east", "us-west", "eu-west"])
    );

    // cdn overrides the global port; other hosts keep it
    let port = |host: &str| match &inventory.host(host).unwrap().transport {
        Transport::Ssh(ssh) => ssh.port,
        other => panic!("expected ssh transport, got {:?}", other),
    };
    assert_eq!(port("cdn1"), 2222);
    assert_eq!(port("api1"), 22);

    assert_eq!(var(&inventory, "api2", "api_version"), &Value::from("v2"));
    assert_eq!(var(&inventory, "api2", "tier"), &Value::from("secondary"));
    assert!(inventory.host("web1").unwrap().vars().get("api_version").is_none());
}

#[test]
fn variable_interpolation() {
    let inventory = load_valid(&["variable-interpolation"]);

    assert_eq!(
        var(&inventory, "app1", "service_url"),
        &Value::from("https://acme-prod-app1.prod.acme.internal:8001/orders")
    );
    assert_eq!(var(&inventory, "app2", "port"), &Value::Int(8002));
    assert_eq!(var(&inventory, "app1", "replicas"), &Value::Int(3));
    assert_eq!(var(&inventory, "app2", "replicas"), &Value::Int(1));
    assert_eq!(var(&inventory, "app1", "tags"), &Value::from(vec!["prod", "ORDERS"]));

    // group-level view keeps what resolves without host values
    let app = inventory.group("app").unwrap();
    assert_eq!(app.vars.get("prefix"), Some(&Value::from("acme-prod")));
    assert!(app.vars.get("service_url").is_none());
}

#[test]
fn multi_environment_combined() {
    let inventory = load_valid(&["multi-environment"]);

    assert_eq!(
        target(&inventory, "linux"),
        vec!["prod-db1", "prod-web1", "stage-web1"]
    );
    assert_eq!(target(&inventory, "databases"), vec!["prod-db1"]);
    assert_eq!(var(&inventory, "prod-web1", "log_level"), &Value::from("warn"));
    assert_eq!(var(&inventory, "prod-db1", "log_level"), &Value::from("error"));
    assert_eq!(var(&inventory, "prod-db1", "backups"), &Value::Bool(true));
    assert_eq!(var(&inventory, "stage-web1", "log_level"), &Value::from("info"));
    assert_eq!(var(&inventory, "stage-web1", "ntp_server"), &Value::from("ntp.acme.com"));
}

#[test]
fn multi_environment_partial() {
    let production = load_valid(&[
        "multi-environment/globals.hcl",
        "multi-environment/production.hcl",
    ]);
    assert_eq!(target(&production, "all"), vec!["prod-db1", "prod-web1"]);
    assert!(production.host("stage-web1").is_none());

    let staging = load_valid(&[
        "multi-environment/globals.hcl",
        "multi-environment/staging.hcl",
    ]);
    assert_eq!(target(&staging, "all"), vec!["stage-web1"]);
    assert_eq!(target(&staging, "databases"), Vec::<String>::new());
    assert_eq!(var(&staging, "stage-web1", "replicas"), &Value::Int(1));
}

#[test]
fn circular_parent_reference() {
    expect_errors(
        "error-cases/circular-parent.hcl",
        &[
            ("Circular group reference", "The group 'group_a' has a circular reference."),
            ("Circular group reference", "The group 'group_b' has a circular reference."),
            ("Circular group reference", "The group 'group_c' has a circular reference."),
        ],
    );
}

#[test]
fn invalid_parent_reference() {
    expect_errors(
        "error-cases/invalid-parent.hcl",
        &[(
            "Invalid parent group",
            "The parent group 'nonexistent_group' does not exist.",
        )],
    );
}

#[test]
fn reserved_group_name() {
    expect_errors(
        "error-cases/reserved-name.hcl",
        &[(
            "Invalid group name",
            "The group name 'all' is reserved and cannot be used.",
        )],
    );
}

#[test]
fn circular_variables() {
    let unresolvable = |name: &str| {
        format!(
            "The variable '{}' could not be resolved due to missing or circular dependencies.",
            name
        )
    };
    let details: Vec<String> = ["hostname", "var_c", "var_a", "var_b"]
        .iter()
        .map(|n| unresolvable(n))
        .collect();
    let expected: Vec<(&str, &str)> = details
        .iter()
        .map(|d| ("Unresolvable variable", d.as_str()))
        .collect();

    let diags = expect_errors("error-cases/circular-variables.hcl", &expected);

    // reported in the order the dependency walk reached them
    let order: Vec<&str> = diags.iter().map(|d| d.detail.as_str()).collect();
    assert_eq!(
        order,
        vec![
            unresolvable("hostname"),
            unresolvable("var_a"),
            unresolvable("var_b"),
            unresolvable("var_c"),
        ]
    );
}

#[test]
fn name_conflicts() {
    let path = corpus("error-cases/name-conflicts.hcl");
    let host_location = format!("{}:19,1", path.display());
    let second = format!(
        "The group name \"server1\" conflicts with a host name defined at \"{}\".",
        host_location
    );

    let diags = expect_errors(
        "error-cases/name-conflicts.hcl",
        &[
            ("Name conflict", "The group name \"server1\" conflicts with a host name."),
            ("Name conflict", second.as_str()),
        ],
    );
    let locations: Vec<_> = diags
        .iter()
        .map(|d| d.location.as_ref().map(|l| l.line))
        .collect();
    assert_eq!(locations, vec![Some(11), Some(19)]);
}

#[test]
fn target_selection() {
    let inventory = load_valid(&["parent-hierarchy"]);
    let names = |pattern: &str| -> Vec<String> {
        inventory
            .select(pattern)
            .unwrap()
            .into_iter()
            .map(|h| h.name.clone())
            .collect()
    };

    assert_eq!(names("frontend:!cdn"), vec!["web1", "web2", "web3"]);
    assert_eq!(names("infrastructure:&backend"), vec!["api1", "api2"]);
    assert_eq!(names("api*:cdn1"), vec!["api1", "api2", "cdn1"]);
    assert!(inventory.select("nowhere").is_err());
}

#[test]
fn sequential_resolution_matches_parallel() {
    let paths = [corpus("multi-environment"), corpus("error-cases/circular-variables.hcl")];
    let files = discover_inventory_files(&paths).unwrap();
    let sequential = ResolveOptions {
        parallel: false,
        ..ResolveOptions::default()
    };

    let (parallel_inv, parallel_diags) = parse_inventory_files(&files);
    let (sequential_inv, sequential_diags) = parse_inventory_files_with(&files, &sequential);
    assert_eq!(parallel_inv, sequential_inv);
    assert_eq!(parallel_diags, sequential_diags);
}

#[test]
fn precedence_host_over_groups_over_global() {
    let files = [InventoryFile::new(
        "precedence.hcl",
        r#"
vars {
  level = "global"
  only_global = 1
}

group "parent" {
  vars {
    level = "parent"
  }
}

group "first" {
  parent = "parent"
  hosts  = ["h1", "h2"]
  vars {
    level   = "first"
    sibling = "first"
  }
}

group "second" {
  parent = "parent"
  hosts  = ["h1"]
  vars {
    sibling = "second"
  }
}

host "h1" {}

host "h2" {
  vars {
    level = "host"
  }
}
"#,
    )];
    let (inventory, diags) = parse_inventory_files(&files);
    assert!(diags.is_empty(), "{:?}", diags);
    let inventory = inventory.unwrap();

    let vars = |host: &str| -> BTreeMap<String, Value> { inventory.host(host).unwrap().vars().clone() };
    assert_eq!(vars("h1")["level"], Value::from("first"));
    assert_eq!(vars("h1")["sibling"], Value::from("second"));
    assert_eq!(vars("h1")["only_global"], Value::Int(1));
    assert_eq!(vars("h2")["level"], Value::from("host"));
    assert_eq!(vars("h2")["sibling"], Value::from("first"));
}
