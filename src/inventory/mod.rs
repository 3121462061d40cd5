// Inventory module - resolves hosts, groups and variables from inventory files

pub mod compiler;
pub mod declarations;
pub mod decode;
pub mod discovery;
pub mod graph;
pub mod groups;
pub mod hierarchy;
pub mod resolver;
pub mod transport;

pub use discovery::discover_inventory_files;
pub use groups::{parse_target_pattern, select_hosts, PatternTerm};
pub use hierarchy::ALL_GROUP;
pub use resolver::ResolveOptions;
pub use transport::{Escalate, Secret, SshConfig, Transport};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diagnostics::Diagnostics;
use crate::output::errors::ForgeError;
use crate::parser::parse_source;
use crate::runtime::{DefaultEvaluator, Evaluator, Scope};
use declarations::{DeclarationSet, TransportKind};

/// Source text of one inventory file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryFile {
    pub path: PathBuf,
    pub content: String,
}

impl InventoryFile {
    pub fn new(path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        InventoryFile {
            path: path.as_ref().to_path_buf(),
            content: content.into(),
        }
    }

    /// File name as it appears in diagnostic locations
    pub fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// A host with its variables, transport and escalation fully evaluated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedHost {
    pub name: String,
    pub transport: Transport,
    pub escalate: Escalate,
    /// Every group containing the host, ancestors first
    pub groups: Vec<String>,
    pub vars: Scope,
}

impl ResolvedHost {
    pub fn vars(&self) -> &Scope {
        &self.vars
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedGroup {
    pub name: String,
    pub parents: Vec<String>,
    /// Direct hosts plus those of every descendant group
    pub hosts: BTreeSet<String>,
    /// Variables resolvable along the group's own chain
    pub vars: Scope,
}

/// The resolved, read-only inventory
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Inventory {
    pub(crate) hosts: BTreeMap<String, ResolvedHost>,
    pub(crate) groups: BTreeMap<String, ResolvedGroup>,
    pub(crate) targets: BTreeMap<String, BTreeSet<String>>,
}

impl Inventory {
    pub fn hosts(&self) -> &BTreeMap<String, ResolvedHost> {
        &self.hosts
    }

    pub fn groups(&self) -> &BTreeMap<String, ResolvedGroup> {
        &self.groups
    }

    /// Host names per target: `all`, every group and every host
    pub fn targets(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.targets
    }

    pub fn host(&self, name: &str) -> Option<&ResolvedHost> {
        self.hosts.get(name)
    }

    pub fn group(&self, name: &str) -> Option<&ResolvedGroup> {
        self.groups.get(name)
    }

    /// Hosts of one target, ordered by name
    pub fn target(&self, name: &str) -> Option<Vec<&ResolvedHost>> {
        self.targets
            .get(name)
            .map(|hosts| hosts.iter().filter_map(|h| self.hosts.get(h)).collect())
    }

    /// Hosts matching a target pattern such as `web:&prod:!web3`
    pub fn select(&self, pattern: &str) -> Result<Vec<&ResolvedHost>, ForgeError> {
        select_hosts(self, pattern)
    }
}

/// Parse and resolve inventory files with default options
pub fn parse_inventory_files(files: &[InventoryFile]) -> (Option<Inventory>, Diagnostics) {
    parse_inventory_files_with(files, &ResolveOptions::default())
}

/// Parse and resolve inventory files.
///
/// No inventory is returned when any error was reported, or any warning
/// with `options.strict_warnings`.
pub fn parse_inventory_files_with(
    files: &[InventoryFile],
    options: &ResolveOptions,
) -> (Option<Inventory>, Diagnostics) {
    resolve_with(files, options, &DefaultEvaluator)
}

/// Parse and resolve a single source text
pub fn parse_inventory_str(source: &str, filename: &str) -> (Option<Inventory>, Diagnostics) {
    parse_inventory_files(&[InventoryFile::new(filename, source)])
}

fn resolve_with(
    files: &[InventoryFile],
    options: &ResolveOptions,
    evaluator: &dyn Evaluator,
) -> (Option<Inventory>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut decls = DeclarationSet::new();

    for file in files {
        let body = match parse_source(&file.content, &file.name()) {
            Ok(body) => body,
            Err(diag) => {
                warn!(file = %file.name(), "skipping file with syntax errors");
                diags.push(diag);
                continue;
            }
        };
        let (file_decls, file_diags) = decode::decode_body(&body);
        diags.merge(file_diags);
        diags.merge(decls.merge(file_decls));
    }
    decls.link_memberships();
    debug!(
        files = files.len(),
        hosts = decls.hosts.len(),
        groups = decls.groups.len(),
        "merged declarations"
    );

    let (hierarchy, hierarchy_diags) = hierarchy::build_hierarchy(&decls);
    diags.merge(hierarchy_diags);
    let hierarchy = match hierarchy {
        Some(h) if !diags.has_errors() => h,
        _ => return (None, diags),
    };

    let (host_vars, var_diags) = resolver::resolve_hosts(&decls, &hierarchy, evaluator, options);
    diags.merge(var_diags);

    let (inventory, compile_diags) =
        compiler::compile_inventory(&decls, &hierarchy, host_vars, evaluator);
    diags.merge(compile_diags);

    if diags.has_errors() || (options.strict_warnings && diags.has_warnings()) {
        return (None, diags);
    }

    info!(
        hosts = inventory.hosts.len(),
        groups = inventory.groups.len(),
        "inventory resolved"
    );
    (Some(inventory), diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scenario_webservers() {
        let (inventory, diags) = parse_inventory_str(
            r#"
group "webservers" {
  vars {
    environment = "test"
    domain      = "example.com"
  }
  host "web1" {}
  host "web2" {}
}

host "db1" {}
"#,
            "simple.hcl",
        );
        assert!(diags.is_empty(), "{}", diags);
        let inventory = inventory.unwrap();

        let web1 = inventory.host("web1").unwrap();
        assert_eq!(web1.vars()["environment"], Value::from("test"));
        assert_eq!(web1.transport_kind(), TransportKind::Local);

        let names = |target: &str| -> Vec<String> {
            inventory
                .target(target)
                .unwrap()
                .into_iter()
                .map(|h| h.name.clone())
                .collect()
        };
        assert_eq!(names("webservers"), vec!["web1", "web2"]);
        assert_eq!(names("all"), vec!["db1", "web1", "web2"]);
        assert_eq!(names("db1"), vec!["db1"]);
        assert!(inventory.target("nope").is_none());
    }

    #[test]
    fn test_warnings_keep_inventory_unless_strict() {
        let file = InventoryFile::new("warn.hcl", "colour = \"blue\"\nhost \"h\" {}\n");

        let (inventory, diags) = parse_inventory_files(&[file.clone()]);
        assert!(inventory.is_some());
        assert!(diags.has_warnings());

        let strict = ResolveOptions {
            strict_warnings: true,
            ..ResolveOptions::default()
        };
        let (inventory, _) = parse_inventory_files_with(&[file], &strict);
        assert!(inventory.is_none());
    }

    #[test]
    fn test_syntax_error_is_forwarded() {
        let files = [
            InventoryFile::new("good.hcl", "host \"h\" {}"),
            InventoryFile::new("bad.hcl", "host \"x\" {"),
        ];
        let (inventory, diags) = parse_inventory_files(&files);
        assert!(inventory.is_none());
        assert_eq!(diags.len(), 1);
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Invalid syntax");
        assert_eq!(diag.location.as_ref().unwrap().file, "bad.hcl");
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let source = r#"
vars {
  a = var.b
  b = var.a
}
host "h1" {}
host "h2" {
  vars {
    x = "${var.missing}"
  }
}
"#;
        let files = [InventoryFile::new("agree.hcl", source)];
        let sequential = ResolveOptions {
            parallel: false,
            ..ResolveOptions::default()
        };
        let (_, parallel_diags) = parse_inventory_files(&files);
        let (_, sequential_diags) = parse_inventory_files_with(&files, &sequential);
        assert_eq!(parallel_diags, sequential_diags);
        // the shared cycle is reported once, plus h2's missing reference
        assert_eq!(parallel_diags.len(), 3);
    }

    #[test]
    fn test_integer_extremes_resolve_without_panicking() {
        let (inventory, diags) = parse_inventory_str(
            r#"
host "edge" {
  vars {
    min  = -9223372036854775807 - 1
    quot = var.min / -1
    cut  = substr("abc", 1, 10000000000000000000)
  }
}
"#,
            "edge.hcl",
        );
        assert!(diags.is_empty(), "{}", diags);
        let inventory = inventory.unwrap();
        let vars = inventory.host("edge").unwrap().vars();
        assert_eq!(vars["quot"], Value::Float(9223372036854775808.0));
        assert_eq!(vars["cut"], Value::from("bc"));

        let (inventory, diags) = parse_inventory_str(
            "host \"edge\" {\n  vars {\n    min = -9223372036854775807 - 1\n    rem = var.min % -1\n  }\n}\n",
            "edge.hcl",
        );
        assert!(inventory.is_none());
        assert_eq!(diags.len(), 1);
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Invalid expression");
        assert!(diag.detail.contains("integer overflow"));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let files = [InventoryFile::new(
            "idem.hcl",
            "group \"g\" {\n  host \"h\" {\n    vars {\n      n = 1 + 2\n    }\n  }\n}\n",
        )];
        let first = parse_inventory_files(&files);
        let second = parse_inventory_files(&files);
        assert_eq!(first, second);
    }
}
