// Hierarchy builder - validates group structure and orders ancestor chains

use std::collections::HashMap;

use tracing::debug;

use super::declarations::DeclarationSet;
use super::graph::DependencyGraph;
use crate::diagnostics::{Diagnostic, Diagnostics};

/// Name of the synthetic group/target containing every host
pub const ALL_GROUP: &str = "all";

/// Validated group hierarchy.
///
/// Groups are indexed in declaration order. Each group's chain starts at
/// its outermost ancestor and ends with the group itself; the implicit
/// global scope precedes every chain and is not stored.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    names: Vec<String>,
    index: HashMap<String, usize>,
    chains: Vec<Vec<usize>>,
    descendants: Vec<Vec<usize>>,
    host_groups: HashMap<String, Vec<usize>>,
}

impl Hierarchy {
    /// Group names in declaration order
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    fn names_of(&self, ids: &[usize]) -> Vec<&str> {
        ids.iter().map(|&i| self.names[i].as_str()).collect()
    }

    /// Ancestor chain of a group, root-to-leaf, ending with the group
    pub fn chain(&self, group: &str) -> Vec<&str> {
        self.index
            .get(group)
            .map(|&i| self.names_of(&self.chains[i]))
            .unwrap_or_default()
    }

    /// Every group that has `group` as a (transitive) ancestor
    pub fn descendants(&self, group: &str) -> Vec<&str> {
        self.index
            .get(group)
            .map(|&i| self.names_of(&self.descendants[i]))
            .unwrap_or_default()
    }

    /// Groups listing the host directly, in declaration order
    pub fn direct_groups(&self, host: &str) -> Vec<&str> {
        self.host_groups
            .get(host)
            .map(|ids| self.names_of(ids))
            .unwrap_or_default()
    }

    /// Group part of a host's scope chain: the chains of its direct groups
    /// concatenated in group declaration order, keeping the first position
    /// of any shared ancestor.
    pub fn host_chain(&self, host: &str) -> Vec<&str> {
        let mut seen = vec![false; self.names.len()];
        let mut out = Vec::new();
        for &group in self.host_groups.get(host).map(Vec::as_slice).unwrap_or(&[]) {
            for &id in &self.chains[group] {
                if !seen[id] {
                    seen[id] = true;
                    out.push(self.names[id].as_str());
                }
            }
        }
        out
    }
}

/// Check names, parent references, host references and inheritance
/// cycles, then compute ancestor chains. No hierarchy is returned when
/// any error was found.
pub fn build_hierarchy(decls: &DeclarationSet) -> (Option<Hierarchy>, Diagnostics) {
    let mut diags = Diagnostics::new();

    validate_names(decls, &mut diags);
    validate_host_references(decls, &mut diags);

    let names: Vec<String> = decls.groups.keys().cloned().collect();
    let index: HashMap<String, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), i))
        .collect();

    // group -> parent
    let mut graph = DependencyGraph::new(names.len());
    for (id, group) in decls.groups.values().enumerate() {
        for parent in &group.parents {
            if parent.is_empty() || parent == ALL_GROUP {
                continue;
            }
            match index.get(parent) {
                Some(&parent_id) => graph.add_edge(id, parent_id),
                None => diags.push(
                    Diagnostic::error(
                        "Invalid parent group",
                        format!("The parent group '{}' does not exist.", parent),
                    )
                    .at(&group.location),
                ),
            }
        }
    }

    let traversal = graph.traverse();
    for id in traversal.cyclic_nodes() {
        let group = &decls.groups[id];
        diags.push(
            Diagnostic::error(
                "Circular group reference",
                format!("The group '{}' has a circular reference.", group.name),
            )
            .at(&group.location),
        );
    }

    if diags.has_errors() {
        return (None, diags);
    }

    // Parents finish before their children
    let mut chains: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    for &id in &traversal.finish {
        let mut chain = Vec::new();
        for &parent in graph.dependencies(id) {
            for &ancestor in &chains[parent] {
                if !chain.contains(&ancestor) {
                    chain.push(ancestor);
                }
            }
        }
        chain.push(id);
        chains[id] = chain;
    }

    let mut descendants: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    for (id, chain) in chains.iter().enumerate() {
        for &ancestor in chain.iter().filter(|&&a| a != id) {
            descendants[ancestor].push(id);
        }
    }

    let mut host_groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (id, group) in decls.groups.values().enumerate() {
        for host in &group.direct_hosts {
            let groups = host_groups.entry(host.clone()).or_default();
            if !groups.contains(&id) {
                groups.push(id);
            }
        }
    }

    debug!(groups = names.len(), "validated group hierarchy");

    let hierarchy = Hierarchy {
        names,
        index,
        chains,
        descendants,
        host_groups,
    };
    (Some(hierarchy), diags)
}

fn validate_names(decls: &DeclarationSet, diags: &mut Diagnostics) {
    for group in decls.groups.values() {
        let detail = if group.name == ALL_GROUP {
            format!("The group name '{}' is reserved and cannot be used.", ALL_GROUP)
        } else if group.name.is_empty() {
            "The group name cannot be empty.".to_string()
        } else {
            continue;
        };
        diags.push(Diagnostic::error("Invalid group name", detail).at(&group.location));
    }

    for host in decls.hosts.values() {
        let detail = if host.name == ALL_GROUP {
            format!("The host name '{}' is reserved and cannot be used.", ALL_GROUP)
        } else if host.name.is_empty() {
            "The host name cannot be empty.".to_string()
        } else {
            continue;
        };
        diags.push(Diagnostic::error("Invalid host name", detail).at(&host.location));
    }

    // Hosts and groups share one namespace
    for group in decls.groups.values() {
        if let Some(host) = decls.hosts.get(&group.name) {
            diags.push(
                Diagnostic::error(
                    "Name conflict",
                    format!(
                        "The group name \"{}\" conflicts with a host name.",
                        group.name
                    ),
                )
                .at(&group.location),
            );
            diags.push(
                Diagnostic::error(
                    "Name conflict",
                    format!(
                        "The group name \"{}\" conflicts with a host name defined at \"{}\".",
                        group.name, host.location
                    ),
                )
                .at(&host.location),
            );
        }
    }
}

fn validate_host_references(decls: &DeclarationSet, diags: &mut Diagnostics) {
    for group in decls.groups.values() {
        for host in &group.direct_hosts {
            if !decls.hosts.contains_key(host) {
                diags.push(
                    Diagnostic::error(
                        "Invalid host reference",
                        format!(
                            "The host '{}' referenced in group '{}' does not exist.",
                            host, group.name
                        ),
                    )
                    .at(&group.location),
                );
            }
        }
    }
}
