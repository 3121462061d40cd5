// Target compiler - assembles the immutable inventory from resolved pieces

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::declarations::DeclarationSet;
use super::hierarchy::{Hierarchy, ALL_GROUP};
use super::resolver::{resolve_vars, ScopeChain};
use super::transport::{resolve_escalate, resolve_transport, Transport};
use super::{Inventory, ResolvedGroup, ResolvedHost};
use crate::diagnostics::Diagnostics;
use crate::runtime::{Evaluator, Scope};

/// Build resolved hosts, groups and the target index.
///
/// `host_vars` holds the variables produced by the resolver for every
/// declared host. Transport and escalation are evaluated here, against
/// those variables.
pub fn compile_inventory(
    decls: &DeclarationSet,
    hierarchy: &Hierarchy,
    mut host_vars: BTreeMap<String, Scope>,
    evaluator: &dyn Evaluator,
) -> (Inventory, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut hosts = BTreeMap::new();

    for name in decls.hosts.keys() {
        let vars = host_vars.remove(name).unwrap_or_default();
        let chain = ScopeChain::for_host(decls, hierarchy, name);

        let (transport, transport_diags) = resolve_transport(&chain, &vars, evaluator);
        let (escalate, escalate_diags) = resolve_escalate(&chain, &vars, evaluator);
        diags.merge_unique(transport_diags);
        diags.merge_unique(escalate_diags);

        let host = ResolvedHost {
            name: name.clone(),
            transport: transport.unwrap_or(Transport::Local),
            escalate,
            groups: hierarchy
                .host_chain(name)
                .into_iter()
                .map(str::to_string)
                .collect(),
            vars,
        };
        hosts.insert(name.clone(), host);
    }

    let mut groups = BTreeMap::new();
    for name in hierarchy.groups() {
        let mut members: BTreeSet<String> = BTreeSet::new();
        for group in std::iter::once(name).chain(hierarchy.descendants(name)) {
            if let Some(decl) = decls.groups.get(group) {
                members.extend(decl.direct_hosts.iter().cloned());
            }
        }

        // Group vars are informational: anything that needs host-level
        // values is left out instead of failing the build
        let chain = ScopeChain::for_group(decls, hierarchy, name);
        let (vars, skipped) = resolve_vars(&chain.merged_vars(), evaluator);
        if !skipped.is_empty() {
            trace!(group = name, skipped = skipped.len(), "group variables left unresolved");
        }

        let parents = decls
            .groups
            .get(name)
            .map(|g| g.parents.clone())
            .unwrap_or_default();

        groups.insert(
            name.to_string(),
            ResolvedGroup {
                name: name.to_string(),
                parents,
                hosts: members,
                vars,
            },
        );
    }

    let mut targets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    targets.insert(ALL_GROUP.to_string(), hosts.keys().cloned().collect());
    for group in groups.values() {
        targets.insert(group.name.clone(), group.hosts.clone());
    }
    for name in hosts.keys() {
        targets.insert(name.clone(), BTreeSet::from([name.clone()]));
    }

    debug!(
        hosts = hosts.len(),
        groups = groups.len(),
        targets = targets.len(),
        "compiled inventory"
    );

    let inventory = Inventory {
        hosts,
        groups,
        targets,
    };
    (inventory, diags)
}
