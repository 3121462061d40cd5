// Variable resolver - merges scope chains and evaluates variables in dependency order

use std::collections::BTreeMap;

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, debug_span, trace};

use super::declarations::{DeclarationSet, ScopeBody, VarExpr};
use super::graph::DependencyGraph;
use super::hierarchy::Hierarchy;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::runtime::{EvalError, Evaluator, Scope};

/// Knobs for a resolution run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Resolve hosts on the rayon pool
    pub parallel: bool,
    /// Treat warnings as fatal in the facade
    pub strict_warnings: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            parallel: true,
            strict_warnings: false,
        }
    }
}

/// Scopes applying to one host or group, least specific first:
/// the global scope, then groups root-to-leaf, then the host itself.
#[derive(Debug, Clone)]
pub struct ScopeChain<'a> {
    scopes: Vec<&'a ScopeBody>,
}

impl<'a> ScopeChain<'a> {
    pub fn for_host(decls: &'a DeclarationSet, hierarchy: &Hierarchy, host: &str) -> Self {
        let mut scopes = vec![&decls.global];
        scopes.extend(
            hierarchy
                .host_chain(host)
                .into_iter()
                .filter_map(|g| decls.groups.get(g))
                .map(|g| &g.scope),
        );
        if let Some(decl) = decls.hosts.get(host) {
            scopes.push(&decl.scope);
        }
        ScopeChain { scopes }
    }

    pub fn for_group(decls: &'a DeclarationSet, hierarchy: &Hierarchy, group: &str) -> Self {
        let mut scopes = vec![&decls.global];
        scopes.extend(
            hierarchy
                .chain(group)
                .into_iter()
                .filter_map(|g| decls.groups.get(g))
                .map(|g| &g.scope),
        );
        ScopeChain { scopes }
    }

    /// Most specific scope first
    pub fn most_specific_first(&self) -> impl Iterator<Item = &'a ScopeBody> + '_ {
        self.scopes.iter().rev().copied()
    }

    /// Flatten the chain's variables. A more specific definition replaces
    /// the value of an earlier one but keeps the earlier key position.
    pub fn merged_vars(&self) -> IndexMap<&'a str, &'a VarExpr> {
        let mut merged = IndexMap::new();
        for scope in &self.scopes {
            for (name, var) in &scope.raw_vars {
                merged.insert(name.as_str(), var);
            }
        }
        merged
    }
}

enum Failure {
    /// On a cycle, or depending on a missing or failed variable
    Unresolvable,
    Invalid(EvalError),
}

/// Evaluate merged variables in dependency order.
///
/// Returns every value that could be computed; failures are reported in
/// the order the dependency walk first reached them.
pub fn resolve_vars(
    merged: &IndexMap<&str, &VarExpr>,
    evaluator: &dyn Evaluator,
) -> (Scope, Diagnostics) {
    let vars: Vec<&VarExpr> = merged.values().copied().collect();
    let mut graph = DependencyGraph::new(vars.len());
    let mut missing = vec![false; vars.len()];

    for (id, var) in vars.iter().enumerate() {
        for name in evaluator.references(&var.expr) {
            match merged.get_index_of(name.as_str()) {
                Some(dep) => graph.add_edge(id, dep),
                None => {
                    trace!(variable = %var.name, missing = %name, "reference to undefined variable");
                    missing[id] = true;
                }
            }
        }
    }

    let traversal = graph.traverse();
    let mut failures: Vec<Option<Failure>> = (0..vars.len()).map(|_| None).collect();
    let mut scope = Scope::new();

    // Dependencies finish first, so they are settled before their dependents
    for &id in &traversal.finish {
        let blocked = traversal.on_cycle[id]
            || missing[id]
            || graph.dependencies(id).iter().any(|&d| failures[d].is_some());
        if blocked {
            failures[id] = Some(Failure::Unresolvable);
            continue;
        }
        match evaluator.evaluate(&vars[id].expr, &scope) {
            Ok(value) => {
                scope.insert(vars[id].name.clone(), value);
            }
            Err(err) => failures[id] = Some(Failure::Invalid(err)),
        }
    }

    let mut diags = Diagnostics::new();
    for id in traversal.discovery {
        let var = vars[id];
        let diag = match &failures[id] {
            None => continue,
            Some(Failure::Unresolvable) => Diagnostic::error(
                "Unresolvable variable",
                format!(
                    "The variable '{}' could not be resolved due to missing or circular dependencies.",
                    var.name
                ),
            ),
            Some(Failure::Invalid(err)) => Diagnostic::error(
                "Invalid expression",
                format!("Failed to evaluate variable '{}': {}", var.name, err),
            ),
        };
        diags.push(diag.at(&var.location));
    }
    (scope, diags)
}

/// Resolve the variables of every host.
///
/// Hosts are independent, so with `options.parallel` they are resolved on
/// the rayon pool. Diagnostics are merged by host name, and a problem in a
/// shared scope is reported once even when several hosts hit it.
pub fn resolve_hosts(
    decls: &DeclarationSet,
    hierarchy: &Hierarchy,
    evaluator: &dyn Evaluator,
    options: &ResolveOptions,
) -> (BTreeMap<String, Scope>, Diagnostics) {
    let mut names: Vec<&str> = decls.hosts.keys().map(String::as_str).collect();
    names.sort_unstable();

    let resolve_one = |name: &&str| {
        let _span = debug_span!("resolve_host", host = %name).entered();
        let chain = ScopeChain::for_host(decls, hierarchy, name);
        let (vars, diags) = resolve_vars(&chain.merged_vars(), evaluator);
        debug!(vars = vars.len(), errors = diags.errors().count(), "resolved host variables");
        (name.to_string(), vars, diags)
    };

    let results: Vec<(String, Scope, Diagnostics)> = if options.parallel {
        names.par_iter().map(resolve_one).collect()
    } else {
        names.iter().map(resolve_one).collect()
    };

    let mut hosts = BTreeMap::new();
    let mut diags = Diagnostics::new();
    for (name, vars, host_diags) in results {
        diags.merge_unique(host_diags);
        hosts.insert(name, vars);
    }
    (hosts, diags)
}
