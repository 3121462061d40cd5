// Target pattern parsing and host selection over a compiled inventory

use std::collections::BTreeSet;

use regex::Regex;

use super::hierarchy::ALL_GROUP;
use super::{Inventory, ResolvedHost};
use crate::output::errors::ForgeError;

/// One `:`-separated term of a target pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternTerm {
    /// `name`: add the target's hosts
    Union(String),
    /// `&name`: keep only hosts also in the target
    Intersect(String),
    /// `!name`: drop the target's hosts
    Exclude(String),
}

impl PatternTerm {
    fn name(&self) -> &str {
        match self {
            PatternTerm::Union(n) | PatternTerm::Intersect(n) | PatternTerm::Exclude(n) => n,
        }
    }
}

/// Parse a pattern such as `webservers:&production:!web3`.
///
/// An empty pattern selects every host.
pub fn parse_target_pattern(pattern: &str) -> Result<Vec<PatternTerm>, ForgeError> {
    let mut terms = Vec::new();

    for part in pattern.split(':') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let term = if let Some(name) = part.strip_prefix('&') {
            PatternTerm::Intersect(name.trim().to_string())
        } else if let Some(name) = part.strip_prefix('!') {
            PatternTerm::Exclude(name.trim().to_string())
        } else {
            PatternTerm::Union(part.to_string())
        };

        if term.name().is_empty() {
            return Err(ForgeError::InvalidPattern {
                pattern: pattern.to_string(),
                message: format!("'{}' is missing a target name", part),
            });
        }
        terms.push(term);
    }

    if terms.is_empty() {
        terms.push(PatternTerm::Union(ALL_GROUP.to_string()));
    }
    Ok(terms)
}

/// Translate a `*` glob into an anchored regex
fn glob_regex(glob: &str) -> Result<Regex, regex::Error> {
    let body = glob
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body))
}

/// Hosts addressed by one term name: an exact target or a glob over targets
fn expand_term<'a>(
    inventory: &'a Inventory,
    name: &str,
    pattern: &str,
) -> Result<BTreeSet<&'a str>, ForgeError> {
    let invalid = |message: String| ForgeError::InvalidPattern {
        pattern: pattern.to_string(),
        message,
    };

    if !name.contains('*') {
        return inventory
            .targets
            .get(name)
            .map(|hosts| hosts.iter().map(String::as_str).collect())
            .ok_or_else(|| invalid(format!("unknown target '{}'", name)));
    }

    let re = glob_regex(name).map_err(|e| invalid(e.to_string()))?;
    let mut matched = false;
    let mut hosts = BTreeSet::new();
    for (target, members) in &inventory.targets {
        if re.is_match(target) {
            matched = true;
            hosts.extend(members.iter().map(String::as_str));
        }
    }
    if !matched {
        return Err(invalid(format!("no target matches '{}'", name)));
    }
    Ok(hosts)
}

/// Select hosts for a target pattern, ordered by host name.
///
/// A pattern starting with `&` or `!` applies to every host.
pub fn select_hosts<'a>(
    inventory: &'a Inventory,
    pattern: &str,
) -> Result<Vec<&'a ResolvedHost>, ForgeError> {
    let terms = parse_target_pattern(pattern)?;

    let mut selected: BTreeSet<&str> = match terms.first() {
        Some(PatternTerm::Union(_)) => BTreeSet::new(),
        _ => inventory.hosts.keys().map(String::as_str).collect(),
    };

    for term in &terms {
        let hosts = expand_term(inventory, term.name(), pattern)?;
        match term {
            PatternTerm::Union(_) => selected.extend(hosts),
            PatternTerm::Intersect(_) => selected.retain(|h| hosts.contains(h)),
            PatternTerm::Exclude(_) => selected.retain(|h| !hosts.contains(h)),
        }
    }

    Ok(selected
        .into_iter()
        .filter_map(|name| inventory.hosts.get(name))
        .collect())
}
