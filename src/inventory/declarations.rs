// Declaration model - raw, unevaluated hosts, groups and variables

use std::fmt;

use indexmap::IndexMap;

use crate::diagnostics::{Diagnostic, Diagnostics, SourceLocation};
use crate::parser::ast::{Attribute, Expression};

/// Scope a variable or setting was declared in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeRef {
    Global,
    Group(String),
    Host(String),
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeRef::Global => write!(f, "the inventory"),
            ScopeRef::Group(name) => write!(f, "group '{}'", name),
            ScopeRef::Host(name) => write!(f, "host '{}'", name),
        }
    }
}

/// An unevaluated variable definition
#[derive(Debug, Clone, PartialEq)]
pub struct VarExpr {
    pub name: String,
    pub expr: Expression,
    pub scope: ScopeRef,
    pub location: SourceLocation,
}

/// Variables of one scope, in declaration order
pub type RawVars = IndexMap<String, VarExpr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Local,
    Ssh,
}

impl TransportKind {
    pub const ALL: [TransportKind; 2] = [TransportKind::Local, TransportKind::Ssh];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(TransportKind::Local),
            "ssh" => Some(TransportKind::Ssh),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Local => "local",
            TransportKind::Ssh => "ssh",
        }
    }

    /// Attributes accepted inside a transport block of this kind
    pub fn attributes(&self) -> &'static [&'static str] {
        match self {
            TransportKind::Local => &[],
            TransportKind::Ssh => &[
                "host",
                "port",
                "user",
                "password",
                "private_key_path",
                "private_key_pass",
                "use_known_hosts",
                "known_hosts_path",
                "add_unknown_hosts",
                "connection_timeout",
            ],
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A `transport "<kind>" { ... }` block (or several merged)
#[derive(Debug, Clone, PartialEq)]
pub struct TransportDecl {
    pub kind: TransportKind,
    pub attributes: IndexMap<String, Attribute>,
    pub location: SourceLocation,
}

/// An `escalate { ... }` block (or several merged)
#[derive(Debug, Clone, PartialEq)]
pub struct EscalateDecl {
    pub password: Option<Attribute>,
    pub location: SourceLocation,
}

/// Settings every scope can carry: variables, transport and escalation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeBody {
    pub raw_vars: RawVars,
    pub transport: Option<TransportDecl>,
    pub escalate: Option<EscalateDecl>,
}

impl ScopeBody {
    /// Add a variable, rejecting a second definition in the same scope
    pub fn add_var(&mut self, var: VarExpr, diags: &mut Diagnostics) {
        if self.raw_vars.contains_key(&var.name) {
            diags.push(
                Diagnostic::error(
                    "Duplicate variable name",
                    format!(
                        "Variable '{}' is defined multiple times in the vars block. \
                         Each variable must have a unique name.",
                        var.name
                    ),
                )
                .at(&var.location),
            );
            return;
        }
        self.raw_vars.insert(var.name.clone(), var);
    }

    pub fn add_transport(&mut self, transport: TransportDecl, diags: &mut Diagnostics) {
        let existing = match &mut self.transport {
            None => {
                self.transport = Some(transport);
                return;
            }
            Some(existing) => existing,
        };

        if existing.kind != transport.kind {
            diags.push(
                Diagnostic::error(
                    "Multiple transport blocks with different types",
                    format!(
                        "Found multiple 'transport' blocks with different types: '{}' and '{}'. \
                         Only one transport type is allowed.",
                        existing.kind, transport.kind
                    ),
                )
                .at(&transport.location),
            );
            return;
        }

        for (name, attr) in transport.attributes {
            if existing.attributes.contains_key(&name) {
                diags.push(
                    Diagnostic::error(
                        "Duplicate transport configuration",
                        format!(
                            "The attribute '{}' is defined multiple times in the 'transport' block. \
                             Each attribute must have a unique name.",
                            name
                        ),
                    )
                    .at(&attr.location),
                );
                continue;
            }
            existing.attributes.insert(name, attr);
        }
    }

    pub fn add_escalate(&mut self, escalate: EscalateDecl, diags: &mut Diagnostics) {
        let existing = match &mut self.escalate {
            None => {
                self.escalate = Some(escalate);
                return;
            }
            Some(existing) => existing,
        };

        let Some(password) = escalate.password else {
            return;
        };
        if existing.password.is_some() {
            diags.push(
                Diagnostic::error(
                    "Duplicate escalate configuration",
                    "The attribute 'password' is defined multiple times in the 'escalate' block.",
                )
                .at(&password.location),
            );
        } else {
            existing.password = Some(password);
        }
    }

    /// Fold another body for the same scope into this one
    pub fn absorb(&mut self, other: ScopeBody, diags: &mut Diagnostics) {
        for (_, var) in other.raw_vars {
            self.add_var(var, diags);
        }
        if let Some(transport) = other.transport {
            self.add_transport(transport, diags);
        }
        if let Some(escalate) = other.escalate {
            self.add_escalate(escalate, diags);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostDecl {
    pub name: String,
    pub scope: ScopeBody,
    /// Groups named by the host's own `groups` attribute
    pub groups: Vec<String>,
    pub location: SourceLocation,
}

impl HostDecl {
    pub fn new(name: impl Into<String>, location: SourceLocation) -> Self {
        HostDecl {
            name: name.into(),
            scope: ScopeBody::default(),
            groups: Vec::new(),
            location,
        }
    }

    pub fn raw_vars(&self) -> &RawVars {
        &self.scope.raw_vars
    }

    /// Transport kind declared directly on the host, if any
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.scope.transport.as_ref().map(|t| t.kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupDecl {
    pub name: String,
    pub parents: Vec<String>,
    pub direct_hosts: Vec<String>,
    pub scope: ScopeBody,
    pub location: SourceLocation,
}

impl GroupDecl {
    pub fn new(name: impl Into<String>, location: SourceLocation) -> Self {
        GroupDecl {
            name: name.into(),
            parents: Vec::new(),
            direct_hosts: Vec::new(),
            scope: ScopeBody::default(),
            location,
        }
    }

    pub fn raw_vars(&self) -> &RawVars {
        &self.scope.raw_vars
    }

    pub fn add_parent(&mut self, parent: &str) {
        if !self.parents.iter().any(|p| p == parent) {
            self.parents.push(parent.to_string());
        }
    }

    pub fn add_host(&mut self, host: &str) {
        if !self.direct_hosts.iter().any(|h| h == host) {
            self.direct_hosts.push(host.to_string());
        }
    }
}

/// Every declaration read from one or more files, keyed by name in
/// declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarationSet {
    pub global: ScopeBody,
    pub hosts: IndexMap<String, HostDecl>,
    pub groups: IndexMap<String, GroupDecl>,
}

impl DeclarationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, group: GroupDecl, diags: &mut Diagnostics) {
        match self.groups.get_mut(&group.name) {
            Some(existing) => {
                for parent in &group.parents {
                    existing.add_parent(parent);
                }
                for host in &group.direct_hosts {
                    existing.add_host(host);
                }
                existing.scope.absorb(group.scope, diags);
            }
            None => {
                self.groups.insert(group.name.clone(), group);
            }
        }
    }

    pub fn add_host(&mut self, host: HostDecl, diags: &mut Diagnostics) {
        if self.hosts.contains_key(&host.name) {
            diags.push(
                Diagnostic::error(
                    "Duplicate host name",
                    format!(
                        "Host '{}' is defined multiple times in the inventory file. \
                         Each host must have a unique name.",
                        host.name
                    ),
                )
                .at(&host.location),
            );
            return;
        }
        self.hosts.insert(host.name.clone(), host);
    }

    /// Merge another file's declarations. Groups accumulate parents, hosts
    /// and settings; hosts must be unique.
    pub fn merge(&mut self, other: DeclarationSet) -> Diagnostics {
        let mut diags = Diagnostics::new();
        self.global.absorb(other.global, &mut diags);
        for (_, group) in other.groups {
            self.add_group(group, &mut diags);
        }
        for (_, host) in other.hosts {
            self.add_host(host, &mut diags);
        }
        diags
    }

    /// Apply host-side `groups` memberships. Groups that are only named by
    /// hosts are declared implicitly at the host's location.
    pub fn link_memberships(&mut self) {
        let memberships: Vec<(String, String, SourceLocation)> = self
            .hosts
            .values()
            .flat_map(|h| {
                h.groups
                    .iter()
                    .map(move |g| (h.name.clone(), g.clone(), h.location.clone()))
            })
            .collect();

        for (host, group, location) in memberships {
            self.groups
                .entry(group.clone())
                .or_insert_with(|| GroupDecl::new(group, location))
                .add_host(&host);
        }
    }
}
