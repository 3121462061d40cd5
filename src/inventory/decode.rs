// Maps parsed file bodies onto declarations

use indexmap::IndexMap;
use tracing::trace;

use super::declarations::{
    DeclarationSet, EscalateDecl, GroupDecl, HostDecl, ScopeBody, ScopeRef, TransportDecl,
    TransportKind, VarExpr,
};
use crate::diagnostics::{Diagnostic, Diagnostics, SourceLocation};
use crate::parser::ast::{Attribute, Block, Body, Value};
use crate::runtime::{evaluate_expression, Scope};

const IN_FILE: &str = "in an inventory file";
const IN_GROUP: &str = "in a group block";
const IN_HOST: &str = "in a host block";
const IN_VARS: &str = "in a vars block";
const IN_ESCALATE: &str = "in an escalate block";

/// Decode one file's top-level body
pub fn decode_body(body: &Body) -> (DeclarationSet, Diagnostics) {
    let mut decoder = Decoder::default();
    let mut set = DeclarationSet::new();

    for attr in &body.attributes {
        decoder.unsupported_argument(attr, IN_FILE);
    }

    for block in &body.blocks {
        match block.kind.as_str() {
            "vars" | "transport" | "escalate" => {
                decoder.scope_block(block, &ScopeRef::Global, &mut set.global, IN_FILE)
            }
            "group" => decoder.group(block, &mut set),
            "host" => {
                if let Some(host) = decoder.host(block) {
                    set.add_host(host, &mut decoder.diags);
                }
            }
            _ => decoder.unsupported_block(block, IN_FILE),
        }
    }

    trace!(
        groups = set.groups.len(),
        hosts = set.hosts.len(),
        "decoded inventory body"
    );
    (set, decoder.diags)
}

#[derive(Default)]
struct Decoder {
    diags: Diagnostics,
}

impl Decoder {
    fn error(&mut self, summary: &str, detail: String, location: &SourceLocation) {
        self.diags
            .push(Diagnostic::error(summary, detail).at(location));
    }

    fn unsupported_argument(&mut self, attr: &Attribute, context: &str) {
        self.diags.push(
            Diagnostic::warning(
                "Unsupported argument",
                format!(
                    "An argument named \"{}\" is not expected {}.",
                    attr.name, context
                ),
            )
            .at(&attr.location),
        );
    }

    fn unsupported_block(&mut self, block: &Block, context: &str) {
        self.diags.push(
            Diagnostic::warning(
                "Unsupported block type",
                format!(
                    "Blocks of type \"{}\" are not expected {}.",
                    block.kind, context
                ),
            )
            .at(&block.location),
        );
    }

    /// The single name label of a group or host block
    fn name_label(&mut self, block: &Block) -> Option<String> {
        match block.labels.as_slice() {
            [name] => Some(name.clone()),
            _ => {
                self.error(
                    "Missing name label",
                    format!("A {} block requires exactly one name label.", block.kind),
                    &block.location,
                );
                None
            }
        }
    }

    fn no_labels(&mut self, block: &Block) -> bool {
        if block.labels.is_empty() {
            return true;
        }
        self.error(
            "Extraneous label",
            format!("A {} block does not take labels.", block.kind),
            &block.location,
        );
        false
    }

    /// Attributes of a body, reporting repeats
    fn unique_attributes<'b>(&mut self, body: &'b Body) -> IndexMap<&'b str, &'b Attribute> {
        let mut seen: IndexMap<&str, &Attribute> = IndexMap::new();
        for attr in &body.attributes {
            if let Some(first) = seen.get(attr.name.as_str()) {
                let detail = format!(
                    "The argument \"{}\" was already set at {}.",
                    attr.name, first.location
                );
                self.error("Duplicate argument", detail, &attr.location);
                continue;
            }
            seen.insert(&attr.name, attr);
        }
        seen
    }

    /// Constant list of strings (`hosts`, `parents`, `groups`)
    fn string_list(&mut self, attr: &Attribute, summary: &str) -> Option<Vec<String>> {
        let detail = format!("The {} attribute must be a list of strings.", attr.name);
        match evaluate_expression(&attr.expr, &Scope::new()) {
            Ok(Value::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(s),
                        _ => {
                            self.error(summary, detail, &attr.location);
                            return None;
                        }
                    }
                }
                Some(out)
            }
            _ => {
                self.error(summary, detail, &attr.location);
                None
            }
        }
    }

    /// vars, transport and escalate blocks shared by every scope
    fn scope_block(&mut self, block: &Block, scope: &ScopeRef, into: &mut ScopeBody, context: &str) {
        match block.kind.as_str() {
            "vars" => {
                if !self.no_labels(block) {
                    return;
                }
                for inner in &block.body.blocks {
                    self.unsupported_block(inner, IN_VARS);
                }
                for attr in &block.body.attributes {
                    let var = VarExpr {
                        name: attr.name.clone(),
                        expr: attr.expr.clone(),
                        scope: scope.clone(),
                        location: attr.location.clone(),
                    };
                    into.add_var(var, &mut self.diags);
                }
            }
            "transport" => {
                if let Some(transport) = self.transport(block) {
                    into.add_transport(transport, &mut self.diags);
                }
            }
            "escalate" => {
                if let Some(escalate) = self.escalate(block) {
                    into.add_escalate(escalate, &mut self.diags);
                }
            }
            _ => self.unsupported_block(block, context),
        }
    }

    fn transport(&mut self, block: &Block) -> Option<TransportDecl> {
        let label = match block.labels.as_slice() {
            [label] => label,
            _ => {
                self.error(
                    "Missing transport type",
                    "A transport block requires exactly one label naming its type.".to_string(),
                    &block.location,
                );
                return None;
            }
        };

        let Some(kind) = TransportKind::parse(label) else {
            let allowed = TransportKind::ALL
                .iter()
                .map(|k| format!("\"{}\"", k))
                .collect::<Vec<_>>()
                .join(", ");
            self.error(
                "Invalid transport type",
                format!(
                    "The transport type \"{}\" is not supported. Allowed types are: {}",
                    label, allowed
                ),
                &block.location,
            );
            return None;
        };

        let context = format!("in a transport \"{}\" block", kind);
        for inner in &block.body.blocks {
            self.unsupported_block(inner, &context);
        }

        let mut attributes = IndexMap::new();
        for (name, attr) in self.unique_attributes(&block.body) {
            if kind.attributes().contains(&name) {
                attributes.insert(name.to_string(), attr.clone());
            } else {
                self.unsupported_argument(attr, &context);
            }
        }

        Some(TransportDecl {
            kind,
            attributes,
            location: block.location.clone(),
        })
    }

    fn escalate(&mut self, block: &Block) -> Option<EscalateDecl> {
        if !self.no_labels(block) {
            return None;
        }
        for inner in &block.body.blocks {
            self.unsupported_block(inner, IN_ESCALATE);
        }

        let mut password = None;
        for (name, attr) in self.unique_attributes(&block.body) {
            match name {
                "password" => password = Some(attr.clone()),
                _ => self.unsupported_argument(attr, IN_ESCALATE),
            }
        }

        Some(EscalateDecl {
            password,
            location: block.location.clone(),
        })
    }

    fn group(&mut self, block: &Block, set: &mut DeclarationSet) {
        let Some(name) = self.name_label(block) else {
            return;
        };
        let scope = ScopeRef::Group(name.clone());
        let mut group = GroupDecl::new(name.clone(), block.location.clone());

        let attributes = self.unique_attributes(&block.body);
        if attributes.contains_key("parent") && attributes.contains_key("parents") {
            self.error(
                "Duplicate parent attribute",
                format!(
                    "The group '{}' sets both 'parent' and 'parents'; use only one of them.",
                    name
                ),
                &block.location,
            );
        }

        for (attr_name, attr) in attributes {
            match attr_name {
                "parent" => match evaluate_expression(&attr.expr, &Scope::new()) {
                    Ok(Value::String(parent)) => group.add_parent(&parent),
                    _ => self.error(
                        "Invalid parent attribute type",
                        "The parent attribute must be a string.".to_string(),
                        &attr.location,
                    ),
                },
                "parents" => {
                    for parent in self
                        .string_list(attr, "Invalid parent attribute type")
                        .unwrap_or_default()
                    {
                        group.add_parent(&parent);
                    }
                }
                "hosts" => {
                    for host in self
                        .string_list(attr, "Invalid hosts attribute type")
                        .unwrap_or_default()
                    {
                        if host.is_empty() {
                            self.error(
                                "Empty host reference",
                                format!("A host reference in group '{}' cannot be empty.", name),
                                &attr.location,
                            );
                            continue;
                        }
                        group.add_host(&host);
                    }
                }
                _ => self.unsupported_argument(attr, IN_GROUP),
            }
        }

        let mut nested = Vec::new();
        for inner in &block.body.blocks {
            match inner.kind.as_str() {
                "host" => {
                    if let Some(host) = self.host(inner) {
                        group.add_host(&host.name);
                        nested.push(host);
                    }
                }
                _ => self.scope_block(inner, &scope, &mut group.scope, IN_GROUP),
            }
        }

        set.add_group(group, &mut self.diags);
        for host in nested {
            set.add_host(host, &mut self.diags);
        }
    }

    fn host(&mut self, block: &Block) -> Option<HostDecl> {
        let name = self.name_label(block)?;
        let scope = ScopeRef::Host(name.clone());
        let mut host = HostDecl::new(name, block.location.clone());

        for (attr_name, attr) in self.unique_attributes(&block.body) {
            match attr_name {
                "groups" => {
                    host.groups = self
                        .string_list(attr, "Invalid groups attribute type")
                        .unwrap_or_default();
                }
                _ => self.unsupported_argument(attr, IN_HOST),
            }
        }

        for inner in &block.body.blocks {
            self.scope_block(inner, &scope, &mut host.scope, IN_HOST);
        }

        Some(host)
    }
}
