// Transport and escalation settings resolved per host

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use super::declarations::TransportKind;
use super::resolver::ScopeChain;
use crate::diagnostics::{Diagnostic, Diagnostics, SourceLocation};
use crate::parser::ast::{Attribute, Value};
use crate::runtime::{Evaluator, Scope};

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// A credential that never shows up in logs or printed inventories
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_pass: Option<Secret>,
    pub use_known_hosts: bool,
    /// `None` means the user's default known_hosts file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_hosts_path: Option<String>,
    pub add_unknown_hosts: bool,
    #[serde(serialize_with = "serialize_secs")]
    pub connection_timeout: Duration,
}

impl SshConfig {
    /// user@host:port
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

/// How commands reach a host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    Local,
    Ssh(SshConfig),
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Local => TransportKind::Local,
            Transport::Ssh(_) => TransportKind::Ssh,
        }
    }
}

/// Privilege escalation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Escalate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
}

/// Evaluates transport attributes against a host's resolved variables
struct AttributeReader<'a> {
    attributes: IndexMap<&'a str, &'a Attribute>,
    vars: &'a Scope,
    evaluator: &'a dyn Evaluator,
    diags: Diagnostics,
}

impl<'a> AttributeReader<'a> {
    fn invalid(&mut self, attr: &Attribute, detail: String) {
        self.diags.push(
            Diagnostic::error("Invalid transport attribute", detail).at(&attr.location),
        );
    }

    fn value(&mut self, name: &str) -> Option<(&'a Attribute, Value)> {
        let attr = *self.attributes.get(name)?;
        match self.evaluator.evaluate(&attr.expr, self.vars) {
            Ok(value) => Some((attr, value)),
            Err(err) => {
                self.invalid(attr, format!("Failed to evaluate '{}': {}", name, err));
                None
            }
        }
    }

    fn wrong_type(&mut self, attr: &Attribute, expected: &str, got: &Value) {
        self.invalid(
            attr,
            format!(
                "The value for '{}' must be a {}, got {}.",
                attr.name,
                expected,
                got.type_name()
            ),
        );
    }

    fn string(&mut self, name: &str) -> Option<String> {
        let (attr, value) = self.value(name)?;
        match value {
            Value::String(s) => Some(s),
            other => {
                self.wrong_type(attr, "string", &other);
                None
            }
        }
    }

    fn bool(&mut self, name: &str) -> Option<bool> {
        let (attr, value) = self.value(name)?;
        match value {
            Value::Bool(b) => Some(b),
            other => {
                self.wrong_type(attr, "bool", &other);
                None
            }
        }
    }

    fn port(&mut self, name: &str) -> Option<u16> {
        let (attr, value) = self.value(name)?;
        let port = match &value {
            Value::Int(i) => u16::try_from(*i).ok().filter(|p| *p != 0),
            Value::String(s) => s.trim().parse::<u16>().ok().filter(|p| *p != 0),
            other => {
                self.wrong_type(attr, "number", other);
                return None;
            }
        };
        if port.is_none() {
            self.invalid(
                attr,
                format!("The value for '{}' must be a port between 1 and 65535.", name),
            );
        }
        port
    }

    fn duration(&mut self, name: &str) -> Option<Duration> {
        let (attr, value) = self.value(name)?;
        let duration = match &value {
            Value::Int(secs) => u64::try_from(*secs).ok().map(Duration::from_secs),
            Value::String(s) => parse_duration(s),
            other => {
                self.wrong_type(attr, "duration", other);
                return None;
            }
        };
        if duration.is_none() {
            self.invalid(
                attr,
                format!(
                    "The value for '{}' could not be converted to a duration: {}",
                    name, value
                ),
            );
        }
        duration
    }
}

/// Parse "30", "45s", "2m", "1h" or "500ms"
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(amount)),
        "ms" => Some(Duration::from_millis(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        "h" => amount.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

/// Combine the transports along a host's chain and evaluate the result.
///
/// The most specific declared transport fixes the type; less specific
/// transports of the same type only fill in attributes that are still
/// unset. A host with no transport anywhere runs locally.
pub fn resolve_transport(
    chain: &ScopeChain<'_>,
    vars: &Scope,
    evaluator: &dyn Evaluator,
) -> (Option<Transport>, Diagnostics) {
    let mut kind = None;
    let mut location: Option<&SourceLocation> = None;
    let mut attributes: IndexMap<&str, &Attribute> = IndexMap::new();

    for scope in chain.most_specific_first() {
        let Some(transport) = &scope.transport else {
            continue;
        };
        match kind {
            None => {
                kind = Some(transport.kind);
                location = Some(&transport.location);
            }
            Some(k) if k != transport.kind => continue,
            Some(_) => {}
        }
        for (name, attr) in &transport.attributes {
            attributes.entry(name.as_str()).or_insert(attr);
        }
    }

    let (Some(TransportKind::Ssh), Some(location)) = (kind, location) else {
        return (Some(Transport::Local), Diagnostics::new());
    };

    let mut reader = AttributeReader {
        attributes,
        vars,
        evaluator,
        diags: Diagnostics::new(),
    };

    let host = reader.string("host").unwrap_or_default();
    let user = reader.string("user").unwrap_or_default();
    let ssh = SshConfig {
        port: reader.port("port").unwrap_or(DEFAULT_SSH_PORT),
        password: reader.string("password").map(Secret),
        private_key_path: reader.string("private_key_path"),
        private_key_pass: reader.string("private_key_pass").map(Secret),
        use_known_hosts: reader.bool("use_known_hosts").unwrap_or(true),
        known_hosts_path: reader.string("known_hosts_path"),
        add_unknown_hosts: reader.bool("add_unknown_hosts").unwrap_or(false),
        connection_timeout: reader
            .duration("connection_timeout")
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
        host,
        user,
    };

    let mut diags = reader.diags;
    if ssh.host.is_empty() {
        diags.push(
            Diagnostic::error(
                "Missing SSH host",
                "The 'host' attribute is required for SSH transport.",
            )
            .at(location),
        );
    }
    if ssh.user.is_empty() {
        diags.push(
            Diagnostic::error(
                "Missing SSH user",
                "The 'user' attribute is required for SSH transport.",
            )
            .at(location),
        );
    }

    if diags.has_errors() {
        return (None, diags);
    }
    (Some(Transport::Ssh(ssh)), diags)
}

/// The most specific escalate password along the chain wins
pub fn resolve_escalate(
    chain: &ScopeChain<'_>,
    vars: &Scope,
    evaluator: &dyn Evaluator,
) -> (Escalate, Diagnostics) {
    let mut diags = Diagnostics::new();
    let password = chain
        .most_specific_first()
        .filter_map(|scope| scope.escalate.as_ref())
        .find_map(|escalate| escalate.password.as_ref());

    let Some(attr) = password else {
        return (Escalate::default(), diags);
    };

    match evaluator.evaluate(&attr.expr, vars) {
        Ok(Value::String(s)) => {
            return (
                Escalate {
                    password: Some(Secret(s)),
                },
                diags,
            )
        }
        Ok(_) => diags.push(
            Diagnostic::error(
                "Invalid escalate password type",
                "The escalate password must be a string.",
            )
            .at(&attr.location),
        ),
        Err(err) => diags.push(
            Diagnostic::error(
                "Invalid escalate password type",
                format!("Failed to evaluate the escalate password: {}", err),
            )
            .at(&attr.location),
        ),
    }
    (Escalate::default(), diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::decode::decode_body;
    use crate::inventory::hierarchy::build_hierarchy;
    use crate::parser::parse_body;
    use crate::runtime::DefaultEvaluator;
    use pretty_assertions::assert_eq;

    fn resolve(source: &str, host: &str, vars: &Scope) -> (Option<Transport>, Escalate, Diagnostics) {
        let body = parse_body(source, "transport.hcl").unwrap();
        let (mut decls, diags) = decode_body(&body);
        assert!(diags.is_empty(), "{}", diags);
        decls.link_memberships();
        let (hierarchy, diags) = build_hierarchy(&decls);
        assert!(diags.is_empty(), "{}", diags);
        let hierarchy = hierarchy.unwrap();

        let chain = ScopeChain::for_host(&decls, &hierarchy, host);
        let (transport, mut diags) = resolve_transport(&chain, vars, &DefaultEvaluator);
        let (escalate, more) = resolve_escalate(&chain, vars, &DefaultEvaluator);
        diags.merge(more);
        (transport, escalate, diags)
    }

    #[test]
    fn test_defaults_to_local() {
        let (transport, escalate, diags) = resolve(r#"host "web1" {}"#, "web1", &Scope::new());
        assert!(diags.is_empty());
        assert_eq!(transport, Some(Transport::Local));
        assert_eq!(escalate, Escalate::default());
    }

    #[test]
    fn test_less_specific_fills_missing_attributes() {
        let source = r#"
transport "ssh" {
  user = "deploy"
  port = 2222
}

group "web" {
  transport "ssh" {
    port = 22022
    connection_timeout = "2m"
  }
  host "web1" {
    transport "ssh" {
      host = var.address
    }
  }
}
"#;
        let mut vars = Scope::new();
        vars.insert("address".into(), Value::from("10.0.0.5"));
        let (transport, _, diags) = resolve(source, "web1", &vars);
        assert!(diags.is_empty(), "{}", diags);

        let Some(Transport::Ssh(ssh)) = transport else {
            panic!("expected ssh transport, got {:?}", transport);
        };
        assert_eq!(ssh.target(), "deploy@10.0.0.5:22022");
        assert_eq!(ssh.connection_timeout, Duration::from_secs(120));
        assert!(ssh.use_known_hosts);
        assert!(!ssh.add_unknown_hosts);
    }

    #[test]
    fn test_most_specific_type_wins() {
        let source = r#"
transport "ssh" {
  host = "bastion"
}

host "local1" {
  transport "local" {}
}
"#;
        let (transport, _, diags) = resolve(source, "local1", &Scope::new());
        assert!(diags.is_empty());
        assert_eq!(transport.map(|t| t.kind()), Some(TransportKind::Local));
    }

    #[test]
    fn test_missing_ssh_host_and_user() {
        let (transport, _, diags) = resolve(
            r#"host "h" {
  transport "ssh" {}
}"#,
            "h",
            &Scope::new(),
        );
        assert!(transport.is_none());
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Missing SSH host", "Missing SSH user"]);
    }

    #[test]
    fn test_wrong_attribute_type() {
        let (transport, _, diags) = resolve(
            r#"host "h" {
  transport "ssh" {
    host = "h"
    user = "u"
    use_known_hosts = "yes"
  }
}"#,
            "h",
            &Scope::new(),
        );
        assert!(transport.is_none());
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Invalid transport attribute");
        assert_eq!(
            diag.detail,
            "The value for 'use_known_hosts' must be a bool, got string."
        );
    }

    #[test]
    fn test_escalate_password_is_redacted() {
        let source = r#"
escalate {
  password = "global"
}

host "h" {
  escalate {
    password = "s3cret"
  }
}
"#;
        let (_, escalate, diags) = resolve(source, "h", &Scope::new());
        assert!(diags.is_empty());
        let password = escalate.password.clone().unwrap();
        assert_eq!(password.expose(), "s3cret");
        assert!(!format!("{:?}", escalate).contains("s3cret"));
        assert_eq!(
            serde_json::to_string(&escalate).unwrap(),
            r#"{"password":"***"}"#
        );
    }

    #[test]
    fn test_escalate_password_type() {
        let (_, escalate, diags) = resolve(
            r#"escalate {
  password = 1234
}
host "h" {}"#,
            "h",
            &Scope::new(),
        );
        assert_eq!(escalate.password, None);
        assert_eq!(
            diags.iter().next().unwrap().detail,
            "The escalate password must be a string."
        );
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("45s"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("5d"), None);
    }
}
