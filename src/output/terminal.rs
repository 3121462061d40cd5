// Colored text rendering of a resolved inventory

use colored::*;

use crate::inventory::{Inventory, ResolvedHost, Transport};
use crate::parser::ast::Value;

fn format_value(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

fn transport_label(host: &ResolvedHost) -> String {
    match &host.transport {
        Transport::Local => "local".to_string(),
        Transport::Ssh(ssh) => format!("ssh {}", ssh.target()),
    }
}

/// Render selected hosts and the groups they belong to
pub fn render_inventory_text(inventory: &Inventory, hosts: &[&ResolvedHost], show_vars: bool) -> String {
    let mut out = String::new();

    out.push_str(&format!("{} ({})\n", "HOSTS".green().bold(), hosts.len()));
    for host in hosts {
        out.push_str(&format!(
            "  {} {} {}\n",
            host.name.white().bold(),
            "=>".dimmed(),
            transport_label(host).cyan()
        ));
        if !host.groups.is_empty() {
            out.push_str(&format!(
                "      {} {}\n",
                "groups:".dimmed(),
                host.groups.join(", ")
            ));
        }
        if show_vars {
            for (name, value) in &host.vars {
                out.push_str(&format!("      {} = {}\n", name.yellow(), format_value(value)));
            }
        }
    }

    let groups: Vec<_> = inventory
        .groups()
        .values()
        .filter(|g| hosts.iter().any(|h| g.hosts.contains(&h.name)))
        .collect();
    if groups.is_empty() {
        return out;
    }

    out.push('\n');
    out.push_str(&format!("{} ({})\n", "GROUPS".green().bold(), groups.len()));
    for group in groups {
        let members: Vec<&str> = group.hosts.iter().map(String::as_str).collect();
        out.push_str(&format!("  {}", group.name.white().bold()));
        if !group.parents.is_empty() {
            out.push_str(&format!(" {} {}", "<".dimmed(), group.parents.join(", ")));
        }
        out.push('\n');
        out.push_str(&format!("      {} {}\n", "hosts:".dimmed(), members.join(", ")));
        if show_vars {
            for (name, value) in &group.vars {
                out.push_str(&format!("      {} = {}\n", name.yellow(), format_value(value)));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::parse_inventory_str;

    #[test]
    fn test_render_inventory_text() {
        let (inventory, diags) = parse_inventory_str(
            r#"
group "web" {
  vars {
    port = 8080
  }
  host "web1" {
    transport "ssh" {
      host = "10.0.0.1"
      user = "deploy"
    }
  }
}
host "db1" {}
"#,
            "render.hcl",
        );
        assert!(diags.is_empty(), "{}", diags);
        let inventory = inventory.unwrap();
        let hosts: Vec<_> = inventory.hosts().values().collect();

        let rendered = render_inventory_text(&inventory, &hosts, true);
        let clean = console::strip_ansi_codes(&rendered);

        assert!(clean.contains("HOSTS (2)"));
        assert!(clean.contains("  db1 => local"));
        assert!(clean.contains("  web1 => ssh deploy@10.0.0.1:22"));
        assert!(clean.contains("      groups: web"));
        assert!(clean.contains("      port = 8080"));
        assert!(clean.contains("GROUPS (1)"));
        assert!(clean.contains("      hosts: web1"));
    }
}
