// JSON rendering of a resolved inventory

use serde_json::{json, Value as JsonValue};

use crate::inventory::{Inventory, ResolvedHost};

/// Selected hosts, their groups and the target index as one JSON document
pub fn render_inventory_json(
    inventory: &Inventory,
    hosts: &[&ResolvedHost],
    show_vars: bool,
) -> JsonValue {
    let host_entries: Vec<JsonValue> = hosts
        .iter()
        .map(|host| {
            let mut entry = json!({
                "name": host.name,
                "transport": host.transport,
                "groups": host.groups,
            });
            if host.escalate.password.is_some() {
                entry["escalate"] = json!(host.escalate);
            }
            if show_vars {
                entry["vars"] = json!(host.vars);
            }
            entry
        })
        .collect();

    let group_entries: Vec<JsonValue> = inventory
        .groups()
        .values()
        .filter(|g| hosts.iter().any(|h| g.hosts.contains(&h.name)))
        .map(|group| {
            let mut entry = json!({
                "name": group.name,
                "parents": group.parents,
                "hosts": group.hosts,
            });
            if show_vars {
                entry["vars"] = json!(group.vars);
            }
            entry
        })
        .collect();

    json!({
        "hosts": host_entries,
        "groups": group_entries,
        "targets": inventory.targets(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::parse_inventory_str;

    #[test]
    fn test_render_inventory_json_redacts_secrets() {
        let (inventory, diags) = parse_inventory_str(
            r#"
host "web1" {
  transport "ssh" {
    host     = "10.0.0.1"
    user     = "deploy"
    password = "hunter2"
  }
  escalate {
    password = "root-pass"
  }
  vars {
    role = "web"
  }
}
"#,
            "json.hcl",
        );
        assert!(diags.is_empty(), "{}", diags);
        let inventory = inventory.unwrap();
        let hosts: Vec<_> = inventory.hosts().values().collect();

        let doc = render_inventory_json(&inventory, &hosts, true);
        let host = &doc["hosts"][0];
        assert_eq!(host["transport"]["type"], "ssh");
        assert_eq!(host["transport"]["port"], 22);
        assert_eq!(host["transport"]["password"], "***");
        assert_eq!(host["escalate"]["password"], "***");
        assert_eq!(host["vars"]["role"], "web");
        assert_eq!(doc["targets"]["all"][0], "web1");

        let text = doc.to_string();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("root-pass"));
    }
}
