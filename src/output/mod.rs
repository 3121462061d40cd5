// Output module for Forge

pub mod errors;
pub mod json_output;
pub mod terminal;

pub use errors::*;
pub use json_output::*;
pub use terminal::*;

use crate::inventory::{Inventory, ResolvedHost};

/// Output format for inventory listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output with colors
    #[default]
    Text,
    /// Machine-readable JSON document
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}', expected text or json", other)),
        }
    }
}

/// Render hosts selected from an inventory in the requested format
pub fn render_inventory(
    inventory: &Inventory,
    hosts: &[&ResolvedHost],
    format: OutputFormat,
    show_vars: bool,
) -> String {
    match format {
        OutputFormat::Text => render_inventory_text(inventory, hosts, show_vars),
        OutputFormat::Json => {
            let doc = render_inventory_json(inventory, hosts, show_vars);
            serde_json::to_string_pretty(&doc).unwrap_or_else(|_| doc.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
