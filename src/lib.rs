// Forge - inventory resolution for configuration management
//
// Turns block-structured inventory files into a validated model of hosts,
// nested groups and per-host variables.

pub mod diagnostics;
pub mod inventory;
pub mod output;
pub mod parser;
pub mod runtime;

pub use diagnostics::{Diagnostic, Diagnostics, Severity, SourceLocation};
pub use inventory::{
    discover_inventory_files, parse_inventory_files, parse_inventory_files_with, Inventory,
    InventoryFile, ResolveOptions, ResolvedGroup, ResolvedHost,
};
pub use output::ForgeError;
pub use runtime::evaluate_expression;

/// Version of the Forge tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::diagnostics::{Diagnostic, Diagnostics};
    pub use crate::inventory::{
        discover_inventory_files, parse_inventory_files, Inventory, InventoryFile, ResolvedHost,
    };
    pub use crate::output::ForgeError;
    pub use crate::parser::ast::Value;
}
