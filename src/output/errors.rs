// Error type and human-readable diagnostic rendering for Forge

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;

use colored::*;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, Diagnostics, Severity};

/// Decide color output from TTY detection and the NO_COLOR environment variable
pub fn should_use_colors() -> bool {
    // https://no-color.org/
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    // Diagnostics go to stderr
    std::io::stderr().is_terminal()
}

/// Apply the color decision to the `colored` crate
pub fn configure_colors(enabled: bool) {
    colored::control::set_override(enabled && should_use_colors());
}

/// Failures outside the diagnostics pipeline
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to discover inventory files in '{}': {message}", path.display())]
    Discovery { path: PathBuf, message: String },

    /// Building the inventory produced errors
    #[error("{0}")]
    Diagnostics(Diagnostics),

    #[error("invalid target pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl From<Diagnostics> for ForgeError {
    fn from(diags: Diagnostics) -> Self {
        ForgeError::Diagnostics(diags)
    }
}

/// Format a source code snippet with error highlighting
pub fn format_source_error(source: &str, line: usize, column: usize, message: &str) -> String {
    let mut result = String::new();
    let lines: Vec<&str> = source.lines().collect();
    if line == 0 || line > lines.len() {
        return result;
    }

    // Two lines of context on each side
    let start = line.saturating_sub(3);
    let end = (line + 2).min(lines.len());

    for (i, src_line) in lines[start..end].iter().enumerate() {
        let line_num = start + i + 1;
        let prefix = if line_num == line {
            format!("{:>4} {} ", line_num, ">".red())
        } else {
            format!("{:>4} {} ", line_num, "|".blue())
        };

        result.push_str(&prefix);
        result.push_str(src_line);
        result.push('\n');

        if line_num == line {
            let spaces = " ".repeat(6 + column.saturating_sub(1));
            result.push_str(&spaces);
            result.push_str(&"^".red().to_string());

            if !message.is_empty() {
                result.push(' ');
                result.push_str(&message.red().to_string());
            }

            result.push('\n');
        }
    }

    result
}

/// Render one diagnostic; `source` is the text of the file it points into
pub fn render_diagnostic(diag: &Diagnostic, source: Option<&str>) -> String {
    let mut out = match diag.severity {
        Severity::Error => format!("{}: {}\n", "ERROR".red().bold(), diag.summary.bold()),
        Severity::Warning => format!("{}: {}\n", "WARNING".yellow().bold(), diag.summary.bold()),
    };

    if let Some(location) = &diag.location {
        out.push_str(&format!(
            "  {} {}\n",
            "-->".blue(),
            format!("{}:{}:{}", location.file, location.line, location.column).cyan()
        ));
        if let Some(source) = source {
            out.push('\n');
            out.push_str(&format_source_error(source, location.line, location.column, ""));
        }
    }

    if !diag.detail.is_empty() {
        out.push('\n');
        out.push_str(&format!("  {}\n", diag.detail));
    }
    out
}

/// Render every diagnostic, followed by an error/warning tally.
///
/// `sources` maps file names (as used in locations) to their content.
pub fn render_diagnostics(diags: &Diagnostics, sources: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for diag in diags {
        let source = diag
            .location
            .as_ref()
            .and_then(|l| sources.get(&l.file))
            .map(String::as_str);
        out.push_str(&render_diagnostic(diag, source));
        out.push('\n');
    }

    let errors = diags.errors().count();
    let warnings = diags.warnings().count();
    if errors > 0 || warnings > 0 {
        let tally = format!(
            "{} error{}, {} warning{}",
            errors,
            if errors == 1 { "" } else { "s" },
            warnings,
            if warnings == 1 { "" } else { "s" }
        );
        if errors > 0 {
            out.push_str(&format!("{}\n", tally.red()));
        } else {
            out.push_str(&format!("{}\n", tally.yellow()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SourceLocation;

    const SOURCE: &str = "group \"web\" {\n  parent = \"missing\"\n}\n";

    #[test]
    fn test_render_points_at_location() {
        let diag = Diagnostic::error(
            "Invalid parent group",
            "The parent group 'missing' does not exist.",
        )
        .at(&SourceLocation::new("web.hcl", 1, 1));

        let rendered = render_diagnostic(&diag, Some(SOURCE));
        let clean = console::strip_ansi_codes(&rendered);

        assert!(clean.contains("ERROR: Invalid parent group"));
        assert!(clean.contains("--> web.hcl:1:1"));
        assert!(clean.contains("   1 > group \"web\" {"));
        assert!(clean.contains("   2 |   parent = \"missing\""));
        assert!(clean.contains("The parent group 'missing' does not exist."));
    }

    #[test]
    fn test_render_tally() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning("Unsupported argument", "ignored"));
        diags.push(Diagnostic::error("Name conflict", "clash"));
        diags.push(Diagnostic::error("Name conflict", "clash again"));

        let rendered = render_diagnostics(&diags, &HashMap::new());
        let clean = console::strip_ansi_codes(&rendered);
        assert!(clean.contains("WARNING: Unsupported argument"));
        assert!(clean.ends_with("2 errors, 1 warning\n"));
    }

    #[test]
    fn test_snippet_out_of_range() {
        assert_eq!(format_source_error(SOURCE, 40, 1, "x"), "");
    }

    #[test]
    fn test_error_messages() {
        let err = ForgeError::InvalidPattern {
            pattern: "web:&nope".into(),
            message: "unknown target 'nope'".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid target pattern 'web:&nope': unknown target 'nope'"
        );

        let diags: Diagnostics = Diagnostic::error("Name conflict", "clash").into();
        assert_eq!(ForgeError::from(diags).to_string(), "Name conflict; clash");
    }
}
