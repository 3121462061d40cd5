// Parser module for inventory files

pub mod ast;
pub mod body;
pub mod expressions;

pub use ast::*;
pub use body::parse_body;
pub use expressions::{parse_expression, SyntaxError};

use crate::diagnostics::{Diagnostic, SourceLocation};

/// Parse a file, reporting a syntax error as an "Invalid syntax" diagnostic
pub fn parse_source(source: &str, filename: &str) -> Result<Body, Diagnostic> {
    parse_body(source, filename).map_err(|err| {
        Diagnostic::error("Invalid syntax", err.message.clone())
            .at(&SourceLocation::new(filename, err.line, err.column))
    })
}
