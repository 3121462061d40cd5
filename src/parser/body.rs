// Block/attribute structure of inventory files

use pest::iterators::Pair;
use pest::Parser;

use super::ast::{Attribute, Block, Body};
use super::expressions::{build_expression, expect, label_text, InventoryParser, Rule, SyntaxError};
use crate::diagnostics::SourceLocation;

/// Parse a whole file into its top-level body
pub fn parse_body(source: &str, filename: &str) -> Result<Body, SyntaxError> {
    let mut pairs = InventoryParser::parse(Rule::file, source)?;
    let file = expect(&mut pairs, (1, 1), "file")?;
    let body = expect(&mut file.into_inner(), (1, 1), "body")?;
    build_body(body, filename)
}

fn build_body(pair: Pair<'_, Rule>, filename: &str) -> Result<Body, SyntaxError> {
    let mut body = Body::default();

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::attribute => body.attributes.push(build_attribute(item, filename)?),
            Rule::block => body.blocks.push(build_block(item, filename)?),
            other => {
                return Err(SyntaxError::at(
                    item.line_col(),
                    format!("unexpected {:?} in body", other),
                ))
            }
        }
    }

    Ok(body)
}

fn location(pair: &Pair<'_, Rule>, filename: &str) -> SourceLocation {
    let (line, column) = pair.line_col();
    SourceLocation::new(filename, line, column)
}

fn build_attribute(pair: Pair<'_, Rule>, filename: &str) -> Result<Attribute, SyntaxError> {
    let pos = pair.line_col();
    let location = location(&pair, filename);
    let mut inner = pair.into_inner();
    let name = expect(&mut inner, pos, "attribute name")?.as_str().to_string();
    let expr = build_expression(expect(&mut inner, pos, "attribute value")?)?;

    Ok(Attribute {
        name,
        expr,
        location,
    })
}

fn build_block(pair: Pair<'_, Rule>, filename: &str) -> Result<Block, SyntaxError> {
    let pos = pair.line_col();
    let location = location(&pair, filename);
    let mut inner = pair.into_inner();
    let kind = expect(&mut inner, pos, "block type")?.as_str().to_string();

    let mut labels = Vec::new();
    let mut body = None;
    for part in inner {
        match part.as_rule() {
            Rule::block_label => {
                let label_pos = part.line_col();
                let label = expect(&mut part.into_inner(), label_pos, "label")?;
                labels.push(match label.as_rule() {
                    Rule::label_string => label_text(label),
                    _ => label.as_str().to_string(),
                });
            }
            Rule::body => body = Some(build_body(part, filename)?),
            other => {
                return Err(SyntaxError::at(
                    part.line_col(),
                    format!("unexpected {:?} in block", other),
                ))
            }
        }
    }

    Ok(Block {
        kind,
        labels,
        body: body.unwrap_or_default(),
        location,
    })
}
