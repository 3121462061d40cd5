// Expression parser: pest pairs to Expression trees

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use super::ast::{BinaryOperator, Expression, StringPart, UnaryOperator};

#[derive(Parser)]
#[grammar = "parser/inventory.pest"]
pub struct InventoryParser;

/// Syntax error with a 1-based position
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line}, column {column})")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    pub(crate) fn at(pos: (usize, usize), message: impl Into<String>) -> Self {
        SyntaxError {
            message: message.into(),
            line: pos.0,
            column: pos.1,
        }
    }
}

impl From<pest::error::Error<Rule>> for SyntaxError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        SyntaxError {
            message: err.variant.message().into_owned(),
            line,
            column,
        }
    }
}

/// Parse a standalone expression such as `upper(var.name)`
pub fn parse_expression(input: &str) -> Result<Expression, SyntaxError> {
    let mut pairs = InventoryParser::parse(Rule::standalone_expression, input)?;
    let top = expect(&mut pairs, (1, 1), "expression")?;
    let pos = top.line_col();
    let expr = expect(&mut top.into_inner(), pos, "expression")?;
    build_expression(expr)
}

/// Next pair or a syntax error naming what was missing
pub(crate) fn expect<'i>(
    pairs: &mut Pairs<'i, Rule>,
    pos: (usize, usize),
    what: &str,
) -> Result<Pair<'i, Rule>, SyntaxError> {
    pairs
        .next()
        .ok_or_else(|| SyntaxError::at(pos, format!("expected {}", what)))
}

pub(crate) fn build_expression(pair: Pair<'_, Rule>) -> Result<Expression, SyntaxError> {
    let pos = pair.line_col();
    match pair.as_rule() {
        Rule::expression => build_expression(expect(&mut pair.into_inner(), pos, "expression")?),
        Rule::conditional => build_conditional(pair),
        Rule::or_expr => fold_binary(pair, Some(BinaryOperator::Or)),
        Rule::and_expr => fold_binary(pair, Some(BinaryOperator::And)),
        Rule::comparison | Rule::additive | Rule::multiplicative => fold_binary(pair, None),
        Rule::unary => build_unary(pair),
        Rule::postfix => build_postfix(pair),
        Rule::number => parse_number(pair.as_str(), pos),
        Rule::boolean => Ok(Expression::Boolean(pair.as_str() == "true")),
        Rule::null => Ok(Expression::Null),
        Rule::template => build_template(pair),
        Rule::label_string => Ok(Expression::String(label_text(pair))),
        Rule::tuple => {
            let items = pair
                .into_inner()
                .map(build_expression)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expression::List(items))
        }
        Rule::object => build_object(pair),
        Rule::function_call => build_function_call(pair),
        Rule::variable => Ok(Expression::Variable(vec![pair.as_str().to_string()])),
        other => Err(SyntaxError::at(
            pos,
            format!("unexpected {:?} in expression", other),
        )),
    }
}

fn build_conditional(pair: Pair<'_, Rule>) -> Result<Expression, SyntaxError> {
    let pos = pair.line_col();
    let mut inner = pair.into_inner();
    let condition = build_expression(expect(&mut inner, pos, "condition")?)?;

    match inner.next() {
        None => Ok(condition),
        Some(then_pair) => {
            let then_expr = build_expression(then_pair)?;
            let else_expr = build_expression(expect(&mut inner, pos, "false branch")?)?;
            Ok(Expression::Ternary {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            })
        }
    }
}

/// Left-associative chain. `fixed` is the operator for rules whose
/// operator is a literal token (`||`, `&&`); otherwise operators are
/// interleaved as their own pairs.
fn fold_binary(
    pair: Pair<'_, Rule>,
    fixed: Option<BinaryOperator>,
) -> Result<Expression, SyntaxError> {
    let pos = pair.line_col();
    let mut inner = pair.into_inner();
    let mut left = build_expression(expect(&mut inner, pos, "operand")?)?;

    while let Some(next) = inner.next() {
        let (op, right_pair) = match fixed {
            Some(op) => (op, next),
            None => (
                binary_operator(&next)?,
                expect(&mut inner, pos, "right operand")?,
            ),
        };
        let right = build_expression(right_pair)?;
        left = Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        };
    }

    Ok(left)
}

fn binary_operator(pair: &Pair<'_, Rule>) -> Result<BinaryOperator, SyntaxError> {
    let op = match pair.as_str() {
        "==" => BinaryOperator::Eq,
        "!=" => BinaryOperator::Ne,
        "<" => BinaryOperator::Lt,
        "<=" => BinaryOperator::Le,
        ">" => BinaryOperator::Gt,
        ">=" => BinaryOperator::Ge,
        "+" => BinaryOperator::Add,
        "-" => BinaryOperator::Sub,
        "*" => BinaryOperator::Mul,
        "/" => BinaryOperator::Div,
        "%" => BinaryOperator::Mod,
        other => {
            return Err(SyntaxError::at(
                pair.line_col(),
                format!("unknown operator '{}'", other),
            ))
        }
    };
    Ok(op)
}

fn build_unary(pair: Pair<'_, Rule>) -> Result<Expression, SyntaxError> {
    let mut ops = Vec::new();
    let mut operand = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::unary_op => ops.push(if inner.as_str() == "!" {
                UnaryOperator::Not
            } else {
                UnaryOperator::Neg
            }),
            _ => operand = Some(build_expression(inner)?),
        }
    }

    let mut expr = operand.unwrap_or(Expression::Null);
    for op in ops.into_iter().rev() {
        expr = match (op, expr) {
            (UnaryOperator::Neg, Expression::Integer(i)) if i != i64::MIN => Expression::Integer(-i),
            (UnaryOperator::Neg, Expression::Float(f)) => Expression::Float(-f),
            (op, operand) => Expression::UnaryOp {
                op,
                operand: Box::new(operand),
            },
        };
    }
    Ok(expr)
}

fn build_postfix(pair: Pair<'_, Rule>) -> Result<Expression, SyntaxError> {
    let pos = pair.line_col();
    let mut inner = pair.into_inner();
    let mut expr = build_expression(expect(&mut inner, pos, "value")?)?;

    for step in inner {
        let step_pos = step.line_col();
        match step.as_rule() {
            Rule::index => {
                let index = build_expression(expect(&mut step.into_inner(), step_pos, "index")?)?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            }
            Rule::get_attr => {
                let name = expect(&mut step.into_inner(), step_pos, "attribute name")?;
                expr = match (name.as_rule(), expr) {
                    (Rule::attr_number, object) => Expression::Index {
                        object: Box::new(object),
                        index: Box::new(parse_number(name.as_str(), step_pos)?),
                    },
                    (_, Expression::Variable(mut path)) => {
                        path.push(name.as_str().to_string());
                        Expression::Variable(path)
                    }
                    (_, object) => Expression::Attribute {
                        object: Box::new(object),
                        attr: name.as_str().to_string(),
                    },
                };
            }
            other => {
                return Err(SyntaxError::at(
                    step_pos,
                    format!("unexpected {:?} after value", other),
                ))
            }
        }
    }

    Ok(expr)
}

fn parse_number(text: &str, pos: (usize, usize)) -> Result<Expression, SyntaxError> {
    let is_float = text.contains(['.', 'e', 'E']);
    if !is_float {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Expression::Integer(i));
        }
    }
    text.parse::<f64>()
        .map(Expression::Float)
        .map_err(|_| SyntaxError::at(pos, format!("invalid number '{}'", text)))
}

fn build_template(pair: Pair<'_, Rule>) -> Result<Expression, SyntaxError> {
    let mut parts = Vec::new();

    for part in pair.into_inner() {
        let pos = part.line_col();
        match part.as_rule() {
            Rule::template_literal => match parts.last_mut() {
                Some(StringPart::Literal(text)) => text.push_str(&unescape(part.as_str())),
                _ => parts.push(StringPart::Literal(unescape(part.as_str()))),
            },
            Rule::template_interp => {
                let expr = build_expression(expect(&mut part.into_inner(), pos, "expression")?)?;
                parts.push(StringPart::Expression(expr));
            }
            other => {
                return Err(SyntaxError::at(
                    pos,
                    format!("unexpected {:?} in string", other),
                ))
            }
        }
    }

    match parts.as_slice() {
        [] => Ok(Expression::String(String::new())),
        [StringPart::Literal(text)] => Ok(Expression::String(text.clone())),
        _ => Ok(Expression::InterpolatedString(parts)),
    }
}

/// Literal text of a quoted label
pub(crate) fn label_text(pair: Pair<'_, Rule>) -> String {
    pair.into_inner()
        .map(|p| unescape(p.as_str()))
        .collect::<String>()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        Some(decoded) => out.push(decoded),
                        None => {
                            out.push_str("\\u");
                            out.push_str(&hex);
                        }
                    }
                }
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '$' if chars.peek() == Some(&'$') && chars.clone().nth(1) == Some('{') => {
                // `$${` is a literal `${`
                chars.next();
                out.push('$');
            }
            _ => out.push(c),
        }
    }

    out
}

fn build_object(pair: Pair<'_, Rule>) -> Result<Expression, SyntaxError> {
    let mut entries = Vec::new();

    for item in pair.into_inner() {
        let pos = item.line_col();
        let mut inner = item.into_inner();
        let key_pair = expect(&mut inner, pos, "object key")?;
        let key_pos = key_pair.line_col();
        let key_value = expect(&mut key_pair.into_inner(), key_pos, "object key")?;

        let key = match key_value.as_rule() {
            Rule::identifier => Expression::String(key_value.as_str().to_string()),
            _ => build_expression(key_value)?,
        };
        let value = build_expression(expect(&mut inner, pos, "object value")?)?;
        entries.push((key, value));
    }

    Ok(Expression::Dict(entries))
}

fn build_function_call(pair: Pair<'_, Rule>) -> Result<Expression, SyntaxError> {
    let pos = pair.line_col();
    let mut inner = pair.into_inner();
    let name = expect(&mut inner, pos, "function name")?.as_str().to_string();
    let args = inner.map(build_expression).collect::<Result<Vec<_>, _>>()?;
    Ok(Expression::FunctionCall { name, args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Expression as E;

    #[test]
    fn test_parse_variable_traversal() {
        let expr = parse_expression("var.server.port").unwrap();
        assert_eq!(
            expr,
            E::Variable(vec!["var".into(), "server".into(), "port".into()])
        );

        let expr = parse_expression("var.list[0]").unwrap();
        assert!(matches!(expr, E::Index { .. }));
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            E::BinaryOp { op, right, .. } => {
                assert_eq!(op, BinaryOperator::Add);
                assert!(matches!(
                    *right,
                    E::BinaryOp {
                        op: BinaryOperator::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_template() {
        let expr = parse_expression(r#""${var.host}.example.com""#).unwrap();
        match expr {
            E::InterpolatedString(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[1], StringPart::Literal(".example.com".into()));
            }
            other => panic!("unexpected {:?}", other),
        }

        let expr = parse_expression(r#""cost: $${price}\n""#).unwrap();
        assert_eq!(expr, E::String("cost: ${price}\n".into()));
    }

    #[test]
    fn test_parse_collections_and_calls() {
        let expr = parse_expression(r#"merge({ a = 1, "b": [true, null] }, {})"#).unwrap();
        match expr {
            E::FunctionCall { name, args } => {
                assert_eq!(name, "merge");
                assert_eq!(args.len(), 2);
                match &args[0] {
                    E::Dict(entries) => {
                        assert_eq!(entries[0].0, E::String("a".into()));
                        assert_eq!(entries[1].1, E::List(vec![E::Boolean(true), E::Null]));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_conditional_and_negation() {
        let expr = parse_expression("var.prod ? -1 : !var.flag").unwrap();
        match expr {
            E::Ternary {
                then_expr,
                else_expr,
                ..
            } => {
                assert_eq!(*then_expr, E::Integer(-1));
                assert!(matches!(
                    *else_expr,
                    E::UnaryOp {
                        op: UnaryOperator::Not,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_expression("1 +").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.column >= 3);
    }
}
