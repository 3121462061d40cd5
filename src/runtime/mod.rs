// Runtime module - expression evaluation against a resolved variable scope

mod builtins;

pub use builtins::{call_builtin, is_builtin};

use std::collections::BTreeMap;

use thiserror::Error;

use crate::parser::ast::{BinaryOperator, Expression, StringPart, UnaryOperator, Value};

/// Resolved variables visible to an expression as `var.<name>`
pub type Scope = BTreeMap<String, Value>;

/// Root object under which variables are addressed
pub const VAR_ROOT: &str = "var";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("variable 'var.{0}' is not defined")]
    UnknownVariable(String),

    #[error("unknown name '{0}'; variables are referenced as var.<name>")]
    UnknownName(String),

    #[error("the 'var' object cannot be used directly; reference a variable as var.<name>")]
    BareVarObject,

    #[error("invalid operand types for '{op}': {left} and {right}")]
    OperandTypes {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("call to function '{function}' failed: {message}")]
    Function { function: String, message: String },

    #[error("call to unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{0}")]
    Invalid(String),
}

/// Capability used by the resolver: discover references, then evaluate.
pub trait Evaluator: Sync {
    /// Variable names an expression refers to, in first-use order
    fn references(&self, expr: &Expression) -> Vec<String>;

    /// Evaluate against already-resolved variables
    fn evaluate(&self, expr: &Expression, scope: &Scope) -> Result<Value, EvalError>;
}

/// The inventory expression language with the builtin function library
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvaluator;

impl Evaluator for DefaultEvaluator {
    fn references(&self, expr: &Expression) -> Vec<String> {
        let mut names = Vec::new();
        collect_references(expr, &mut names);
        names
    }

    fn evaluate(&self, expr: &Expression, scope: &Scope) -> Result<Value, EvalError> {
        evaluate_expression(expr, scope)
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn collect_references(expr: &Expression, names: &mut Vec<String>) {
    match expr {
        Expression::Variable(path) if path.len() >= 2 && path[0] == VAR_ROOT => {
            push_unique(names, &path[1])
        }
        Expression::Index { object, index } => {
            // var["name"]
            if let (Expression::Variable(path), Expression::String(name)) =
                (object.as_ref(), index.as_ref())
            {
                if path.len() == 1 && path[0] == VAR_ROOT {
                    push_unique(names, name);
                    return;
                }
            }
            collect_references(object, names);
            collect_references(index, names);
        }
        Expression::InterpolatedString(parts) => {
            for part in parts {
                if let StringPart::Expression(e) = part {
                    collect_references(e, names);
                }
            }
        }
        Expression::BinaryOp { left, right, .. } => {
            collect_references(left, names);
            collect_references(right, names);
        }
        Expression::UnaryOp { operand, .. } => collect_references(operand, names),
        Expression::FunctionCall { args, .. } | Expression::List(args) => {
            for arg in args {
                collect_references(arg, names);
            }
        }
        Expression::Attribute { object, .. } => collect_references(object, names),
        Expression::Dict(entries) => {
            for (k, v) in entries {
                collect_references(k, names);
                collect_references(v, names);
            }
        }
        Expression::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            collect_references(condition, names);
            collect_references(then_expr, names);
            collect_references(else_expr, names);
        }
        _ => {}
    }
}

/// Evaluate an expression against a scope of resolved variables
pub fn evaluate_expression(expr: &Expression, scope: &Scope) -> Result<Value, EvalError> {
    match expr {
        Expression::String(s) => Ok(Value::String(s.clone())),
        Expression::Integer(i) => Ok(Value::Int(*i)),
        Expression::Float(f) => Ok(Value::Float(*f)),
        Expression::Boolean(b) => Ok(Value::Bool(*b)),
        Expression::Null => Ok(Value::Null),

        Expression::Variable(path) => lookup_variable(path, scope),

        Expression::InterpolatedString(parts) => {
            // A lone "${expr}" keeps the value's type
            if let [StringPart::Expression(e)] = parts.as_slice() {
                return evaluate_expression(e, scope);
            }

            let mut result = String::new();
            for part in parts {
                match part {
                    StringPart::Literal(s) => result.push_str(s),
                    StringPart::Expression(e) => {
                        let val = evaluate_expression(e, scope)?;
                        result.push_str(&template_text(&val)?);
                    }
                }
            }
            Ok(Value::String(result))
        }

        Expression::BinaryOp { left, op, right } => {
            let left_val = evaluate_expression(left, scope)?;
            match (op, &left_val) {
                (BinaryOperator::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
                (BinaryOperator::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
                _ => {}
            }
            let right_val = evaluate_expression(right, scope)?;
            evaluate_binary_op(&left_val, op, &right_val)
        }

        Expression::UnaryOp { op, operand } => {
            let val = evaluate_expression(operand, scope)?;
            evaluate_unary_op(op, &val)
        }

        Expression::FunctionCall { name, args } => {
            let evaluated = args
                .iter()
                .map(|a| evaluate_expression(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call_builtin(name, evaluated)
        }

        Expression::Index { object, index } => {
            let obj = evaluate_expression(object, scope)?;
            let idx = evaluate_expression(index, scope)?;
            index_value(&obj, &idx)
        }

        Expression::Attribute { object, attr } => {
            let obj = evaluate_expression(object, scope)?;
            get_attribute(&obj, attr)
        }

        Expression::List(items) => items
            .iter()
            .map(|e| evaluate_expression(e, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),

        Expression::Dict(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                let key = match evaluate_expression(k, scope)? {
                    Value::String(s) => s,
                    Value::Int(i) => i.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(EvalError::Invalid(format!(
                            "object keys must be strings, got {}",
                            other.type_name()
                        )))
                    }
                };
                map.insert(key, evaluate_expression(v, scope)?);
            }
            Ok(Value::Dict(map))
        }

        Expression::Ternary {
            condition,
            then_expr,
            else_expr,
        } => match evaluate_expression(condition, scope)? {
            Value::Bool(true) => evaluate_expression(then_expr, scope),
            Value::Bool(false) => evaluate_expression(else_expr, scope),
            other => Err(EvalError::Invalid(format!(
                "condition must be a bool, got {}",
                other.type_name()
            ))),
        },
    }
}

fn lookup_variable(path: &[String], scope: &Scope) -> Result<Value, EvalError> {
    match path {
        [root, name, rest @ ..] if root == VAR_ROOT => {
            let mut value = scope
                .get(name)
                .ok_or_else(|| EvalError::UnknownVariable(name.clone()))?;
            for attr in rest {
                value = match value {
                    Value::Dict(d) => d.get(attr).ok_or_else(|| {
                        EvalError::Invalid(format!("object has no attribute '{}'", attr))
                    })?,
                    other => {
                        return Err(EvalError::Invalid(format!(
                            "cannot access attribute '{}' on {}",
                            attr,
                            other.type_name()
                        )))
                    }
                };
            }
            Ok(value.clone())
        }
        [root] if root == VAR_ROOT => Err(EvalError::BareVarObject),
        [root, ..] => Err(EvalError::UnknownName(root.clone())),
        [] => Err(EvalError::Invalid("empty variable reference".to_string())),
    }
}

fn index_value(obj: &Value, idx: &Value) -> Result<Value, EvalError> {
    match (obj, idx) {
        (Value::List(items), _) => {
            let i = idx.as_i64().ok_or_else(|| {
                EvalError::Invalid(format!("list index must be a number, got {}", idx.type_name()))
            })?;
            usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| {
                    EvalError::Invalid(format!(
                        "index {} out of range for list of length {}",
                        i,
                        items.len()
                    ))
                })
        }
        (Value::Dict(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::Invalid(format!("object has no element '{}'", key))),
        _ => Err(EvalError::Invalid(format!(
            "cannot index {} with {}",
            obj.type_name(),
            idx.type_name()
        ))),
    }
}

fn get_attribute(obj: &Value, attr: &str) -> Result<Value, EvalError> {
    match obj {
        Value::Dict(map) => map
            .get(attr)
            .cloned()
            .ok_or_else(|| EvalError::Invalid(format!("object has no attribute '{}'", attr))),
        other => Err(EvalError::Invalid(format!(
            "cannot access attribute '{}' on {}",
            attr,
            other.type_name()
        ))),
    }
}

/// String form of a value inside a template
pub(crate) fn template_text(val: &Value) -> Result<String, EvalError> {
    match val {
        Value::String(s) => Ok(s.clone()),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(val.to_string()),
        other => Err(EvalError::Invalid(format!(
            "cannot include {} in a string template",
            other.type_name()
        ))),
    }
}

fn evaluate_binary_op(
    left: &Value,
    op: &BinaryOperator,
    right: &Value,
) -> Result<Value, EvalError> {
    match op {
        BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul => {
            match (left, right) {
                (Value::Int(a), Value::Int(b)) => {
                    let checked = match op {
                        BinaryOperator::Add => a.checked_add(*b),
                        BinaryOperator::Sub => a.checked_sub(*b),
                        _ => a.checked_mul(*b),
                    };
                    match checked {
                        Some(v) => Ok(Value::Int(v)),
                        None => float_op(*a as f64, op, *b as f64),
                    }
                }
                _ => match (left.as_f64(), right.as_f64()) {
                    (Some(a), Some(b)) => float_op(a, op, b),
                    _ => Err(type_error(op, left, right)),
                },
            }
        }

        BinaryOperator::Div => match (left.as_f64(), right.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Err(EvalError::Invalid("division by zero".into())),
            (Some(a), Some(b)) => {
                if let (Value::Int(x), Value::Int(y)) = (left, right) {
                    if x.checked_rem(*y) == Some(0) {
                        if let Some(q) = x.checked_div(*y) {
                            return Ok(Value::Int(q));
                        }
                    }
                }
                Ok(Value::Float(a / b))
            }
            _ => Err(type_error(op, left, right)),
        },

        BinaryOperator::Mod => match (left, right) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::Invalid("modulo by zero".into())),
            (Value::Int(a), Value::Int(b)) => a.checked_rem(*b).map(Value::Int).ok_or_else(overflow),
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(_), Some(b)) if b == 0.0 => Err(EvalError::Invalid("modulo by zero".into())),
                (Some(a), Some(b)) => Ok(Value::Float(a % b)),
                _ => Err(type_error(op, left, right)),
            },
        },

        BinaryOperator::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOperator::Ne => Ok(Value::Bool(!values_equal(left, right))),

        BinaryOperator::Lt => compare_values(op, left, right, |a, b| a < b),
        BinaryOperator::Le => compare_values(op, left, right, |a, b| a <= b),
        BinaryOperator::Gt => compare_values(op, left, right, |a, b| a > b),
        BinaryOperator::Ge => compare_values(op, left, right, |a, b| a >= b),

        BinaryOperator::And | BinaryOperator::Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if *op == BinaryOperator::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(type_error(op, left, right)),
        },
    }
}

fn float_op(a: f64, op: &BinaryOperator, b: f64) -> Result<Value, EvalError> {
    let v = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        _ => a * b,
    };
    Ok(Value::Float(v))
}

fn overflow() -> EvalError {
    EvalError::Invalid("integer overflow".into())
}

fn evaluate_unary_op(op: &UnaryOperator, val: &Value) -> Result<Value, EvalError> {
    match (op, val) {
        (UnaryOperator::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOperator::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOperator::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOperator::Not, other) => Err(EvalError::Invalid(format!(
            "'!' requires a bool, got {}",
            other.type_name()
        ))),
        (UnaryOperator::Neg, other) => Err(EvalError::Invalid(format!(
            "'-' requires a number, got {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

fn compare_values<F>(op: &BinaryOperator, left: &Value, right: &Value, f: F) -> Result<Value, EvalError>
where
    F: Fn(f64, f64) -> bool,
{
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Bool(f(a, b))),
        _ => Err(type_error(op, left, right)),
    }
}

fn type_error(op: &BinaryOperator, left: &Value, right: &Value) -> EvalError {
    EvalError::OperandTypes {
        op: op.to_string(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use pretty_assertions::assert_eq;

    fn scope() -> Scope {
        let mut scope = Scope::new();
        scope.insert("name".into(), Value::from("web1"));
        scope.insert("port".into(), Value::Int(8080));
        scope.insert("tags".into(), Value::from(vec!["a", "b"]));
        scope
    }

    fn eval(src: &str) -> Result<Value, EvalError> {
        DefaultEvaluator.evaluate(&parse_expression(src).unwrap(), &scope())
    }

    #[test]
    fn test_references_in_first_use_order() {
        let expr = parse_expression(r#""${var.b}-${var.a}-${var.b}" == var["c"] ? upper(var.d) : "x""#)
            .unwrap();
        assert_eq!(DefaultEvaluator.references(&expr), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_templates_and_arithmetic() {
        assert_eq!(eval(r#""${var.name}.example.com""#).unwrap(), Value::from("web1.example.com"));
        assert_eq!(eval(r#""${var.port}""#).unwrap(), Value::Int(8080));
        assert_eq!(eval("var.port + 1").unwrap(), Value::Int(8081));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("8 / 2").unwrap(), Value::Int(4));
        assert_eq!(eval("var.tags[1]").unwrap(), Value::from("b"));
        assert_eq!(eval("var.port > 1024 && var.name != \"db\"").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_errors() {
        assert_eq!(eval("var.missing"), Err(EvalError::UnknownVariable("missing".into())));
        assert_eq!(eval("name"), Err(EvalError::UnknownName("name".into())));
        assert_eq!(eval("var"), Err(EvalError::BareVarObject));
        assert!(matches!(eval("var.name + 1"), Err(EvalError::OperandTypes { .. })));
        assert!(matches!(eval("nosuch(1)"), Err(EvalError::UnknownFunction(_))));
        assert!(eval("var.tags[5]").is_err());
        assert!(eval("1 / 0").is_err());
    }

    #[test]
    fn test_integer_extremes_do_not_panic() {
        let mut scope = Scope::new();
        scope.insert("min".into(), Value::Int(i64::MIN));
        let eval_min = |src: &str| DefaultEvaluator.evaluate(&parse_expression(src).unwrap(), &scope);

        assert_eq!(eval_min("var.min / -1").unwrap(), Value::Float(-(i64::MIN as f64)));
        assert_eq!(eval_min("var.min / 1").unwrap(), Value::Int(i64::MIN));
        assert_eq!(eval_min("var.min % -1"), Err(EvalError::Invalid("integer overflow".into())));
        assert_eq!(eval_min("-var.min"), Err(EvalError::Invalid("integer overflow".into())));
        assert_eq!(eval_min("var.min - 1").unwrap(), Value::Float(i64::MIN as f64 - 1.0));
    }

    #[test]
    fn test_short_circuit() {
        assert_eq!(eval("false && var.missing").unwrap(), Value::Bool(false));
        assert_eq!(eval("true || var.missing").unwrap(), Value::Bool(true));
    }
}
