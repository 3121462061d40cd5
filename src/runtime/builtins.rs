// Built-in functions callable from inventory expressions

use std::collections::BTreeMap;

use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::{template_text, values_equal, EvalError};
use crate::parser::ast::Value;

type Builtin = fn(Vec<Value>) -> Result<Value, EvalError>;

static BUILTINS: Lazy<BTreeMap<&'static str, Builtin>> = Lazy::new(|| {
    let table: [(&'static str, Builtin); 56] = [
        // numeric
        ("abs", builtin_abs),
        ("ceil", builtin_ceil),
        ("floor", builtin_floor),
        ("max", builtin_max),
        ("min", builtin_min),
        ("sum", builtin_sum),
        ("range", builtin_range),
        // collections
        ("length", builtin_length),
        ("concat", builtin_concat),
        ("contains", builtin_contains),
        ("distinct", builtin_distinct),
        ("element", builtin_element),
        ("flatten", builtin_flatten),
        ("index", builtin_index),
        ("keys", builtin_keys),
        ("values", builtin_values),
        ("lookup", builtin_lookup),
        ("merge", builtin_merge),
        ("reverse", builtin_reverse),
        ("sort", builtin_sort),
        ("zipmap", builtin_zipmap),
        ("coalesce", builtin_coalesce),
        ("compact", builtin_compact),
        ("alltrue", builtin_alltrue),
        ("anytrue", builtin_anytrue),
        // strings
        ("join", builtin_join),
        ("split", builtin_split),
        ("format", builtin_format),
        ("lower", builtin_lower),
        ("upper", builtin_upper),
        ("title", builtin_title),
        ("trim", builtin_trim),
        ("trimspace", builtin_trimspace),
        ("trimprefix", builtin_trimprefix),
        ("trimsuffix", builtin_trimsuffix),
        ("replace", builtin_replace),
        ("substr", builtin_substr),
        ("startswith", builtin_startswith),
        ("endswith", builtin_endswith),
        ("strcontains", builtin_strcontains),
        ("regex", builtin_regex),
        ("regexall", builtin_regexall),
        // conversion
        ("tostring", builtin_tostring),
        ("tonumber", builtin_tonumber),
        ("tobool", builtin_tobool),
        ("tolist", builtin_tolist),
        // encoding
        ("base64encode", builtin_base64encode),
        ("base64decode", builtin_base64decode),
        ("textencodebase64", builtin_base64encode),
        ("textdecodebase64", builtin_base64decode),
        ("jsonencode", builtin_jsonencode),
        ("jsondecode", builtin_jsondecode),
        ("yamlencode", builtin_yamlencode),
        ("yamldecode", builtin_yamldecode),
        ("sha256", builtin_sha256),
        // environment
        ("env", builtin_env),
    ];
    table.into_iter().collect()
});

/// Whether `name` is a known function
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains_key(name)
}

/// Call a built-in function
pub fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match BUILTINS.get(name) {
        Some(func) => func(args),
        None => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn fail(func: &str, message: impl Into<String>) -> EvalError {
    EvalError::Function {
        function: func.to_string(),
        message: message.into(),
    }
}

fn require_args(func: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        Err(fail(
            func,
            format!("expected {} argument(s), got {}", expected, args.len()),
        ))
    } else {
        Ok(())
    }
}

fn arg_type_error(func: &str, arg_idx: usize, expected: &str, got: &Value) -> EvalError {
    fail(
        func,
        format!(
            "argument {} must be {}, got {}",
            arg_idx + 1,
            expected,
            got.type_name()
        ),
    )
}

fn string_arg(func: &str, args: &[Value], idx: usize) -> Result<String, EvalError> {
    match &args[idx] {
        Value::String(s) => Ok(s.clone()),
        v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_)) => Ok(v.to_string()),
        other => Err(arg_type_error(func, idx, "a string", other)),
    }
}

fn number_arg(func: &str, args: &[Value], idx: usize) -> Result<f64, EvalError> {
    args[idx]
        .as_f64()
        .ok_or_else(|| arg_type_error(func, idx, "a number", &args[idx]))
}

fn list_arg<'a>(func: &str, args: &'a [Value], idx: usize) -> Result<&'a [Value], EvalError> {
    args[idx]
        .as_list()
        .ok_or_else(|| arg_type_error(func, idx, "a list", &args[idx]))
}

fn dict_arg<'a>(
    func: &str,
    args: &'a [Value],
    idx: usize,
) -> Result<&'a BTreeMap<String, Value>, EvalError> {
    match &args[idx] {
        Value::Dict(d) => Ok(d),
        other => Err(arg_type_error(func, idx, "an object", other)),
    }
}

/// Integral floats collapse back to Int
fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}

fn builtin_abs(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("abs", &args, 1)?;
    match &args[0] {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| EvalError::Invalid("abs: integer overflow".into())),
        _ => Ok(number(number_arg("abs", &args, 0)?.abs())),
    }
}

fn builtin_ceil(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("ceil", &args, 1)?;
    Ok(number(number_arg("ceil", &args, 0)?.ceil()))
}

fn builtin_floor(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("floor", &args, 1)?;
    Ok(number(number_arg("floor", &args, 0)?.floor()))
}

fn numbers(func: &str, args: &[Value]) -> Result<Vec<f64>, EvalError> {
    if args.is_empty() {
        return Err(fail(func, "at least one argument is required"));
    }
    (0..args.len()).map(|i| number_arg(func, args, i)).collect()
}

fn builtin_max(args: Vec<Value>) -> Result<Value, EvalError> {
    let nums = numbers("max", &args)?;
    Ok(number(nums.into_iter().fold(f64::NEG_INFINITY, f64::max)))
}

fn builtin_min(args: Vec<Value>) -> Result<Value, EvalError> {
    let nums = numbers("min", &args)?;
    Ok(number(nums.into_iter().fold(f64::INFINITY, f64::min)))
}

fn builtin_sum(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("sum", &args, 1)?;
    let items = list_arg("sum", &args, 0)?;
    if items.is_empty() {
        return Err(fail("sum", "sum function requires a non-empty iterable"));
    }
    let nums = numbers("sum", items)?;
    Ok(number(nums.into_iter().sum()))
}

fn builtin_range(args: Vec<Value>) -> Result<Value, EvalError> {
    let (start, end, step) = match args.len() {
        1 => (0.0, number_arg("range", &args, 0)?, 1.0),
        2 => (number_arg("range", &args, 0)?, number_arg("range", &args, 1)?, 1.0),
        3 => (
            number_arg("range", &args, 0)?,
            number_arg("range", &args, 1)?,
            number_arg("range", &args, 2)?,
        ),
        n => return Err(fail("range", format!("expected 1 to 3 arguments, got {}", n))),
    };
    if step == 0.0 {
        return Err(fail("range", "step must not be zero"));
    }
    let step = if start > end && step > 0.0 { -step } else { step };

    let mut out = Vec::new();
    let mut current = start;
    while (step > 0.0 && current < end) || (step < 0.0 && current > end) {
        if out.len() >= 1024 {
            return Err(fail("range", "more than 1024 values requested"));
        }
        out.push(number(current));
        current += step;
    }
    Ok(Value::List(out))
}

fn builtin_length(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("length", &args, 1)?;
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::List(l) => l.len(),
        Value::Dict(d) => d.len(),
        other => return Err(arg_type_error("length", 0, "a string, list or object", other)),
    };
    Ok(Value::Int(len as i64))
}

fn builtin_concat(args: Vec<Value>) -> Result<Value, EvalError> {
    let mut out = Vec::new();
    for i in 0..args.len() {
        out.extend_from_slice(list_arg("concat", &args, i)?);
    }
    Ok(Value::List(out))
}

fn builtin_contains(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("contains", &args, 2)?;
    let items = list_arg("contains", &args, 0)?;
    Ok(Value::Bool(items.iter().any(|v| values_equal(v, &args[1]))))
}

fn builtin_distinct(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("distinct", &args, 1)?;
    let mut out: Vec<Value> = Vec::new();
    for item in list_arg("distinct", &args, 0)? {
        if !out.iter().any(|v| values_equal(v, item)) {
            out.push(item.clone());
        }
    }
    Ok(Value::List(out))
}

fn builtin_element(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("element", &args, 2)?;
    let items = list_arg("element", &args, 0)?;
    if items.is_empty() {
        return Err(fail("element", "cannot use element function with an empty list"));
    }
    let idx = number_arg("element", &args, 1)?;
    if idx < 0.0 {
        return Err(fail("element", "cannot use element function with a negative index"));
    }
    Ok(items[(idx as usize) % items.len()].clone())
}

fn builtin_flatten(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("flatten", &args, 1)?;
    fn walk(items: &[Value], out: &mut Vec<Value>) {
        for item in items {
            match item {
                Value::List(inner) => walk(inner, out),
                other => out.push(other.clone()),
            }
        }
    }
    let mut out = Vec::new();
    walk(list_arg("flatten", &args, 0)?, &mut out);
    Ok(Value::List(out))
}

fn builtin_index(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("index", &args, 2)?;
    list_arg("index", &args, 0)?
        .iter()
        .position(|v| values_equal(v, &args[1]))
        .map(|i| Value::Int(i as i64))
        .ok_or_else(|| fail("index", "item not found"))
}

fn builtin_keys(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("keys", &args, 1)?;
    let map = dict_arg("keys", &args, 0)?;
    Ok(Value::List(map.keys().cloned().map(Value::String).collect()))
}

fn builtin_values(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("values", &args, 1)?;
    let map = dict_arg("values", &args, 0)?;
    Ok(Value::List(map.values().cloned().collect()))
}

fn builtin_lookup(args: Vec<Value>) -> Result<Value, EvalError> {
    if args.len() != 2 && args.len() != 3 {
        return Err(fail("lookup", format!("expected 2 or 3 arguments, got {}", args.len())));
    }
    let map = dict_arg("lookup", &args, 0)?;
    let key = string_arg("lookup", &args, 1)?;
    match (map.get(&key), args.get(2)) {
        (Some(v), _) => Ok(v.clone()),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(fail("lookup", format!("the given key \"{}\" does not exist", key))),
    }
}

fn builtin_merge(args: Vec<Value>) -> Result<Value, EvalError> {
    let mut out = BTreeMap::new();
    for (i, arg) in args.iter().enumerate() {
        match arg {
            Value::Null => {}
            Value::Dict(d) => out.extend(d.iter().map(|(k, v)| (k.clone(), v.clone()))),
            other => return Err(arg_type_error("merge", i, "an object", other)),
        }
    }
    Ok(Value::Dict(out))
}

fn builtin_reverse(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("reverse", &args, 1)?;
    let mut items = list_arg("reverse", &args, 0)?.to_vec();
    items.reverse();
    Ok(Value::List(items))
}

fn builtin_sort(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("sort", &args, 1)?;
    let items = list_arg("sort", &args, 0)?;
    let mut strings = (0..items.len())
        .map(|i| string_arg("sort", items, i))
        .collect::<Result<Vec<_>, _>>()?;
    strings.sort();
    Ok(Value::List(strings.into_iter().map(Value::String).collect()))
}

fn builtin_zipmap(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("zipmap", &args, 2)?;
    let keys = list_arg("zipmap", &args, 0)?;
    let values = list_arg("zipmap", &args, 1)?;
    if keys.len() != values.len() {
        return Err(fail(
            "zipmap",
            format!(
                "number of keys ({}) does not match number of values ({})",
                keys.len(),
                values.len()
            ),
        ));
    }
    let mut out = BTreeMap::new();
    for (i, v) in values.iter().enumerate() {
        out.insert(string_arg("zipmap", keys, i)?, v.clone());
    }
    Ok(Value::Dict(out))
}

fn builtin_coalesce(args: Vec<Value>) -> Result<Value, EvalError> {
    args.into_iter()
        .find(|v| !matches!(v, Value::Null) && v.as_str() != Some(""))
        .ok_or_else(|| fail("coalesce", "no non-null, non-empty-string arguments"))
}

fn builtin_compact(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("compact", &args, 1)?;
    let items = list_arg("compact", &args, 0)?;
    Ok(Value::List(
        items
            .iter()
            .filter(|v| !matches!(v, Value::Null) && v.as_str() != Some(""))
            .cloned()
            .collect(),
    ))
}

fn bools(func: &str, args: &[Value]) -> Result<Vec<bool>, EvalError> {
    require_args(func, args, 1)?;
    list_arg(func, args, 0)?
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s == "true" || s == "false" => Ok(s == "true"),
            other => Err(fail(
                func,
                format!("element {} must be a bool, got {}", i, other.type_name()),
            )),
        })
        .collect()
}

fn builtin_alltrue(args: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::Bool(bools("alltrue", &args)?.into_iter().all(|b| b)))
}

fn builtin_anytrue(args: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::Bool(bools("anytrue", &args)?.into_iter().any(|b| b)))
}

fn builtin_join(args: Vec<Value>) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(fail("join", "expected a separator and at least one list"));
    }
    let sep = string_arg("join", &args, 0)?;
    let mut parts = Vec::new();
    for i in 1..args.len() {
        let items = list_arg("join", &args, i)?;
        for j in 0..items.len() {
            parts.push(string_arg("join", items, j)?);
        }
    }
    Ok(Value::String(parts.join(&sep)))
}

fn builtin_split(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("split", &args, 2)?;
    let sep = string_arg("split", &args, 0)?;
    let s = string_arg("split", &args, 1)?;
    if s.is_empty() {
        return Ok(Value::List(Vec::new()));
    }
    Ok(Value::List(
        s.split(sep.as_str()).map(Value::from).collect(),
    ))
}

fn builtin_format(args: Vec<Value>) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(fail("format", "a format string is required"));
    }
    let spec = string_arg("format", &args, 0)?;
    let mut rest = args[1..].iter();
    let mut out = String::new();
    let mut chars = spec.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let verb = chars
            .next()
            .ok_or_else(|| fail("format", "format string ends with '%'"))?;
        if verb == '%' {
            out.push('%');
            continue;
        }
        let arg = rest
            .next()
            .ok_or_else(|| fail("format", format!("not enough arguments for %{}", verb)))?;
        match verb {
            's' => out.push_str(&template_text(arg)?),
            'd' => match arg.as_f64() {
                Some(n) => out.push_str(&(n.trunc() as i64).to_string()),
                None => return Err(fail("format", format!("%d requires a number, got {}", arg.type_name()))),
            },
            'f' => match arg.as_f64() {
                Some(n) => out.push_str(&format!("{:.6}", n)),
                None => return Err(fail("format", format!("%f requires a number, got {}", arg.type_name()))),
            },
            'q' => out.push_str(&format!("{:?}", template_text(arg)?)),
            't' => match arg {
                Value::Bool(b) => out.push_str(&b.to_string()),
                other => return Err(fail("format", format!("%t requires a bool, got {}", other.type_name()))),
            },
            'v' => out.push_str(&arg.to_string()),
            other => return Err(fail("format", format!("unsupported verb %{}", other))),
        }
    }

    if rest.next().is_some() {
        return Err(fail("format", "too many arguments"));
    }
    Ok(Value::String(out))
}

fn string_fn(func: &str, args: Vec<Value>, f: impl Fn(&str) -> String) -> Result<Value, EvalError> {
    require_args(func, &args, 1)?;
    Ok(Value::String(f(&string_arg(func, &args, 0)?)))
}

fn builtin_lower(args: Vec<Value>) -> Result<Value, EvalError> {
    string_fn("lower", args, str::to_lowercase)
}

fn builtin_upper(args: Vec<Value>) -> Result<Value, EvalError> {
    string_fn("upper", args, str::to_uppercase)
}

fn builtin_title(args: Vec<Value>) -> Result<Value, EvalError> {
    string_fn("title", args, |s| {
        let mut out = String::with_capacity(s.len());
        let mut at_word_start = true;
        for c in s.chars() {
            if at_word_start && c.is_alphabetic() {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            at_word_start = !c.is_alphanumeric();
        }
        out
    })
}

fn builtin_trimspace(args: Vec<Value>) -> Result<Value, EvalError> {
    string_fn("trimspace", args, |s| s.trim().to_string())
}

fn builtin_trim(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("trim", &args, 2)?;
    let s = string_arg("trim", &args, 0)?;
    let cutset = string_arg("trim", &args, 1)?;
    Ok(Value::from(s.trim_matches(|c: char| cutset.contains(c))))
}

fn builtin_trimprefix(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("trimprefix", &args, 2)?;
    let s = string_arg("trimprefix", &args, 0)?;
    let prefix = string_arg("trimprefix", &args, 1)?;
    Ok(Value::from(s.strip_prefix(prefix.as_str()).unwrap_or(&s)))
}

fn builtin_trimsuffix(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("trimsuffix", &args, 2)?;
    let s = string_arg("trimsuffix", &args, 0)?;
    let suffix = string_arg("trimsuffix", &args, 1)?;
    Ok(Value::from(s.strip_suffix(suffix.as_str()).unwrap_or(&s)))
}

fn builtin_replace(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("replace", &args, 3)?;
    let s = string_arg("replace", &args, 0)?;
    let search = string_arg("replace", &args, 1)?;
    let replacement = string_arg("replace", &args, 2)?;

    // "/pattern/" searches by regular expression
    if search.len() > 1 && search.starts_with('/') && search.ends_with('/') {
        let re = compile("replace", &search[1..search.len() - 1])?;
        return Ok(Value::String(re.replace_all(&s, replacement.as_str()).into_owned()));
    }
    Ok(Value::String(s.replace(&search, &replacement)))
}

fn builtin_substr(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("substr", &args, 3)?;
    let s = string_arg("substr", &args, 0)?;
    let chars: Vec<char> = s.chars().collect();
    let offset = number_arg("substr", &args, 1)? as i64;
    let length = number_arg("substr", &args, 2)? as i64;

    let len = chars.len() as i64;
    // offsets and lengths saturate, so the range always lands in 0..=len
    let start = if offset < 0 {
        len.saturating_add(offset).max(0)
    } else {
        offset.min(len)
    };
    let end = if length < 0 {
        len
    } else {
        start.saturating_add(length).min(len)
    };
    Ok(Value::String(chars[start as usize..end as usize].iter().collect()))
}

fn string_pair(func: &str, args: &[Value]) -> Result<(String, String), EvalError> {
    require_args(func, args, 2)?;
    Ok((string_arg(func, args, 0)?, string_arg(func, args, 1)?))
}

fn builtin_startswith(args: Vec<Value>) -> Result<Value, EvalError> {
    let (s, prefix) = string_pair("startswith", &args)?;
    Ok(Value::Bool(s.starts_with(&prefix)))
}

fn builtin_endswith(args: Vec<Value>) -> Result<Value, EvalError> {
    let (s, suffix) = string_pair("endswith", &args)?;
    Ok(Value::Bool(s.ends_with(&suffix)))
}

fn builtin_strcontains(args: Vec<Value>) -> Result<Value, EvalError> {
    let (s, sub) = string_pair("strcontains", &args)?;
    Ok(Value::Bool(s.contains(&sub)))
}

fn compile(func: &str, pattern: &str) -> Result<Regex, EvalError> {
    Regex::new(pattern).map_err(|e| fail(func, format!("invalid regular expression: {}", e)))
}

/// A match rendered the way `regex` returns it: whole match, list of
/// unnamed captures, or object of named captures.
fn match_value(re: &Regex, caps: &regex::Captures<'_>) -> Value {
    let named: Vec<&str> = re.capture_names().flatten().collect();
    if !named.is_empty() {
        let map = named
            .into_iter()
            .map(|n| {
                let v = caps.name(n).map_or(Value::Null, |m| Value::from(m.as_str()));
                (n.to_string(), v)
            })
            .collect();
        return Value::Dict(map);
    }
    if caps.len() > 1 {
        return Value::List(
            caps.iter()
                .skip(1)
                .map(|m| m.map_or(Value::Null, |m| Value::from(m.as_str())))
                .collect(),
        );
    }
    caps.get(0)
        .map_or(Value::Null, |m| Value::from(m.as_str()))
}

fn builtin_regex(args: Vec<Value>) -> Result<Value, EvalError> {
    let (pattern, s) = string_pair("regex", &args)?;
    let re = compile("regex", &pattern)?;
    re.captures(&s)
        .map(|caps| match_value(&re, &caps))
        .ok_or_else(|| fail("regex", "pattern did not match any part of the given string"))
}

fn builtin_regexall(args: Vec<Value>) -> Result<Value, EvalError> {
    let (pattern, s) = string_pair("regexall", &args)?;
    let re = compile("regexall", &pattern)?;
    Ok(Value::List(
        re.captures_iter(&s).map(|caps| match_value(&re, &caps)).collect(),
    ))
}

fn builtin_tostring(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("tostring", &args, 1)?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        _ => Ok(Value::String(string_arg("tostring", &args, 0)?)),
    }
}

fn builtin_tonumber(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("tonumber", &args, 1)?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Int(_) | Value::Float(_) => Ok(args[0].clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(number)
            .map_err(|_| fail("tonumber", format!("cannot convert \"{}\" to number", s))),
        other => Err(arg_type_error("tonumber", 0, "a string or number", other)),
    }
}

fn builtin_tobool(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("tobool", &args, 1)?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Bool(_) => Ok(args[0].clone()),
        Value::String(s) if s == "true" => Ok(Value::Bool(true)),
        Value::String(s) if s == "false" => Ok(Value::Bool(false)),
        other => Err(fail("tobool", format!("cannot convert {} to bool", other))),
    }
}

fn builtin_tolist(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("tolist", &args, 1)?;
    list_arg("tolist", &args, 0).map(|l| Value::List(l.to_vec()))
}

fn builtin_base64encode(args: Vec<Value>) -> Result<Value, EvalError> {
    string_fn("base64encode", args, |s| {
        base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
    })
}

fn builtin_base64decode(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("base64decode", &args, 1)?;
    let encoded = string_arg("base64decode", &args, 0)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| fail("base64decode", format!("failed to decode base64 data: {}", e)))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| fail("base64decode", "the result of decoding is not valid UTF-8"))
}

fn builtin_jsonencode(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("jsonencode", &args, 1)?;
    serde_json::to_string(&args[0])
        .map(Value::String)
        .map_err(|e| fail("jsonencode", e.to_string()))
}

fn builtin_jsondecode(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("jsondecode", &args, 1)?;
    let s = string_arg("jsondecode", &args, 0)?;
    serde_json::from_str(&s).map_err(|e| fail("jsondecode", e.to_string()))
}

fn builtin_yamlencode(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("yamlencode", &args, 1)?;
    serde_yaml::to_string(&args[0])
        .map(Value::String)
        .map_err(|e| fail("yamlencode", e.to_string()))
}

fn builtin_yamldecode(args: Vec<Value>) -> Result<Value, EvalError> {
    require_args("yamldecode", &args, 1)?;
    let s = string_arg("yamldecode", &args, 0)?;
    serde_yaml::from_str(&s).map_err(|e| fail("yamldecode", e.to_string()))
}

fn builtin_sha256(args: Vec<Value>) -> Result<Value, EvalError> {
    string_fn("sha256", args, |s| format!("{:x}", Sha256::digest(s.as_bytes())))
}

fn builtin_env(args: Vec<Value>) -> Result<Value, EvalError> {
    // Unset variables read as the empty string
    string_fn("env", args, |name| std::env::var(name).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|i| s(i)).collect())
    }

    #[test]
    fn test_substr_clamps_out_of_range_arguments() {
        let substr = |offset: Value, length: Value| call_builtin("substr", vec![s("abc"), offset, length]);

        assert_eq!(substr(Value::Int(1), Value::Float(1e19)).unwrap(), s("bc"));
        assert_eq!(substr(Value::Int(i64::MAX), Value::Int(i64::MAX)).unwrap(), s(""));
        assert_eq!(substr(Value::Int(-2), Value::Int(1)).unwrap(), s("b"));
        assert_eq!(substr(Value::Int(i64::MIN), Value::Int(2)).unwrap(), s("ab"));
        assert_eq!(substr(Value::Float(-1e19), Value::Int(-1)).unwrap(), s("abc"));
    }

    #[test]
    fn test_abs_of_min_integer_is_an_error() {
        assert_eq!(call_builtin("abs", vec![Value::Int(-3)]).unwrap(), Value::Int(3));
        assert!(call_builtin("abs", vec![Value::Int(i64::MIN)]).is_err());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call_builtin("upper", vec![s("web")]).unwrap(), s("WEB"));
        assert_eq!(call_builtin("title", vec![s("hello world")]).unwrap(), s("Hello World"));
        assert_eq!(
            call_builtin("join", vec![s(","), list(&["a", "b"])]).unwrap(),
            s("a,b")
        );
        assert_eq!(call_builtin("split", vec![s("."), s("a.b.c")]).unwrap(), list(&["a", "b", "c"]));
        assert!(call_builtin("format", vec![s("%s-%03d"), s("web"), Value::Int(1)]).is_err());
        assert_eq!(
            call_builtin("format", vec![s("%s:%d"), s("web"), Value::Int(80)]).unwrap(),
            s("web:80")
        );
        assert_eq!(call_builtin("substr", vec![s("hello"), Value::Int(1), Value::Int(3)]).unwrap(), s("ell"));
        assert_eq!(
            call_builtin("replace", vec![s("a-b-c"), s("/-+/"), s("_")]).unwrap(),
            s("a_b_c")
        );
    }

    #[test]
    fn test_collection_functions() {
        assert_eq!(call_builtin("length", vec![list(&["a", "b"])]).unwrap(), Value::Int(2));
        assert_eq!(
            call_builtin("concat", vec![list(&["a"]), list(&["b"])]).unwrap(),
            list(&["a", "b"])
        );
        assert_eq!(call_builtin("sort", vec![list(&["b", "a"])]).unwrap(), list(&["a", "b"]));
        assert_eq!(
            call_builtin("sum", vec![Value::List(vec![Value::Int(1), Value::Float(2.5)])]).unwrap(),
            Value::Float(3.5)
        );
        assert!(call_builtin("sum", vec![Value::List(vec![])]).is_err());
        assert_eq!(
            call_builtin("range", vec![Value::Int(3)]).unwrap(),
            Value::List(vec![Value::Int(0), Value::Int(1), Value::Int(2)])
        );

        let zipped = call_builtin("zipmap", vec![list(&["a", "b"]), list(&["1", "2"])]).unwrap();
        assert_eq!(
            call_builtin("lookup", vec![zipped.clone(), s("b")]).unwrap(),
            s("2")
        );
        assert_eq!(
            call_builtin("lookup", vec![zipped, s("z"), s("default")]).unwrap(),
            s("default")
        );
    }

    #[test]
    fn test_encoding_functions() {
        let encoded = call_builtin("base64encode", vec![s("forge")]).unwrap();
        assert_eq!(encoded, s("Zm9yZ2U="));
        assert_eq!(call_builtin("base64decode", vec![encoded]).unwrap(), s("forge"));
        assert_eq!(
            call_builtin("sha256", vec![s("")]).unwrap(),
            s("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
        assert_eq!(
            call_builtin("jsondecode", vec![s(r#"{"a": [1, true]}"#)]).unwrap(),
            Value::Dict(BTreeMap::from([(
                "a".to_string(),
                Value::List(vec![Value::Int(1), Value::Bool(true)])
            )]))
        );
    }

    #[test]
    fn test_regex() {
        assert_eq!(call_builtin("regex", vec![s("[a-z]+"), s("123abc")]).unwrap(), s("abc"));
        let named = call_builtin("regex", vec![s(r"(?P<name>\w+)-(?P<num>\d+)"), s("web-01")]).unwrap();
        assert_eq!(
            named,
            Value::Dict(BTreeMap::from([
                ("name".to_string(), s("web")),
                ("num".to_string(), s("01")),
            ]))
        );
        assert!(call_builtin("regex", vec![s("x"), s("abc")]).is_err());
    }

    #[test]
    fn test_unknown_function() {
        assert!(!is_builtin("exec"));
        assert_eq!(
            call_builtin("exec", vec![]),
            Err(EvalError::UnknownFunction("exec".to_string()))
        );
    }
}
