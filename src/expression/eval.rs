//! Evaluation of parsed expressions against the context variables.

use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::context::VarMap;
use serde_json::{Number, Value};
use std::cmp::Ordering;

pub fn evaluate(expr: &Expr, vars: &VarMap) -> Result<Value, String> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => Ok(vars.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Member(target, name) => {
            let target = evaluate(target, vars)?;
            Ok(member(&target, name))
        }
        Expr::Index(target, index) => {
            let target = evaluate(target, vars)?;
            let index = evaluate(index, vars)?;
            Ok(match (&target, &index) {
                (Value::Array(items), Value::Number(n)) => n
                    .as_u64()
                    .and_then(|i| items.get(i as usize))
                    .cloned()
                    .unwrap_or(Value::Null),
                (_, Value::String(key)) => member(&target, key),
                _ => Value::Null,
            })
        }
        Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!is_truthy(&evaluate(inner, vars)?))),
        Expr::Unary(UnaryOp::Neg, inner) => match evaluate(inner, vars)? {
            Value::Number(n) => {
                if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                    Ok(Value::from(i))
                } else {
                    float(-as_f64(&n))
                }
            }
            other => Err(format!("cannot negate {}", type_name(&other))),
        },
        Expr::Binary(left, BinaryOp::And, right) => {
            if !is_truthy(&evaluate(left, vars)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(is_truthy(&evaluate(right, vars)?)))
        }
        Expr::Binary(left, BinaryOp::Or, right) => {
            if is_truthy(&evaluate(left, vars)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(is_truthy(&evaluate(right, vars)?)))
        }
        Expr::Binary(left, op, right) => {
            let left = evaluate(left, vars)?;
            let right = evaluate(right, vars)?;
            binary(*op, &left, &right)
        }
        Expr::Call(name, args) => call(name, args, vars),
    }
}

fn member(target: &Value, name: &str) -> Value {
    match target {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Array(items) if name == "length" || name == "size" => Value::from(items.len()),
        _ => Value::Null,
    }
}

fn call(name: &str, args: &[Expr], vars: &VarMap) -> Result<Value, String> {
    let [arg] = args else {
        return Err(format!("{name}() takes exactly one argument"));
    };
    let value = evaluate(arg, vars)?;
    match name {
        "size" => Ok(Value::from(match &value {
            Value::Null => 0,
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            Value::String(s) => s.chars().count(),
            other => return Err(format!("size() is undefined for {}", type_name(other))),
        })),
        "empty" => Ok(Value::Bool(match &value {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            Value::String(s) => s.is_empty(),
            _ => false,
        })),
        other => Err(format!("unknown function {other}()")),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, String> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare_values(left, right).ok_or_else(|| {
                format!(
                    "cannot compare {} with {}",
                    type_name(left),
                    type_name(right)
                )
            })?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add if left.is_string() || right.is_string() => Ok(Value::String(format!(
            "{}{}",
            to_display_string(left),
            to_display_string(right)
        ))),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Number(a), Value::Number(b)) = (left, right) else {
                return Err(format!(
                    "arithmetic on {} and {}",
                    type_name(left),
                    type_name(right)
                ));
            };
            arithmetic(op, a, b)
        }
        BinaryOp::And => Ok(Value::Bool(is_truthy(left) && is_truthy(right))),
        BinaryOp::Or => Ok(Value::Bool(is_truthy(left) || is_truthy(right))),
    }
}

fn arithmetic(op: BinaryOp, a: &Number, b: &Number) -> Result<Value, String> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Rem if y != 0 => x.checked_rem(y),
            BinaryOp::Div if y != 0 && x % y == 0 => x.checked_div(y),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }
    let (x, y) = (as_f64(a), as_f64(b));
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && y == 0.0 {
        return Err("division by zero".to_string());
    }
    float(match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        _ => x % y,
    })
}

fn float(value: f64) -> Result<Value, String> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| format!("{value} is not a finite number"))
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(0.0)
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => as_f64(a) == as_f64(b),
        _ => left == right,
    }
}

/// Ordering used by the comparison operators. Returns `None` for values of incomparable types.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => as_f64(a).partial_cmp(&as_f64(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order for sorting collections: `null` first, then booleans, numbers, strings,
/// arrays and objects. Values of one type compare by content.
pub fn sort_order(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => as_f64(a).total_cmp(&as_f64(b)),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| sort_order(x, y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => a.len().cmp(&b.len()).then_with(|| {
            a.iter()
                .zip(b)
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| sort_order(va, vb)))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => as_f64(n) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text form used for interpolation: strings unquoted, `null` as the empty string.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use serde_json::json;

    fn eval(source: &str, vars: &VarMap) -> Result<Value, String> {
        evaluate(&parse(source)?, vars)
    }

    fn vars() -> VarMap {
        let mut vars = VarMap::new();
        vars.insert(
            "e".to_string(),
            json!({"name": "Elsa", "payment": 2500, "tags": ["a", "b"], "boss": null}),
        );
        vars.insert("n".to_string(), json!(3));
        vars
    }

    #[test]
    fn test_paths() {
        let vars = vars();
        assert_eq!(eval("e.name", &vars).unwrap(), json!("Elsa"));
        assert_eq!(eval("e.tags[1]", &vars).unwrap(), json!("b"));
        assert_eq!(eval("e['payment']", &vars).unwrap(), json!(2500));
        assert_eq!(eval("e.missing.deeper", &vars).unwrap(), Value::Null);
        assert_eq!(eval("unknown", &vars).unwrap(), Value::Null);
        assert_eq!(eval("e.tags.size", &vars).unwrap(), json!(2));
    }

    #[test]
    fn test_arithmetic_keeps_integers_when_exact() {
        let vars = vars();
        assert_eq!(eval("n + 1", &vars).unwrap(), json!(4));
        assert_eq!(eval("n * 2 - 1", &vars).unwrap(), json!(5));
        assert_eq!(eval("n / 2", &vars).unwrap(), json!(1.5));
        assert_eq!(eval("6 / n", &vars).unwrap(), json!(2));
        assert_eq!(eval("-n", &vars).unwrap(), json!(-3));
        assert!(eval("n / 0", &vars).is_err());
        assert!(eval("e.name * 2", &vars).is_err());
    }

    #[test]
    fn test_string_concatenation() {
        let vars = vars();
        assert_eq!(
            eval("e.name + ' #' + n", &vars).unwrap(),
            json!("Elsa #3")
        );
    }

    #[test]
    fn test_comparisons_and_logic() {
        let vars = vars();
        assert_eq!(eval("e.payment > 2000", &vars).unwrap(), json!(true));
        assert_eq!(eval("e.payment == 2500.0", &vars).unwrap(), json!(true));
        assert_eq!(eval("e.name != 'Elsa'", &vars).unwrap(), json!(false));
        assert_eq!(eval("e.boss == null", &vars).unwrap(), json!(true));
        assert_eq!(
            eval("e.payment > 3000 || e.name == 'Elsa'", &vars).unwrap(),
            json!(true)
        );
        assert_eq!(eval("!empty(e.tags) and size(e.tags) == 2", &vars).unwrap(), json!(true));
        assert!(eval("e.name < 3", &vars).is_err());
    }

    #[test]
    fn test_logic_short_circuits() {
        let vars = vars();
        assert_eq!(eval("false && (1 / 0)", &vars).unwrap(), json!(false));
        assert_eq!(eval("true || (1 / 0)", &vars).unwrap(), json!(true));
    }

    #[test]
    fn test_sort_order_is_total_across_types() {
        let mut values = vec![
            json!("b"),
            json!(2),
            Value::Null,
            json!(true),
            json!([1, 2]),
            json!(1.5),
            json!("a"),
            Value::Null,
            json!({"k": 1}),
            json!([1]),
        ];
        values.sort_by(sort_order);
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Null,
                json!(true),
                json!(1.5),
                json!(2),
                json!("a"),
                json!("b"),
                json!([1]),
                json!([1, 2]),
                json!({"k": 1}),
            ]
        );
        assert_eq!(sort_order(&json!(3), &json!(3.0)), Ordering::Equal);
    }
}
