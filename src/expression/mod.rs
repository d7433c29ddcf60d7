//! Expression evaluation capability.
//!
//! The engine only depends on [`ExpressionEvaluator`]; hosts can plug in their own language.
//! [`JsonExpressionEvaluator`] is the default: a small bean-path language over
//! `serde_json::Value` (`e.name`, `items[0]`, `e.payment > 2000 && !empty(e.tags)`).

mod eval;
mod parser;

pub use eval::{compare_values, is_truthy, sort_order, to_display_string};

use crate::context::VarMap;
use crate::error::{Result, TemplateError};
use parser::Expr;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub trait ExpressionEvaluator {
    /// Evaluates `expression` against the variable mapping of a context.
    fn evaluate(&self, expression: &str, vars: &VarMap) -> Result<Value>;

    /// Evaluates a predicate. Anything other than a boolean result is an evaluation error.
    fn is_condition_true(&self, expression: &str, vars: &VarMap) -> Result<bool> {
        match self.evaluate(expression, vars)? {
            Value::Bool(result) => Ok(result),
            other => Err(TemplateError::evaluation(
                expression,
                format!("condition result is not a boolean value: {other}"),
            )),
        }
    }
}

/// Default evaluator. Parsed expressions are cached per instance because the same cell
/// templates are evaluated once per iteration step.
#[derive(Debug, Default)]
pub struct JsonExpressionEvaluator {
    cache: RefCell<HashMap<String, Rc<Expr>>>,
}

impl JsonExpressionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, expression: &str) -> Result<Rc<Expr>> {
        if let Some(expr) = self.cache.borrow().get(expression) {
            return Ok(expr.clone());
        }
        let expr = Rc::new(
            parser::parse(expression)
                .map_err(|message| TemplateError::evaluation(expression, message))?,
        );
        self.cache
            .borrow_mut()
            .insert(expression.to_string(), expr.clone());
        Ok(expr)
    }
}

impl ExpressionEvaluator for JsonExpressionEvaluator {
    fn evaluate(&self, expression: &str, vars: &VarMap) -> Result<Value> {
        let expr = self.compile(expression)?;
        eval::evaluate(&expr, vars).map_err(|message| {
            tracing::debug!(expression, %message, "expression evaluation failed");
            TemplateError::evaluation(expression, message)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_condition_must_be_boolean() {
        let evaluator = JsonExpressionEvaluator::new();
        let mut vars = VarMap::new();
        vars.insert("x".to_string(), json!(5));

        assert!(evaluator.is_condition_true("x > 2", &vars).unwrap());
        assert!(!evaluator.is_condition_true("x < 2", &vars).unwrap());
        assert_matches!(
            evaluator.is_condition_true("x", &vars),
            Err(TemplateError::Evaluation { expression, .. }) if expression == "x"
        );
    }

    #[test]
    fn test_parse_errors_surface_as_evaluation_errors() {
        let evaluator = JsonExpressionEvaluator::new();
        assert_matches!(
            evaluator.evaluate("a +", &VarMap::new()),
            Err(TemplateError::Evaluation { .. })
        );
    }

    #[test]
    fn test_compiled_expressions_are_cached() {
        let evaluator = JsonExpressionEvaluator::new();
        let vars = VarMap::new();
        evaluator.evaluate("1 + 2", &vars).unwrap();
        evaluator.evaluate("1 + 2", &vars).unwrap();
        assert_eq!(evaluator.cache.borrow().len(), 1);
    }
}
