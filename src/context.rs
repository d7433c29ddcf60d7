//! Variable environment shared by one render pass.
//!
//! Commands introduce loop variables through [`Context::scoped`], which returns a
//! [`VarScope`] guard. Dropping the guard restores the context to its previous shape on
//! every exit path, including `?` propagation out of nested rendering.

use crate::config::OverlapPolicy;
use crate::error::Result;
use crate::expression::{ExpressionEvaluator, JsonExpressionEvaluator};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::{Deref, DerefMut};

pub type VarMap = IndexMap<String, Value>;

/// Render-pass settings carried alongside the variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    pub overlap_policy: OverlapPolicy,
}

pub struct Context {
    vars: VarMap,
    evaluator: Box<dyn ExpressionEvaluator>,
    config: ContextConfig,
}

impl Context {
    pub fn new() -> Self {
        Self::with_evaluator(JsonExpressionEvaluator::new())
    }

    pub fn with_evaluator<E: ExpressionEvaluator + 'static>(evaluator: E) -> Self {
        Self {
            vars: VarMap::new(),
            evaluator: Box::new(evaluator),
            config: ContextConfig::default(),
        }
    }

    pub fn from_vars<I, K>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut context = Self::new();
        for (name, value) in vars {
            context.put_var(name, value);
        }
        context
    }

    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Binds `name`, returning the value it replaced.
    pub fn put_var(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn remove_var(&mut self, name: &str) -> Option<Value> {
        self.vars.shift_remove(name)
    }

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn var_names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn to_map(&self) -> &VarMap {
        &self.vars
    }

    pub fn evaluate(&self, expression: &str) -> Result<Value> {
        self.evaluator.evaluate(expression, &self.vars)
    }

    pub fn is_condition_true(&self, expression: &str) -> Result<bool> {
        self.evaluator.is_condition_true(expression, &self.vars)
    }

    /// Binds `name` to `value` until the returned guard is dropped.
    pub fn scoped(&mut self, name: impl Into<String>, value: impl Into<Value>) -> VarScope<'_> {
        let name = name.into();
        let previous = self.put_var(name.clone(), value);
        VarScope {
            context: self,
            name,
            previous,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("vars", &self.vars)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Scoped variable binding. Restores the shadowed value, or removes the variable, on drop.
pub struct VarScope<'a> {
    context: &'a mut Context,
    name: String,
    previous: Option<Value>,
}

impl VarScope<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the bound value without ending the scope.
    pub fn rebind(&mut self, value: impl Into<Value>) {
        self.context.vars.insert(self.name.clone(), value.into());
    }
}

impl Deref for VarScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &*self.context
    }
}

impl DerefMut for VarScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut *self.context
    }
}

impl Drop for VarScope<'_> {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                self.context.vars.insert(self.name.clone(), previous);
            }
            None => {
                self.context.vars.shift_remove(&self.name);
            }
        }
    }
}
