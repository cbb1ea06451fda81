//! Case predicates
//!
//! A predicate decides whether one record belongs to a case. Predicates come
//! from two places:
//!
//! - Rust closures registered by name in a [`PredicateRegistry`]
//! - sandboxed expressions compiled by an [`ExpressionEngine`], with the
//!   record bound as `x` (and `record`)
//!
//! Expressions never get access to the host: module imports and `eval` are
//! disabled and the engine runs under operation, depth and size limits.

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, FnPtr, Scope, AST};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{Result, SwitchError};

/// Failure of a single predicate invocation; the record is treated as a non-match
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredicateError {
    #[error("expression '{source_text}' failed: {message}")]
    Expression { source_text: String, message: String },

    #[error("predicate failed: {0}")]
    Failed(String),
}

/// Decides whether a record passes a case
pub trait Predicate: Send + Sync {
    fn evaluate(&self, record: &Value) -> std::result::Result<bool, PredicateError>;
}

impl<F> Predicate for F
where
    F: Fn(&Value) -> std::result::Result<bool, PredicateError> + Send + Sync,
{
    fn evaluate(&self, record: &Value) -> std::result::Result<bool, PredicateError> {
        self(record)
    }
}

/// Wrap an infallible closure as a shared predicate
pub fn predicate_fn<F>(f: F) -> Arc<dyn Predicate>
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Arc::new(move |record: &Value| -> std::result::Result<bool, PredicateError> { Ok(f(record)) })
}

/// Truthiness of a JSON value: `null`, `false`, `0`, `NaN` and `""` are false
pub fn json_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Truthiness of an expression result, same rules as [`json_truthy`]
fn dynamic_truthy(value: Dynamic) -> bool {
    if value.is_unit() {
        return false;
    }
    if let Ok(b) = value.as_bool() {
        return b;
    }
    if let Ok(i) = value.as_int() {
        return i != 0;
    }
    if let Ok(f) = value.as_float() {
        return f != 0.0 && !f.is_nan();
    }
    if value.is_string() {
        return value.into_string().map(|s| !s.is_empty()).unwrap_or(true);
    }
    true
}

/// Named, precompiled predicates that cases can refer to
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    entries: HashMap<String, Arc<dyn Predicate>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a predicate under `name`
    pub fn register(&mut self, name: impl Into<String>, predicate: Arc<dyn Predicate>) {
        self.entries.insert(name.into(), predicate);
    }

    /// Register an infallible closure under `name`
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.register(name, predicate_fn(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Predicate>> {
        self.entries.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("PredicateRegistry")
            .field("names", &names)
            .finish()
    }
}

/// Sandboxed expression compiler
#[derive(Clone)]
pub struct ExpressionEngine {
    engine: Arc<Engine>,
}

impl ExpressionEngine {
    /// Create an engine with the default sandbox limits
    pub fn new() -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self {
            engine: Arc::new(engine),
        }
    }

    fn configure_engine(engine: &mut Engine) {
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(100_000);
        engine.set_max_string_size(1_000_000);
        engine.set_max_array_size(100_000);
        engine.set_max_map_size(10_000);
        engine.set_max_modules(0);
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
    }

    /// Compile an expression into a predicate
    ///
    /// The expression may be a plain boolean expression over `x`
    /// (`x.lastName == "Doe"`) or a closure taking the record
    /// (`|r| r.id > 10`).
    pub fn compile(&self, source: &str) -> Result<ExpressionPredicate> {
        let ast = self.engine.compile(source).map_err(|e| {
            SwitchError::Config(format!("Invalid expression '{}': {}", source, e))
        })?;

        Ok(ExpressionPredicate {
            source: source.to_string(),
            ast,
            engine: Arc::clone(&self.engine),
        })
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEngine").finish_non_exhaustive()
    }
}

/// A compiled expression predicate
pub struct ExpressionPredicate {
    source: String,
    ast: AST,
    engine: Arc<Engine>,
}

impl ExpressionPredicate {
    pub fn source(&self) -> &str {
        &self.source
    }

    fn error(&self, message: impl fmt::Display) -> PredicateError {
        PredicateError::Expression {
            source_text: self.source.clone(),
            message: message.to_string(),
        }
    }
}

impl fmt::Debug for ExpressionPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionPredicate")
            .field("source", &self.source)
            .finish()
    }
}

impl Predicate for ExpressionPredicate {
    fn evaluate(&self, record: &Value) -> std::result::Result<bool, PredicateError> {
        let bound = rhai::serde::to_dynamic(record).map_err(|e| self.error(e))?;

        let mut scope = Scope::new();
        scope.push("x", bound.clone());
        scope.push("record", bound.clone());

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|e| self.error(e))?;

        // A closure literal is applied to the record
        let result = if result.is_fnptr() {
            let fn_ptr = result.cast::<FnPtr>();
            fn_ptr
                .call::<Dynamic>(&self.engine, &self.ast, (bound,))
                .map_err(|e| self.error(e))?
        } else {
            result
        };

        Ok(dynamic_truthy(result))
    }
}
