//! Runtime lookup environment and variable scoping.

use std::collections::HashMap;

use serde_json::{Value, json};

use crate::error::{EngineError, Result};

/// How an unresolved variable lookup is handled.
#[derive(Clone, Debug, Default)]
pub enum ResolveMode {
    /// Unresolved lookups abort the render.
    #[default]
    Strict,
    /// Unresolved lookups produce the given value instead.
    Permissive(Value),
}

pub type FilterFn = Box<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;
pub type FunctionFn = Box<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Filter and function registry plus the resolution policy for missing names.
///
/// An environment is built once and shared across renders; per-render state
/// lives in [`Context`].
pub struct Environment {
    filters: HashMap<String, FilterFn>,
    functions: HashMap<String, FunctionFn>,
    resolve_mode: ResolveMode,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment with the built-in filters and functions registered.
    pub fn new() -> Environment {
        let mut env = Environment {
            filters: HashMap::new(),
            functions: HashMap::new(),
            resolve_mode: ResolveMode::Strict,
        };
        env.add_filter("default_if_none", crate::engine::filters::default_if_none);
        env.add_filter("yes_no", crate::engine::filters::yes_no);
        env.add_function("range", builtin_range);
        env.add_function("len", builtin_len);
        env
    }

    pub fn with_resolve_mode(mut self, mode: ResolveMode) -> Environment {
        self.resolve_mode = mode;
        self
    }

    pub fn add_filter(
        &mut self,
        name: &str,
        filter: impl Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.filters.insert(name.to_string(), Box::new(filter));
    }

    pub fn add_function(
        &mut self,
        name: &str,
        function: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.functions.insert(name.to_string(), Box::new(function));
    }

    pub(crate) fn filter(&self, name: &str) -> Result<&FilterFn> {
        self.filters
            .get(name)
            .ok_or_else(|| EngineError::UnknownFilter(name.to_string()))
    }

    pub(crate) fn function(&self, name: &str) -> Option<&FunctionFn> {
        self.functions.get(name)
    }

    pub(crate) fn resolve_mode(&self) -> &ResolveMode {
        &self.resolve_mode
    }

    /// Attribute access on a value. Only objects have attributes.
    pub fn get_attr(&self, obj: &Value, name: &str) -> Result<Value> {
        match obj {
            Value::Object(map) => map.get(name).cloned().ok_or_else(|| EngineError::Attribute {
                attr: name.to_string(),
                value: obj.to_string(),
            }),
            _ => Err(EngineError::Attribute {
                attr: name.to_string(),
                value: obj.to_string(),
            }),
        }
    }

    /// Index access on a value. Arrays take integers (negative counts from
    /// the end), objects take strings.
    pub fn get_item(&self, obj: &Value, key: &Value) -> Result<Value> {
        let missing = || EngineError::Item {
            key: key.to_string(),
            value: obj.to_string(),
        };
        match obj {
            Value::Array(items) => {
                let index = key.as_i64().ok_or_else(missing)?;
                let index = if index < 0 {
                    index + items.len() as i64
                } else {
                    index
                };
                if index < 0 {
                    return Err(missing());
                }
                items.get(index as usize).cloned().ok_or_else(missing)
            }
            Value::Object(map) => {
                let name = key.as_str().ok_or_else(missing)?;
                map.get(name).cloned().ok_or_else(missing)
            }
            _ => Err(missing()),
        }
    }
}

/// Expression evaluation context: root data plus a stack of loop scopes.
///
/// Lookups walk the scope stack innermost-first, then the root data, then
/// fall back to the environment's resolve mode.
pub struct Context<'a> {
    env: &'a Environment,
    data: &'a Value,
    scopes: Vec<HashMap<String, Value>>,
}

impl<'a> Context<'a> {
    pub fn new(env: &'a Environment, data: &'a Value) -> Context<'a> {
        Context {
            env,
            data,
            scopes: Vec::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        self.env
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind a name in the innermost scope. A scope must be active.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.scopes
            .last_mut()
            .expect("bind without an active scope")
            .insert(name.to_string(), value);
    }

    pub fn resolve(&self, name: &str) -> Result<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(map) = self.data.as_object() {
            if let Some(value) = map.get(name) {
                return Ok(value.clone());
            }
        }
        match self.env.resolve_mode() {
            ResolveMode::Strict => Err(EngineError::UnresolvedVariable(name.to_string())),
            ResolveMode::Permissive(default) => Ok(default.clone()),
        }
    }
}

/// Iteration state bound as `loop` inside each loop pass.
pub fn loop_metadata(index0: usize, length: usize) -> Value {
    json!({
        "index": index0 + 1,
        "index0": index0,
        "revindex": length - index0,
        "revindex0": length - index0 - 1,
        "first": index0 == 0,
        "last": index0 + 1 == length,
        "length": length,
    })
}

fn builtin_range(args: &[Value]) -> Result<Value> {
    let bounds = match args {
        [end] => (0, as_int(end)?),
        [start, end] => (as_int(start)?, as_int(end)?),
        _ => {
            return Err(EngineError::Type(
                "range expects one or two integer arguments".to_string(),
            ));
        }
    };
    Ok(Value::Array((bounds.0..bounds.1).map(Value::from).collect()))
}

fn builtin_len(args: &[Value]) -> Result<Value> {
    let [value] = args else {
        return Err(EngineError::Type("len expects one argument".to_string()));
    };
    let length = match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::String(s) => s.chars().count(),
        _ => {
            return Err(EngineError::Type(format!(
                "value {} has no length",
                value
            )));
        }
    };
    Ok(Value::from(length))
}

fn as_int(value: &Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| EngineError::Type(format!("expected an integer, got {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_shadowing() {
        let env = Environment::new();
        let data = json!({"x": 1, "y": 2});
        let mut ctx = Context::new(&env, &data);
        ctx.push_scope();
        ctx.bind("x", json!(10));
        assert_eq!(ctx.resolve("x").unwrap(), json!(10));
        assert_eq!(ctx.resolve("y").unwrap(), json!(2));
        ctx.pop_scope();
        assert_eq!(ctx.resolve("x").unwrap(), json!(1));
    }

    #[test]
    fn test_resolve_modes() {
        let data = json!({});
        let strict = Environment::new();
        assert!(Context::new(&strict, &data).resolve("missing").is_err());

        let permissive = Environment::new().with_resolve_mode(ResolveMode::Permissive(json!(null)));
        assert_eq!(
            Context::new(&permissive, &data).resolve("missing").unwrap(),
            json!(null)
        );
    }

    #[test]
    fn test_negative_index_counts_from_end() {
        let env = Environment::new();
        let items = json!([1, 2, 3]);
        assert_eq!(env.get_item(&items, &json!(-1)).unwrap(), json!(3));
        assert!(env.get_item(&items, &json!(-4)).is_err());
    }

    #[test]
    fn test_builtin_range_and_len() {
        assert_eq!(builtin_range(&[json!(3)]).unwrap(), json!([0, 1, 2]));
        assert_eq!(builtin_range(&[json!(1), json!(3)]).unwrap(), json!([1, 2]));
        assert_eq!(builtin_len(&[json!([1, 2])]).unwrap(), json!(2));
        assert!(builtin_len(&[json!(5)]).is_err());
    }

    #[test]
    fn test_loop_metadata() {
        let meta = loop_metadata(0, 3);
        assert_eq!(meta["index"], json!(1));
        assert_eq!(meta["revindex0"], json!(2));
        assert_eq!(meta["first"], json!(true));
        assert_eq!(meta["last"], json!(false));
    }
}
