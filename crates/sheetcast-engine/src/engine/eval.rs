//! Tree-walking evaluation of placeholder expressions.

use serde_json::Value;

use crate::engine::context::Context;
use crate::engine::expr::{CallArg, Expr};
use crate::error::{EngineError, Result};

/// Evaluate an expression against a context.
pub fn eval(expr: &Expr, ctx: &Context) -> Result<Value> {
    match expr {
        Expr::Const(value) => Ok(value.clone()),
        Expr::StrConst(text) => Ok(Value::String(text.clone())),
        Expr::Var(name) => ctx.resolve(name),
        Expr::GetAttr { obj, name } => {
            let obj = eval(obj, ctx)?;
            ctx.env().get_attr(&obj, name)
        }
        Expr::GetItem { obj, key } => {
            let obj = eval(obj, ctx)?;
            let key = eval(key, ctx)?;
            ctx.env().get_item(&obj, &key)
        }
        Expr::Call { obj, args } => {
            let Expr::Var(name) = obj.as_ref() else {
                return Err(EngineError::Type(
                    "only registered functions can be called".to_string(),
                ));
            };
            let function = ctx
                .env()
                .function(name)
                .ok_or_else(|| EngineError::NotCallable(name.clone()))?;
            let args = eval_args(args, ctx)?;
            function(&args)
        }
        Expr::Filter { obj, name, args } => {
            let value = eval(obj, ctx)?;
            let filter = ctx.env().filter(name)?;
            let args = eval_args(args, ctx)?;
            filter(&value, &args)
        }
        Expr::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&to_display(&eval(part, ctx)?));
            }
            Ok(Value::String(out))
        }
        Expr::ToStr(inner) => Ok(Value::String(to_display(&eval(inner, ctx)?))),
    }
}

fn eval_args(args: &[CallArg], ctx: &Context) -> Result<Vec<Value>> {
    args.iter()
        .map(|arg| match arg {
            CallArg::Pos(expr) => eval(expr, ctx),
            CallArg::Named(name, _) => Err(EngineError::Type(format!(
                "named argument '{}' is not supported here",
                name
            ))),
        })
        .collect()
}

/// Truthiness of a value: null, false, zero, and empty containers or
/// strings are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Display form of a value as cell text. Null renders empty.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
