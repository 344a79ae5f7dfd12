//! Built-in value filters.

use serde_json::Value;

use crate::engine::eval::is_truthy;
use crate::error::{EngineError, Result};

/// `value | default_if_none(default)` - substitute `default` when the value
/// is null.
pub fn default_if_none(value: &Value, args: &[Value]) -> Result<Value> {
    let [default] = args else {
        return Err(EngineError::Type(
            "default_if_none expects a default value".to_string(),
        ));
    };
    Ok(if value.is_null() {
        default.clone()
    } else {
        value.clone()
    })
}

/// `value | yes_no(yes, no)` - pick one of two values by truthiness.
pub fn yes_no(value: &Value, args: &[Value]) -> Result<Value> {
    let [yes, no] = args else {
        return Err(EngineError::Type("yes_no expects two values".to_string()));
    };
    Ok(if is_truthy(value) {
        yes.clone()
    } else {
        no.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_if_none() {
        assert_eq!(default_if_none(&json!(null), &[json!(0)]).unwrap(), json!(0));
        assert_eq!(default_if_none(&json!(5), &[json!(0)]).unwrap(), json!(5));
        assert!(default_if_none(&json!(null), &[]).is_err());
    }

    #[test]
    fn test_yes_no() {
        let args = [json!("y"), json!("n")];
        assert_eq!(yes_no(&json!(true), &args).unwrap(), json!("y"));
        assert_eq!(yes_no(&json!(""), &args).unwrap(), json!("n"));
        assert_eq!(yes_no(&json!(0), &args).unwrap(), json!("n"));
    }
}
