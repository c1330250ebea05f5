//! Canonical string form of variable values.
//!
//! Variables are stored as [`serde_json::Value`] so extracted numbers,
//! booleans and nested structures keep their type. They are only
//! turned into text at the point where they are substituted into a
//! path, query value, header or body template.

use serde_json::Value;

pub trait ParamString {
    /// Decimal for numbers, `true`/`false` for booleans, the raw text
    /// for strings and compact JSON for everything else.
    fn to_param_string(&self) -> String;
}

impl ParamString for Value {
    fn to_param_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
            structured => structured.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(json!("abc").to_param_string(), "abc");
        assert_eq!(json!(42).to_param_string(), "42");
        assert_eq!(json!(-1.5).to_param_string(), "-1.5");
        assert_eq!(json!(true).to_param_string(), "true");
        assert_eq!(Value::Null.to_param_string(), "null");
    }

    #[test]
    fn test_structures_are_compact_json() {
        assert_eq!(json!({"a": [1, 2]}).to_param_string(), r#"{"a":[1,2]}"#);
        assert_eq!(json!(["x"]).to_param_string(), r#"["x"]"#);
    }
}
