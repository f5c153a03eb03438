//! Accessors for the schema-less parameter bag.
//!
//! Actions validate their own inputs on entry through these helpers so that a missing or
//! mistyped key surfaces as [`ActionError::Configuration`] naming the key, never as a panic.

use confluo_types::Params;
use serde_json::Value;

use crate::error::ActionError;

/// Returns the string stored under `key`, rejecting missing, non-string, and blank values.
pub fn require_str<'a>(params: &'a Params, key: &str) -> Result<&'a str, ActionError> {
    match params.get(key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.as_str()),
        Some(Value::String(_)) => Err(ActionError::configuration(key, "must not be empty")),
        Some(other) => Err(ActionError::configuration(key, format!("expected a string, found {}", type_name(other)))),
        None => Err(ActionError::configuration(key, "not found")),
    }
}

/// Returns the string stored under `key` when present.
///
/// A present value of another type is still a configuration error.
pub fn optional_str<'a>(params: &'a Params, key: &str) -> Result<Option<&'a str>, ActionError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.as_str())),
        Some(other) => Err(ActionError::configuration(key, format!("expected a string, found {}", type_name(other)))),
    }
}

/// Returns the non-negative integer stored under `key`.
pub fn require_u64(params: &Params, key: &str) -> Result<u64, ActionError> {
    match params.get(key) {
        Some(Value::Number(number)) => number
            .as_u64()
            .ok_or_else(|| ActionError::configuration(key, format!("expected a non-negative integer, found {number}"))),
        Some(other) => Err(ActionError::configuration(
            key,
            format!("expected an integer, found {}", type_name(other)),
        )),
        None => Err(ActionError::configuration(key, "not found")),
    }
}

/// Fills keys absent from `runtime` with the node's configured values.
///
/// Keys already present in the runtime bag (caller credentials, outputs of earlier nodes) win.
pub fn merge_params(runtime: &Params, configured: &Params) -> Params {
    let mut merged = runtime.clone();
    for (key, value) in configured {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
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
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn require_str_reports_the_offending_key() {
        let params = bag(json!({"token": "abc", "owner": 7, "repo": "  "}));

        assert_eq!(require_str(&params, "token"), Ok("abc"));
        assert!(matches!(
            require_str(&params, "owner"),
            Err(ActionError::Configuration { ref key, .. }) if key == "owner"
        ));
        assert!(matches!(
            require_str(&params, "repo"),
            Err(ActionError::Configuration { ref key, .. }) if key == "repo"
        ));
        assert!(matches!(
            require_str(&params, "missing"),
            Err(ActionError::Configuration { ref message, .. }) if message == "not found"
        ));
    }

    #[test]
    fn require_u64_rejects_strings_and_negatives() {
        let params = bag(json!({"lastIssue": 11, "negative": -1, "text": "11"}));

        assert_eq!(require_u64(&params, "lastIssue"), Ok(11));
        assert!(require_u64(&params, "negative").is_err());
        assert!(require_u64(&params, "text").is_err());
        assert!(require_u64(&params, "absent").is_err());
    }

    #[test]
    fn optional_str_allows_absence_and_null() {
        let params = bag(json!({"body": "hello", "empty": null, "wrong": true}));

        assert_eq!(optional_str(&params, "body"), Ok(Some("hello")));
        assert_eq!(optional_str(&params, "empty"), Ok(None));
        assert_eq!(optional_str(&params, "absent"), Ok(None));
        assert!(optional_str(&params, "wrong").is_err());
    }

    #[test]
    fn runtime_values_win_over_configured_values() {
        let runtime = bag(json!({"lastIssue": 42, "token": "secret"}));
        let configured = bag(json!({"lastIssue": 11, "commentBody": "thanks"}));

        let merged = merge_params(&runtime, &configured);
        assert_eq!(merged["lastIssue"], 42);
        assert_eq!(merged["token"], "secret");
        assert_eq!(merged["commentBody"], "thanks");
        assert_eq!(runtime.len(), 2, "runtime bag is not modified");
    }
}
