//! Capability call envelopes.
//!
//! Request: `{"action", "parameters", "timestamp"}`.
//! Response: `{"service_id", "action", "parameters", "status", "result" | "error", "timestamp"}`.
//! Capabilities that skip the envelope and answer with a bare JSON body are
//! accepted too; the whole body then becomes the payload.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::InvocationErrorKind;

#[derive(Debug, Serialize)]
pub struct RequestEnvelope<'a> {
    pub action: &'a str,
    pub parameters: &'a Map<String, Value>,
    pub timestamp: String,
}

impl<'a> RequestEnvelope<'a> {
    pub fn new(action: &'a str, parameters: &'a Map<String, Value>) -> Self {
        Self {
            action,
            parameters,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Extract the payload from a decoded response body.
pub fn unwrap_response(body: Value) -> Result<Value, (InvocationErrorKind, String)> {
    let status = body.get("status").and_then(|s| s.as_str()).map(str::to_lowercase);
    match status.as_deref() {
        Some("error") => {
            let message = body
                .get("error")
                .map(|e| match e {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "capability reported an error".to_string());
            Err((InvocationErrorKind::Remote, message))
        }
        Some("success") => match body {
            Value::Object(mut obj) => Ok(obj.remove("result").unwrap_or(Value::Object(obj))),
            other => Ok(other),
        },
        _ => Ok(body),
    }
}

/// Decode a response body, mapping parse failures to `MalformedResponse`.
pub fn decode_response(text: &str) -> Result<Value, (InvocationErrorKind, String)> {
    let body: Value = serde_json::from_str(text.trim()).map_err(|e| {
        let preview: String = text.chars().take(200).collect();
        (
            InvocationErrorKind::MalformedResponse,
            format!("invalid JSON ({}): {}", e, preview),
        )
    })?;
    unwrap_response(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_shape() {
        let params = json!({"query": "rust"});
        let envelope = RequestEnvelope::new("web_search", params.as_object().unwrap());
        let v = serde_json::to_value(&envelope).unwrap();
        assert_eq!(v["action"], "web_search");
        assert_eq!(v["parameters"]["query"], "rust");
        assert!(chrono::DateTime::parse_from_rfc3339(v["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_success_envelope_yields_result() {
        let payload = decode_response(
            r#"{"service_id": "s", "status": "success", "result": {"rows": [1]}, "timestamp": "t"}"#,
        )
        .unwrap();
        assert_eq!(payload, json!({"rows": [1]}));
    }

    #[test]
    fn test_error_envelope_is_remote_error() {
        let (kind, message) =
            decode_response(r#"{"status": "error", "error": "index offline"}"#).unwrap_err();
        assert_eq!(kind, InvocationErrorKind::Remote);
        assert_eq!(message, "index offline");
    }

    #[test]
    fn test_bare_body_and_garbage() {
        assert_eq!(decode_response("[1, 2]").unwrap(), json!([1, 2]));
        let (kind, _) = decode_response("<html>oops</html>").unwrap_err();
        assert_eq!(kind, InvocationErrorKind::MalformedResponse);
    }
}
