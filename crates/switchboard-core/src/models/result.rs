use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::tool_call::ToolCall;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Why an invocation produced an error result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvocationErrorKind {
    Timeout,
    Connection,
    HttpStatus,
    MalformedResponse,
    UnknownCapability,
    /// The capability answered with `"status": "error"`.
    Remote,
    /// The safety validator refused the query; nothing was sent.
    Rejected,
}

impl std::fmt::Display for InvocationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            InvocationErrorKind::Timeout => "timeout",
            InvocationErrorKind::Connection => "connection",
            InvocationErrorKind::HttpStatus => "http_status",
            InvocationErrorKind::MalformedResponse => "malformed_response",
            InvocationErrorKind::UnknownCapability => "unknown_capability",
            InvocationErrorKind::Remote => "remote",
            InvocationErrorKind::Rejected => "rejected",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of one invoked tool call. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub capability_id: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<InvocationErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl CapabilityResult {
    pub fn success(call: &ToolCall, payload: Value) -> Self {
        Self {
            capability_id: call.target_capability_id.clone(),
            action: call.action.clone(),
            parameters: call.parameters.clone(),
            status: ResultStatus::Success,
            payload: Some(payload),
            error: None,
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(call: &ToolCall, kind: InvocationErrorKind, message: impl Into<String>) -> Self {
        Self {
            capability_id: call.target_capability_id.clone(),
            action: call.action.clone(),
            parameters: call.parameters.clone(),
            status: ResultStatus::Error,
            payload: None,
            error: Some(format!("{}: {}", kind, message.into())),
            error_kind: Some(kind),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// The raw form fed to the normalizer, shaped like a capability response envelope.
    pub fn to_raw(&self) -> Value {
        let mut raw = serde_json::json!({
            "service_id": self.capability_id,
            "action": self.action,
            "parameters": self.parameters,
            "status": self.status,
            "timestamp": self.timestamp.to_rfc3339(),
        });
        if let Some(ref payload) = self.payload {
            raw["result"] = payload.clone();
        }
        if let Some(ref error) = self.error {
            raw["error"] = Value::String(error.clone());
        }
        raw
    }
}
