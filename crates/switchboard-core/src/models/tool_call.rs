use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const TARGET_KEYS: &[&str] = &[
    "target_capability_id",
    "capability_id",
    "service_id",
    "capability",
    "service",
    "server",
];
const ACTION_KEYS: &[&str] = &["action", "tool", "tool_name", "name"];
const PARAMETER_KEYS: &[&str] = &["parameters", "params", "arguments", "args"];

/// Parameter names that carry a structured query, in lookup order.
pub const QUERY_KEYS: &[&str] = &["query", "sql", "statement"];

/// A single capability invocation requested by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub target_capability_id: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    pub fn new(target: impl Into<String>, action: impl Into<String>, parameters: Value) -> Self {
        Self {
            target_capability_id: target.into(),
            action: action.into(),
            parameters: match parameters {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    /// Build a tool call from loosely shaped oracle output.
    ///
    /// Accepts the usual aliases for the target and action, and merges
    /// `parameters` / `params` / `arguments` plus any loose top-level keys
    /// into the single `parameters` map. Explicit parameter objects win over
    /// loose keys.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| format!("tool call must be an object, got: {}", value))?;

        let target = first_string(obj, TARGET_KEYS)
            .ok_or_else(|| format!("tool call has no target capability: {}", value))?;
        let action = first_string(obj, ACTION_KEYS)
            .ok_or_else(|| format!("tool call has no action: {}", value))?;

        let mut parameters = Map::new();
        for (key, val) in obj {
            let known = TARGET_KEYS.contains(&key.as_str())
                || ACTION_KEYS.contains(&key.as_str())
                || PARAMETER_KEYS.contains(&key.as_str());
            if !known {
                parameters.insert(key.clone(), val.clone());
            }
        }
        for key in PARAMETER_KEYS {
            match obj.get(*key) {
                Some(Value::Object(explicit)) => {
                    for (k, v) in explicit {
                        parameters.insert(k.clone(), v.clone());
                    }
                }
                // Some models send the arguments as a JSON-encoded string.
                Some(Value::String(encoded)) => {
                    if let Ok(Value::Object(explicit)) = serde_json::from_str::<Value>(encoded) {
                        parameters.extend(explicit);
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            target_capability_id: target,
            action,
            parameters,
        })
    }

    /// Name of the parameter holding the structured query as a string.
    pub fn query_key(&self) -> Option<&'static str> {
        QUERY_KEYS
            .iter()
            .copied()
            .find(|k| self.parameters.get(*k).map_or(false, Value::is_string))
    }

    /// The structured query carried by this call, if any.
    pub fn query_text(&self) -> Option<&str> {
        self.query_key()
            .and_then(|k| self.parameters.get(k))
            .and_then(Value::as_str)
    }
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
