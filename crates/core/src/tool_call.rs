//! Normalized provider tool calls and the results sent back for them.

use serde::Serialize;
use serde_json::{Map, Value};

/// A provider's function-invocation request, normalized across providers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub call_id: String,
    pub args: Map<String, Value>,
}

/// The closed set of functions the bridge knows how to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolName {
    ShowOnBoard,
    GenerateDiagram,
    Unknown(String),
}

impl From<&str> for ToolName {
    fn from(name: &str) -> Self {
        match name {
            "show_on_board" => Self::ShowOnBoard,
            "generate_diagram" => Self::GenerateDiagram,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl ToolCall {
    pub fn new(name: impl Into<String>, call_id: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            call_id: call_id.into(),
            args,
        }
    }

    pub fn tool(&self) -> ToolName {
        ToolName::from(self.name.as_str())
    }

    /// Returns a string argument, if present.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// The arguments re-encoded as a JSON string, as the client expects them.
    pub fn args_json(&self) -> String {
        Value::Object(self.args.clone()).to_string()
    }
}

/// The result object reported to the provider for a tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl ToolResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            error: None,
            error_details: None,
        }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// A failure explained with a human-readable `message`.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// A failure carrying an `error` string.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::ok()
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }

    /// The result as a JSON object.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_name_dispatch_is_closed() {
        assert_eq!(ToolName::from("show_on_board"), ToolName::ShowOnBoard);
        assert_eq!(ToolName::from("generate_diagram"), ToolName::GenerateDiagram);
        assert_eq!(ToolName::from("foo"), ToolName::Unknown("foo".to_string()));
        assert_eq!(ToolName::from(""), ToolName::Unknown(String::new()));
    }

    #[test]
    fn test_str_arg() {
        let args = json!({"prompt": "a right triangle", "size": 3});
        let call = ToolCall::new("generate_diagram", "call_1", args.as_object().unwrap().clone());
        assert_eq!(call.str_arg("prompt"), Some("a right triangle"));
        assert_eq!(call.str_arg("size"), None);
        assert_eq!(call.str_arg("missing"), None);
    }

    #[test]
    fn test_tool_result_omits_unset_fields() {
        assert_eq!(ToolResult::ok().to_value(), json!({"success": true}));
        assert_eq!(
            ToolResult::failed("Unknown function: foo").to_value(),
            json!({"success": false, "error": "Unknown function: foo"})
        );
        assert_eq!(
            ToolResult::rejected("Diagram generation failed.")
                .with_details("boom")
                .to_value(),
            json!({
                "success": false,
                "message": "Diagram generation failed.",
                "error_details": "boom"
            })
        );
    }
}
