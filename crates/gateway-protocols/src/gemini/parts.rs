//! Gemini `Part` wire type and its mapping to canonical output parts.

use crate::adapter::{generate_call_id, opaque_text};
use gateway_core::{parse_arguments, OutputPart};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Inline base64 payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// MIME type
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    /// Base64 data
    pub data: String,
}

/// Reference to an uploaded or remote file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    /// MIME type
    #[serde(default, alias = "mime_type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// File URI
    #[serde(alias = "file_uri")]
    pub file_uri: String,
}

/// Model-issued function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallPart {
    /// Call id (newer API versions only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub args: Value,
}

/// Caller-supplied function result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponsePart {
    /// Call id (newer API versions only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name
    pub name: String,
    /// Result object
    #[serde(default)]
    pub response: Value,
}

/// Code emitted by the code execution tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableCode {
    /// Language, e.g. `PYTHON`
    #[serde(default)]
    pub language: String,
    /// Source
    #[serde(default)]
    pub code: String,
}

/// Result of the code execution tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeExecutionResult {
    /// Outcome, e.g. `OUTCOME_OK`
    #[serde(default)]
    pub outcome: String,
    /// Captured output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// One element of a Gemini `parts` array. Both camelCase and snake_case keys are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    /// Text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Marks `text` as a reasoning trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    /// Opaque reasoning signature
    #[serde(default, alias = "thought_signature", skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    /// Inline media
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// File media
    #[serde(default, alias = "file_data", skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
    /// Function call
    #[serde(default, alias = "function_call", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallPart>,
    /// Function response
    #[serde(default, alias = "function_response", skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponsePart>,
    /// Executable code
    #[serde(default, alias = "executable_code", skip_serializing_if = "Option::is_none")]
    pub executable_code: Option<ExecutableCode>,
    /// Code execution result
    #[serde(default, alias = "code_execution_result", skip_serializing_if = "Option::is_none")]
    pub code_execution_result: Option<CodeExecutionResult>,
    /// Keys this type does not model
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl GeminiPart {
    /// Text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Parse a JSON part; unparseable parts yield `None`
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Map through the tool-call translation table.
    ///
    /// Part kinds without a canonical counterpart become opaque text. Returns
    /// `None` only for parts with no content at all.
    #[must_use]
    pub fn into_output(self) -> Option<OutputPart> {
        if let Some(call) = self.function_call {
            return Some(OutputPart::tool_call(
                call.id.unwrap_or_else(generate_call_id),
                call.name,
                arguments_string(&call.args),
            ));
        }
        if let Some(result) = self.function_response {
            return Some(OutputPart::ToolResult {
                call_id: result.id.unwrap_or_default(),
                name: Some(result.name),
                content: result.response,
            });
        }
        if let Some(code) = self.executable_code {
            return Some(OutputPart::Code {
                language: code.language,
                code: code.code,
            });
        }
        if let Some(result) = self.code_execution_result {
            return Some(OutputPart::CodeResult {
                outcome: result.outcome,
                output: result.output.unwrap_or_default(),
            });
        }
        if self.thought == Some(true) || (self.text.is_none() && self.thought_signature.is_some()) {
            return Some(OutputPart::Thought {
                text: self.text.unwrap_or_default(),
                signature: self.thought_signature,
            });
        }
        if let Some(text) = self.text {
            return Some(OutputPart::text(text));
        }
        if self.inline_data.is_none() && self.file_data.is_none() && self.other.is_empty() {
            return None;
        }
        let opaque = serde_json::to_value(&self).unwrap_or(Value::Null);
        Some(OutputPart::text(opaque_text(&opaque)))
    }

    /// Inverse of [`GeminiPart::into_output`]
    #[must_use]
    pub fn from_output(part: &OutputPart) -> Self {
        match part {
            OutputPart::Text { text } => Self::text(text.clone()),
            OutputPart::Thought { text, signature } => Self {
                text: Some(text.clone()),
                thought: Some(true),
                thought_signature: signature.clone(),
                ..Self::default()
            },
            OutputPart::ToolCall {
                id,
                name,
                arguments,
            } => Self {
                function_call: Some(FunctionCallPart {
                    id: Some(id.clone()),
                    name: name.clone(),
                    args: args_object(arguments),
                }),
                ..Self::default()
            },
            OutputPart::ToolResult {
                call_id,
                name,
                content,
            } => Self {
                function_response: Some(FunctionResponsePart {
                    id: (!call_id.is_empty()).then(|| call_id.clone()),
                    name: name.clone().unwrap_or_default(),
                    response: response_object(content.clone()),
                }),
                ..Self::default()
            },
            OutputPart::Code { language, code } => Self {
                executable_code: Some(ExecutableCode {
                    language: language.clone(),
                    code: code.clone(),
                }),
                ..Self::default()
            },
            OutputPart::CodeResult { outcome, output } => Self {
                code_execution_result: Some(CodeExecutionResult {
                    outcome: outcome.clone(),
                    output: Some(output.clone()),
                }),
                ..Self::default()
            },
        }
    }

    /// Serialize to JSON
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn arguments_string(args: &Value) -> String {
    match args {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// Tool arguments as a Gemini `args` object
pub(crate) fn args_object(arguments: &str) -> Value {
    match parse_arguments(arguments) {
        Value::Object(obj) => Value::Object(obj),
        other => json!({ "value": other }),
    }
}

/// Gemini requires `functionResponse.response` to be an object
pub(crate) fn response_object(content: Value) -> Value {
    match content {
        Value::Object(obj) => Value::Object(obj),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(obj)) => Value::Object(obj),
            _ => json!({ "result": s }),
        },
        other => json!({ "result": other }),
    }
}
