//! MCP Tool and Resource Types
//!
//! Owned shapes for what a session returns, independent of the SDK's model
//! types, plus the conversions from `rmcp::model`.

use rmcp::model::{CallToolResult, RawContent, ReadResourceResult, Resource, ResourceContents, Tool};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Tool descriptor as advertised by a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: Option<String>,
    /// Input schema (JSON Schema)
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    /// Set the input schema
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Create from rmcp `Tool`
    pub fn from_tool(tool: &Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool
                .description
                .as_ref()
                .map(std::string::ToString::to_string),
            input_schema: serde_json::to_value(&tool.input_schema).unwrap_or(Value::Null),
        }
    }

    /// Function-calling descriptor understood by chat completion APIs.
    #[must_use]
    pub fn to_function_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "input_schema": self.input_schema,
            }
        })
    }
}

/// Resource descriptor as advertised by a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource URI
    pub uri: String,
    /// Resource name
    #[serde(default)]
    pub name: String,
    /// Resource description
    #[serde(default)]
    pub description: Option<String>,
    /// MIME type
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    /// Create from rmcp `Resource`
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            uri: resource.raw.uri.clone(),
            name: resource.raw.name.clone(),
            description: resource.raw.description.clone(),
            mime_type: resource.raw.mime_type.clone(),
        }
    }
}

/// One block of tool output or resource contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        mime_type: String,
    },
    Audio {
        data: String,
        mime_type: String,
    },
    Resource {
        uri: String,
        #[serde(default)]
        mime_type: Option<String>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        blob: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text payload, if this block carries one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Resource { text, .. } => text.as_deref(),
            _ => None,
        }
    }

    fn from_resource_contents(contents: &ResourceContents) -> Self {
        match contents {
            ResourceContents::TextResourceContents {
                uri,
                mime_type,
                text,
                ..
            } => Self::Resource {
                uri: uri.clone(),
                mime_type: mime_type.clone(),
                text: Some(text.clone()),
                blob: None,
            },
            ResourceContents::BlobResourceContents {
                uri,
                mime_type,
                blob,
                ..
            } => Self::Resource {
                uri: uri.clone(),
                mime_type: mime_type.clone(),
                text: None,
                blob: Some(blob.clone()),
            },
        }
    }
}

/// Result of a `call_tool` request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Output blocks in server order
    pub content: Vec<ContentBlock>,
    /// Whether the tool itself reported failure
    #[serde(default)]
    pub is_error: bool,
    /// Structured result, for tools that declare an output schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolOutput {
    /// Successful output made of a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
            structured_content: None,
        }
    }

    /// Create from rmcp `CallToolResult`
    #[must_use]
    pub fn from_result(result: &CallToolResult) -> Self {
        let mut content = Vec::with_capacity(result.content.len());

        for item in &result.content {
            match &item.raw {
                RawContent::Text(t) => content.push(ContentBlock::text(t.text.clone())),
                RawContent::Image(img) => content.push(ContentBlock::Image {
                    data: img.data.clone(),
                    mime_type: img.mime_type.clone(),
                }),
                RawContent::Audio(audio) => content.push(ContentBlock::Audio {
                    data: audio.data.clone(),
                    mime_type: audio.mime_type.clone(),
                }),
                RawContent::Resource(res) => {
                    content.push(ContentBlock::from_resource_contents(&res.resource));
                }
                RawContent::ResourceLink(link) => content.push(ContentBlock::Resource {
                    uri: link.uri.clone(),
                    mime_type: link.mime_type.clone(),
                    text: None,
                    blob: None,
                }),
            }
        }

        Self {
            content,
            is_error: result.is_error.unwrap_or(false),
            structured_content: result.structured_content.clone(),
        }
    }

    /// Text blocks joined by newlines
    #[must_use]
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of a `read_resource` request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceReadout {
    pub contents: Vec<ContentBlock>,
}

impl ResourceReadout {
    /// Create from rmcp `ReadResourceResult`
    #[must_use]
    pub fn from_result(result: &ReadResourceResult) -> Self {
        Self {
            contents: result
                .contents
                .iter()
                .map(ContentBlock::from_resource_contents)
                .collect(),
        }
    }

    /// Text of the first content block, the common single-document case.
    pub fn first_text(&self) -> Option<&str> {
        self.contents.first().and_then(ContentBlock::as_text)
    }
}

/// Format tool output for display
#[must_use]
pub fn format_tool_output(output: &ToolOutput) -> String {
    let mut rendered = String::new();

    if output.is_error {
        rendered.push_str("Error:\n");
    }

    for (i, block) in output.content.iter().enumerate() {
        if i > 0 {
            rendered.push('\n');
        }

        match block {
            ContentBlock::Text { text } => rendered.push_str(text),
            ContentBlock::Image { mime_type, .. } => {
                rendered.push_str(&format!("[Image: {mime_type}]"));
            }
            ContentBlock::Audio { mime_type, .. } => {
                rendered.push_str(&format!("[Audio: {mime_type}]"));
            }
            ContentBlock::Resource { uri, text, .. } => {
                rendered.push_str(&format!("[Resource: {uri}]"));
                if let Some(t) = text {
                    rendered.push_str(&format!("\n{t}"));
                }
            }
        }
    }

    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_function_schema_shape() {
        let tool = ToolDescriptor::new("add", "Add two numbers").with_input_schema(json!({
            "type": "object",
            "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
            "required": ["a", "b"]
        }));

        let schema = tool.to_function_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "add");
        assert_eq!(schema["function"]["description"], "Add two numbers");
        assert_eq!(schema["function"]["input_schema"]["required"], json!(["a", "b"]));
    }

    #[test]
    fn test_tool_descriptor_accepts_camel_case_schema() {
        let tool: ToolDescriptor = serde_json::from_str(
            r#"{"name": "echo", "description": "Echo input", "inputSchema": {"type": "object"}}"#,
        )
        .unwrap();
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_text_content_skips_binary_blocks() {
        let output = ToolOutput {
            content: vec![
                ContentBlock::text("first"),
                ContentBlock::Image {
                    data: "aGk=".into(),
                    mime_type: "image/png".into(),
                },
                ContentBlock::text("second"),
            ],
            ..Default::default()
        };
        assert_eq!(output.text_content(), "first\nsecond");
    }

    #[test]
    fn test_from_result_keeps_structured_content() {
        let result = CallToolResult::structured(json!({"sum": 3}));

        let output = ToolOutput::from_result(&result);

        assert_eq!(output.structured_content, Some(json!({"sum": 3})));
        assert_eq!(output.text_content(), r#"{"sum":3}"#);
        assert!(!output.is_error);

        let plain = ToolOutput::text("ok");
        assert!(plain.structured_content.is_none());
        assert_eq!(
            serde_json::to_value(&plain).unwrap(),
            json!({"content": [{"type": "text", "text": "ok"}], "is_error": false})
        );
    }

    #[test]
    fn test_format_error_output() {
        let mut output = ToolOutput::text("division by zero");
        output.is_error = true;
        assert_eq!(format_tool_output(&output), "Error:\ndivision by zero");
    }

    #[test]
    fn test_format_resource_block() {
        let output = ToolOutput {
            content: vec![ContentBlock::Resource {
                uri: "config://app".into(),
                mime_type: None,
                text: Some("debug = true".into()),
                blob: None,
            }],
            ..Default::default()
        };
        assert_eq!(format_tool_output(&output), "[Resource: config://app]\ndebug = true");
    }

    #[test]
    fn test_readout_first_text() {
        let readout = ResourceReadout {
            contents: vec![ContentBlock::Resource {
                uri: "config://app".into(),
                mime_type: Some("text/plain".into()),
                text: Some("App configuration here".into()),
                blob: None,
            }],
        };
        assert_eq!(readout.first_text(), Some("App configuration here"));
        assert_eq!(ResourceReadout::default().first_text(), None);
    }
}
