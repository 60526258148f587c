//! MCP method result types.
//!
//! Covers the wire shapes returned by `initialize`, `tools/list`,
//! `resources/list`, `resources/read`, `prompts/list`, and `prompts/get`.
//! Field names are camelCase on the wire per the MCP specification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision this server implements.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Server identity returned from `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// A capability block with a `listChanged` flag.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCapability {
    /// Whether the server emits list-changed notifications.
    pub list_changed: bool,
}

/// Capabilities advertised from `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    /// Tool invocation support.
    pub tools: ListCapability,
    /// Read-only resource support.
    pub resources: ListCapability,
    /// Prompt template support.
    pub prompts: ListCapability,
    /// Log level control support.
    pub logging: Value,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: ListCapability::default(),
            resources: ListCapability::default(),
            prompts: ListCapability::default(),
            logging: Value::Object(Default::default()),
        }
    }
}

/// Result of the `initialize` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision.
    pub protocol_version: String,
    /// Advertised capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identity.
    pub server_info: ServerInfo,
}

/// Pricing advertisement attached to a tool descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingAdvert {
    /// Pricing model: `"free"`, `"fixed"`, or `"dynamic"`.
    pub model: String,

    /// Price in USD for fixed pricing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,

    /// Lower bound in USD for dynamic pricing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_usd: Option<f64>,

    /// Upper bound in USD for dynamic pricing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usd: Option<f64>,
}

/// A tool as listed by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Stable wire-visible tool name (snake_case).
    pub name: String,

    /// Short human description.
    pub description: String,

    /// JSON schema of accepted input. Property names are camelCase.
    pub input_schema: Value,

    /// JSON schema of the terminal structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Pricing advertisement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingAdvert>,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// All registered tools.
    pub tools: Vec<ToolDescriptor>,
}

/// A resource as listed by `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Resource URI (e.g. `canton://docs/transfer-pattern`).
    pub uri: String,

    /// Display name.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Result of `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// All available resources.
    pub resources: Vec<ResourceDescriptor>,
}

/// Content of one resource, returned from `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// URI the content belongs to.
    pub uri: String,

    /// MIME type of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Text content.
    pub text: String,
}

/// Result of `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Content blocks for the requested URI.
    pub contents: Vec<ResourceContents>,
}

/// An argument accepted by a prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
}

/// A prompt as listed by `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDescriptor {
    /// Prompt name.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Accepted template arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,
}

/// Result of `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPromptsResult {
    /// All available prompts.
    pub prompts: Vec<PromptDescriptor>,
}

/// Text content block inside a prompt message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PromptContent {
    /// Plain text.
    Text {
        /// The text value.
        text: String,
    },
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role (`"user"` or `"assistant"`).
    pub role: String,
    /// Message content.
    pub content: PromptContent,
}

/// Result of `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered messages.
    pub messages: Vec<PromptMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initialize_result_camel_case() {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_owned(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: "cmcp".to_owned(),
                version: "0.1.0".to_owned(),
            },
        };
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(encoded["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(encoded["capabilities"]["tools"]["listChanged"], json!(false));
        assert_eq!(encoded["serverInfo"]["name"], json!("cmcp"));
    }

    #[test]
    fn test_tool_descriptor_omits_absent_schema() {
        let descriptor = ToolDescriptor {
            name: "echo".to_owned(),
            description: "Echo".to_owned(),
            input_schema: json!({"type": "object"}),
            output_schema: None,
            pricing: None,
        };
        let encoded = serde_json::to_string(&descriptor).unwrap();
        assert!(encoded.contains("inputSchema"));
        assert!(!encoded.contains("outputSchema"));
    }
}
