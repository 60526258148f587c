//! Connectivity-check echo tool.

use cmcp::tool::{BoxFuture, Tool, ToolContext};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct EchoParams {
    user_input: String,
}

/// Free tool that echoes its input back, for client smoke tests.
#[derive(Debug, Clone, Copy)]
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echo a message back to verify server connectivity"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "userInput": {
                    "type": "string",
                    "description": "Message to echo back"
                }
            },
            "required": ["userInput"]
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "outputData": {"type": "string"}
            },
            "required": ["outputData"]
        }))
    }

    fn validate_params(&self, args: &Value) -> Result<(), String> {
        serde_json::from_value::<EchoParams>(args.clone())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn run(&self, ctx: ToolContext) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let params: EchoParams = match ctx.params_as() {
                Ok(params) => params,
                Err(e) => return ctx.error(&format!("Invalid parameters: {e}")).await,
            };
            ctx.structured(json!({"output_data": params.user_input}), None)
                .await;
        })
    }
}
