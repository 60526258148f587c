//! DAML business-logic validation tool.
//!
//! Structural checks of DAML code against the stated business intent:
//! template presence, signatory and observer declarations, and coverage
//! of declared security requirements.

use cmcp::pricing::Pricing;
use cmcp::tool::{BoxFuture, Tool, ToolContext};
use cmcp_proto::frame::LogLevel;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct ValidateParams {
    business_intent: String,
    daml_code: String,
    #[serde(default)]
    security_requirements: Vec<String>,
}

/// Fixed-price validation of DAML code against authorization conventions.
#[derive(Debug, Clone, Copy)]
pub struct ValidateDamlTool;

impl Tool for ValidateDamlTool {
    fn name(&self) -> &'static str {
        "validate_daml_business_logic"
    }

    fn description(&self) -> &'static str {
        "Validate DAML code against canonical authorization patterns and business requirements"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "businessIntent": {
                    "type": "string",
                    "description": "What the developer wants to achieve"
                },
                "damlCode": {
                    "type": "string",
                    "description": "DAML code to validate"
                },
                "securityRequirements": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Additional security requirements"
                }
            },
            "required": ["businessIntent", "damlCode"]
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "valid": {"type": "boolean"},
                "issues": {"type": "array", "items": {"type": "string"}},
                "suggestions": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["valid", "issues", "suggestions"]
        }))
    }

    fn pricing(&self) -> Pricing {
        Pricing::fixed(0.10)
    }

    fn validate_params(&self, args: &Value) -> Result<(), String> {
        serde_json::from_value::<ValidateParams>(args.clone())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn run(&self, ctx: ToolContext) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let params: ValidateParams = match ctx.params_as() {
                Ok(params) => params,
                Err(e) => return ctx.error(&format!("Invalid parameters: {e}")).await,
            };

            let mut issues = Vec::new();
            let mut suggestions = Vec::new();
            let code = params.daml_code.to_lowercase();
            let intent = params.business_intent.to_lowercase();

            ctx.progress(1, Some(3), "Checking template structure").await;
            if !code.contains("template") {
                issues.push("No template definition found in DAML code".to_owned());
            }

            ctx.progress(2, Some(3), "Checking authorization declarations")
                .await;
            if !code.contains("signatory") {
                issues.push(
                    "No signatory definition found - this may cause authorization issues"
                        .to_owned(),
                );
                suggestions
                    .push("Add signatory field to define who can create this contract".to_owned());
            }
            if !code.contains("observer") && intent.contains("disclosure") {
                suggestions
                    .push("Consider adding observers for data disclosure requirements".to_owned());
            }

            ctx.progress(3, Some(3), "Checking security requirements").await;
            for requirement in &params.security_requirements {
                if requirement.to_lowercase().contains("multi-party") && !code.contains("signatory")
                {
                    issues.push(format!(
                        "Security requirement '{requirement}' not addressed - missing multi-party authorization"
                    ));
                }
            }

            if ctx.is_cancelled() {
                return;
            }

            let valid = issues.is_empty();
            ctx.log(
                LogLevel::Info,
                &format!("validation finished: {} issue(s)", issues.len()),
            )
            .await;

            let summary = if valid {
                "DAML code passes structural authorization checks".to_owned()
            } else {
                format!("Found {} issue(s)", issues.len())
            };
            ctx.structured(
                json!({
                    "valid": valid,
                    "issues": issues,
                    "suggestions": suggestions,
                    "business_intent": params.business_intent,
                    "security_requirements": params.security_requirements,
                }),
                Some(summary),
            )
            .await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmcp_proto::frame::Frame;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    async fn run_with(args: Value) -> Vec<Frame> {
        let (tx, mut rx) = mpsc::channel(16);
        let ctx = ToolContext::new(
            "validate_daml_business_logic",
            args,
            tx,
            Arc::new(AtomicBool::new(false)),
            None,
        );
        ValidateDamlTool.run(ctx).await;

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_flags_missing_template_and_signatory() {
        let frames = run_with(json!({
            "business_intent": "transfer assets",
            "daml_code": "module Nothing where"
        }))
        .await;

        let Some(Frame::Structured { result, .. }) = frames.last() else {
            panic!("expected structured terminal");
        };
        assert_eq!(result["valid"], json!(false));
        let issues = result["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 2);
    }

    #[tokio::test]
    async fn test_well_formed_code_passes() {
        let frames = run_with(json!({
            "business_intent": "transfer assets",
            "daml_code": "template Transfer with sender: Party where signatory sender"
        }))
        .await;

        let Some(Frame::Structured { result, summary }) = frames.last() else {
            panic!("expected structured terminal");
        };
        assert_eq!(result["valid"], json!(true));
        assert!(summary.as_deref().unwrap().contains("passes"));
    }

    #[tokio::test]
    async fn test_multi_party_requirement_checked() {
        let frames = run_with(json!({
            "business_intent": "escrow",
            "daml_code": "template Escrow",
            "security_requirements": ["multi-party approval"]
        }))
        .await;

        let Some(Frame::Structured { result, .. }) = frames.last() else {
            panic!("expected structured terminal");
        };
        let issues = result["issues"].as_array().unwrap();
        assert!(issues
            .iter()
            .any(|i| i.as_str().unwrap().contains("multi-party")));
    }

    #[tokio::test]
    async fn test_progress_precedes_terminal() {
        let frames = run_with(json!({
            "business_intent": "transfer",
            "daml_code": "template T where signatory p"
        }))
        .await;

        assert!(frames.len() >= 4);
        assert!(frames[..frames.len() - 1].iter().all(|f| !f.is_terminal()));
        assert!(frames.last().unwrap().is_terminal());
    }
}
