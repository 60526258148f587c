//! Authorization analysis tools.
//!
//! Two tools share this module: failure analysis of DAML authorization
//! errors, and pattern suggestions for new workflows. Both run over the
//! same catalogue of canonical signatory/observer conventions.

use cmcp::pricing::Pricing;
use cmcp::tool::{BoxFuture, Tool, ToolContext};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct DebugParams {
    error_message: String,
    #[serde(default)]
    daml_code: Option<String>,
    #[serde(default)]
    context: Option<String>,
}

/// Fixed-price analysis of a DAML authorization failure.
#[derive(Debug, Clone, Copy)]
pub struct DebugAuthorizationTool;

impl Tool for DebugAuthorizationTool {
    fn name(&self) -> &'static str {
        "debug_authorization_failure"
    }

    fn description(&self) -> &'static str {
        "Debug DAML authorization errors with detailed analysis and suggested fixes"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "errorMessage": {
                    "type": "string",
                    "description": "The authorization error message"
                },
                "damlCode": {
                    "type": "string",
                    "description": "The DAML code that caused the error"
                },
                "context": {
                    "type": "string",
                    "description": "Additional context about the error"
                }
            },
            "required": ["errorMessage"]
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "analysis": {"type": "array", "items": {"type": "string"}},
                "suggestedFixes": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["analysis", "suggestedFixes"]
        }))
    }

    fn pricing(&self) -> Pricing {
        Pricing::fixed(0.05)
    }

    fn validate_params(&self, args: &Value) -> Result<(), String> {
        serde_json::from_value::<DebugParams>(args.clone())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn run(&self, ctx: ToolContext) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let params: DebugParams = match ctx.params_as() {
                Ok(params) => params,
                Err(e) => return ctx.error(&format!("Invalid parameters: {e}")).await,
            };

            let mut analysis = Vec::new();
            let mut fixes = Vec::new();
            let error = params.error_message.to_lowercase();

            if error.contains("missing authorization") {
                analysis.push("Authorization missing - likely signatory or observer issue".to_owned());
                fixes.push("Check that all required signatories are present".to_owned());
                fixes.push("Verify observer permissions for data access".to_owned());
            }
            if error.contains("signatory") {
                analysis.push("Signatory-related authorization failure".to_owned());
                fixes.push("Ensure all signatories have signed the transaction".to_owned());
                fixes.push("Check signatory definitions in template".to_owned());
            }
            if error.contains("observer") {
                analysis.push("Observer-related authorization failure".to_owned());
                fixes.push("Verify observer permissions".to_owned());
                fixes.push("Check if observer disclosure is properly configured".to_owned());
            }
            if analysis.is_empty() {
                analysis.push("No known authorization failure pattern matched".to_owned());
                fixes.push("Inspect the ledger's authorization trace for the failing exercise".to_owned());
            }

            ctx.structured(
                json!({
                    "error_message": params.error_message,
                    "analysis": analysis,
                    "suggested_fixes": fixes,
                    "daml_code_provided": params.daml_code.is_some(),
                    "context": params.context,
                }),
                None,
            )
            .await;
        })
    }
}

#[derive(Debug, Deserialize)]
struct SuggestParams {
    workflow_description: String,
    #[serde(default = "default_level")]
    security_level: String,
    #[serde(default)]
    constraints: Vec<String>,
}

fn default_level() -> String {
    "basic".to_owned()
}

/// Price scales with the requested security level: deeper review costs more.
fn pattern_price(args: &Value) -> f64 {
    match args.get("security_level").and_then(Value::as_str) {
        Some("enterprise") => 0.25,
        Some("enhanced") => 0.10,
        _ => 0.02,
    }
}

/// Dynamically priced suggestion of DAML authorization patterns.
#[derive(Debug, Clone, Copy)]
pub struct SuggestPatternTool;

impl Tool for SuggestPatternTool {
    fn name(&self) -> &'static str {
        "suggest_authorization_pattern"
    }

    fn description(&self) -> &'static str {
        "Suggest DAML authorization patterns based on workflow requirements"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workflowDescription": {
                    "type": "string",
                    "description": "The workflow to implement"
                },
                "securityLevel": {
                    "type": "string",
                    "enum": ["basic", "enhanced", "enterprise"],
                    "description": "Required security level"
                },
                "constraints": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Business or technical constraints"
                }
            },
            "required": ["workflowDescription"]
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "suggestedPatterns": {"type": "array"},
                "implementationNotes": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["suggestedPatterns", "implementationNotes"]
        }))
    }

    fn pricing(&self) -> Pricing {
        Pricing::dynamic(0.02, 0.25, pattern_price)
    }

    fn validate_params(&self, args: &Value) -> Result<(), String> {
        serde_json::from_value::<SuggestParams>(args.clone())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn run(&self, ctx: ToolContext) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let params: SuggestParams = match ctx.params_as() {
                Ok(params) => params,
                Err(e) => return ctx.error(&format!("Invalid parameters: {e}")).await,
            };

            ctx.progress(1, Some(2), "Matching workflow against known patterns")
                .await;

            let workflow = params.workflow_description.to_lowercase();
            let mut patterns = Vec::new();

            if workflow.contains("transfer") || workflow.contains("payment") {
                patterns.push(json!({
                    "name": "Asset Transfer Pattern",
                    "description": "Multi-party authorization for asset transfers",
                    "template_structure": ASSET_TRANSFER_TEMPLATE,
                    "authorization_logic": "Sender signs, receiver observes",
                }));
            }
            if workflow.contains("approval") || workflow.contains("workflow") {
                patterns.push(json!({
                    "name": "Multi-Step Approval Pattern",
                    "description": "Sequential approval workflow with multiple parties",
                    "template_structure": APPROVAL_TEMPLATE,
                    "authorization_logic": "Requester creates, approvers sign for approval",
                }));
            }

            ctx.progress(2, Some(2), "Deriving implementation notes").await;

            let mut notes = Vec::new();
            if params.security_level == "enhanced" {
                notes.push("Consider adding choice controllers for fine-grained access".to_owned());
                notes.push("Implement audit trails with observer patterns".to_owned());
            }
            if params.security_level == "enterprise" {
                notes.push("Add role-based access control".to_owned());
                notes.push("Implement compliance reporting mechanisms".to_owned());
                notes.push("Consider privacy features with observer restrictions".to_owned());
            }

            if ctx.is_cancelled() {
                return;
            }

            ctx.structured(
                json!({
                    "workflow_description": params.workflow_description,
                    "security_level": params.security_level,
                    "constraints": params.constraints,
                    "suggested_patterns": patterns,
                    "implementation_notes": notes,
                }),
                Some(format!("{} pattern(s) matched", patterns.len())),
            )
            .await;
        })
    }
}

const ASSET_TRANSFER_TEMPLATE: &str = "\
template AssetTransfer
  with
    sender: Party
    receiver: Party
    asset: Asset
    amount: Decimal
  where
    signatory sender
    observer receiver
";

const APPROVAL_TEMPLATE: &str = "\
template ApprovalRequest
  with
    requester: Party
    approvers: [Party]
    request: RequestData
  where
    signatory requester
    observer approvers
";
