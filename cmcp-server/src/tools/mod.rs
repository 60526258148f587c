//! The Canton/DAML tool catalogue.
//!
//! Tools are declared here and registered once at startup. Registration
//! order fixes the `tools/list` and discovery ordering.

pub mod authorize;
pub mod echo;
pub mod validate;

use std::sync::Arc;

use cmcp::tool::Tool;

/// Builds the full tool set, in listing order.
#[must_use]
pub fn catalogue() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(echo::EchoTool),
        Arc::new(validate::ValidateDamlTool),
        Arc::new(authorize::DebugAuthorizationTool),
        Arc::new(authorize::SuggestPatternTool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmcp::registry::ToolRegistry;

    #[test]
    fn test_catalogue_registers_cleanly() {
        let registry = ToolRegistry::build(catalogue()).unwrap();
        assert_eq!(registry.len(), 4);
        assert!(registry.lookup("echo").is_some());
        assert!(registry.lookup("validate_daml_business_logic").is_some());
        assert!(registry.lookup("debug_authorization_failure").is_some());
        assert!(registry.lookup("suggest_authorization_pattern").is_some());
    }

    #[test]
    fn test_every_pricing_mode_is_exercised() {
        let models: Vec<String> = catalogue()
            .iter()
            .map(|tool| tool.pricing().advert().model)
            .collect();
        assert!(models.contains(&"free".to_owned()));
        assert!(models.contains(&"fixed".to_owned()));
        assert!(models.contains(&"dynamic".to_owned()));
    }
}
