//! Error types for the framework layers.

/// Errors raised while loading configuration from the environment.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A rail is enabled but a required variable is missing.
    #[error("{var} must be set when {gate} is enabled")]
    MissingVar {
        /// The missing variable.
        var: &'static str,
        /// The enable flag that made it required.
        gate: &'static str,
    },

    /// A variable holds a value that cannot be parsed.
    #[error("invalid value for {var}: {value}")]
    InvalidVar {
        /// The offending variable.
        var: &'static str,
        /// Its raw value.
        value: String,
    },
}

/// Errors raised while building the tool registry at startup.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Two tools were registered under the same name.
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    /// A tool declared an invalid pricing configuration.
    #[error("tool '{tool}' has invalid pricing: {reason}")]
    InvalidPricing {
        /// The offending tool.
        tool: String,
        /// Why the pricing was rejected.
        reason: String,
    },
}

/// Errors raised by facilitator rail clients.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RailError {
    /// The facilitator could not be reached or timed out.
    #[error("facilitator request failed: {0}")]
    Transport(String),

    /// The facilitator answered with a non-success HTTP status.
    #[error("facilitator returned {status}: {body}")]
    Facilitator {
        /// HTTP status code.
        status: u16,
        /// Response body, for the rejection reason.
        body: String,
    },

    /// The facilitator response could not be parsed.
    #[error("facilitator response parse error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for RailError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
