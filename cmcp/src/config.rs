//! Environment-driven server configuration.
//!
//! All knobs come from environment variables with workable defaults; the
//! only hard requirements are the ones a misconfiguration would silently
//! break: an enabled payment rail must name its recipient, and enabled
//! telemetry must name its collector. Those fail startup instead.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::rails::canton::CantonRailConfig;
use crate::rails::evm::EvmRailConfig;
use crate::telemetry::DcapConfig;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 7284;

/// Resource and prompt content configuration.
#[derive(Debug, Clone)]
pub struct ContentConfig {
    /// Directory scanned for resource files.
    pub resource_dir: PathBuf,
    /// Directory scanned for prompt templates.
    pub prompt_dir: PathBuf,
    /// Rescan interval; `None` disables hot reload.
    pub reload_interval: Option<Duration>,
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Publicly advertised server URL.
    pub public_url: String,
    /// Listen port.
    pub port: u16,
    /// Log level filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Internal payment bypass key.
    pub internal_api_key: Option<String>,
    /// EVM rail, when enabled.
    pub evm: Option<EvmRailConfig>,
    /// Canton rail, when enabled.
    pub canton: Option<CantonRailConfig>,
    /// Telemetry, when enabled.
    pub dcap: Option<DcapConfig>,
    /// Resource and prompt content locations.
    pub content: ContentConfig,
}

impl ServerConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an enabled feature is missing a
    /// required variable or a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Loads configuration from an explicit variable map.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::from_env`].
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let env = Env(vars);

        let public_url = env.string("MCP_SERVER_URL", "http://localhost:7284");
        let port = match env.get("MCP_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar {
                var: "MCP_PORT",
                value: raw.to_owned(),
            })?,
            None => Url::parse(&public_url)
                .ok()
                .and_then(|u| u.port())
                .unwrap_or(DEFAULT_PORT),
        };

        let evm = if env.flag("X402_ENABLED", false) {
            let wallet_address = env.required("X402_WALLET_ADDRESS", "X402_ENABLED")?;
            Some(EvmRailConfig {
                facilitator_url: env.string("X402_FACILITATOR_URL", "https://x402.org/facilitator"),
                wallet_address,
                network: env.string("X402_NETWORK", "base-sepolia"),
                token: env.string("X402_TOKEN", "USDC"),
                verify_timeout: env.seconds("X402_VERIFICATION_TIMEOUT", 5)?,
                settle_timeout: env.seconds("X402_SETTLEMENT_TIMEOUT", 60)?,
            })
        } else {
            None
        };

        let canton = if env.flag("CANTON_ENABLED", false) {
            let facilitator_url = env.required("CANTON_FACILITATOR_URL", "CANTON_ENABLED")?;
            let payee_party = env.required("CANTON_PAYEE_PARTY", "CANTON_ENABLED")?;
            Some(CantonRailConfig {
                facilitator_url,
                payee_party,
                network: env.string("CANTON_NETWORK", "canton-testnet"),
                verify_timeout: env.seconds("X402_VERIFICATION_TIMEOUT", 5)?,
                settle_timeout: env.seconds("X402_SETTLEMENT_TIMEOUT", 60)?,
            })
        } else {
            None
        };

        // Telemetry defaults on, but stays off until a collector address
        // is configured.
        let dcap = match env.get("DCAP_MULTICAST_IP") {
            Some(ip_raw) if env.flag("DCAP_ENABLED", true) => {
                let ip: IpAddr = ip_raw.parse().map_err(|_| ConfigError::InvalidVar {
                    var: "DCAP_MULTICAST_IP",
                    value: ip_raw.to_owned(),
                })?;
                let dcap_port = match env.get("DCAP_PORT") {
                    Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar {
                        var: "DCAP_PORT",
                        value: raw.to_owned(),
                    })?,
                    None => 10191,
                };
                Some(DcapConfig {
                    target: SocketAddr::new(ip, dcap_port),
                    server_id: env.string("DCAP_SERVER_ID", "canton-mcp"),
                    server_name: env.string("DCAP_SERVER_NAME", "Canton MCP Server"),
                    discover_interval: env.seconds("DCAP_DISCOVER_INTERVAL_SEC", 300)?,
                })
            }
            _ => None,
        };

        Ok(Self {
            public_url,
            port,
            log_level: env.string("LOG_LEVEL", "info"),
            internal_api_key: env.get("X402_INTERNAL_API_KEY").map(str::to_owned).filter(|k| !k.is_empty()),
            evm,
            canton,
            dcap,
            content: ContentConfig {
                resource_dir: PathBuf::from(env.string("RESOURCE_DIR", "./resources")),
                prompt_dir: PathBuf::from(env.string("PROMPT_DIR", "./prompts")),
                reload_interval: match env.seconds("RESOURCE_RELOAD_SEC", 30)? {
                    d if d.is_zero() => None,
                    d => Some(d),
                },
            },
        })
    }

    /// The `/mcp` endpoint URL advertised in discovery records.
    #[must_use]
    pub fn mcp_endpoint(&self) -> String {
        format!("{}/mcp", self.public_url.trim_end_matches('/'))
    }
}

struct Env<'a>(&'a HashMap<String, String>);

impl Env<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_owned()
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(raw) => matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
            None => default,
        }
    }

    fn required(&self, var: &'static str, gate: &'static str) -> Result<String, ConfigError> {
        self.get(var)
            .map(str::to_owned)
            .ok_or(ConfigError::MissingVar { var, gate })
    }

    fn seconds(&self, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        match self.get(var) {
            Some(raw) => raw
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidVar {
                    var,
                    value: raw.to_owned(),
                }),
            None => Ok(Duration::from_secs(default)),
        }
    }
}
