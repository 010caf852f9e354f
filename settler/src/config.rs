//! Settlement node configuration.
//!
//! Loaded from a JSON file named by `--config` (or the `CONFIG` environment
//! variable, defaulting to `./config.json`). Host and port fall back to the
//! `HOST` and `PORT` environment variables when the file omits them.
//!
//! # Environment Variable Resolution
//!
//! The [`LiteralOrEnv`] wrapper lets sensitive values be written either as
//! literals or as references to environment variables:
//!
//! ```json
//! {
//!   "rpc": "http://localhost:8545",    // Literal value
//!   "walletKey": "$WALLET_KEY",        // Simple env var
//!   "rpc2": "${SEPOLIA_RPC}"           // Braced env var
//! }
//! ```
//!
//! This keeps keys out of configuration files while still allowing them to
//! be resolved at startup.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use alloy_primitives::Address;
use cab_rs::engine::RepayRoute;
use clap::Parser;
use serde::Deserialize;
use url::Url;

/// CLI arguments for the settlement node.
#[derive(Parser, Debug)]
#[command(name = "cab-settler")]
#[command(about = "Cross-chain invoice settlement node")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    /// The chain this node settles on. It doubles as the sponsor chain id
    /// for the engine, so a single-chain deployment sponsors and settles
    /// against the same ledger.
    pub chain_id: u64,
    /// The paymaster contract address sponsorships are granted for.
    pub paymaster: Address,
    /// The signer whose signature authorizes sponsorships.
    pub trusted_signer: Address,
    /// Sponsor token to repayment route, keyed by token address.
    #[serde(default)]
    pub repay_routes: HashMap<Address, RepayRoute>,
    /// Invoice verifiers to install, keyed by their advertised address.
    #[serde(default)]
    pub verifiers: Vec<VerifierConfig>,
    /// Where settled funds are held and withdrawn from.
    #[serde(default)]
    pub vault: VaultConfig,
    /// RPC endpoint, required by event-proof verifiers and onchain vaults.
    #[serde(default)]
    pub rpc: Option<LiteralOrEnv<Url>>,
    /// Private key for the wallet that sends vault withdrawals.
    #[serde(default)]
    pub wallet_key: Option<LiteralOrEnv<String>>,
}

/// One installable invoice verifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VerifierConfig {
    /// Checks cross-chain event proofs against an onchain prover contract.
    EventProof { address: Address, prover: Address },
    /// Checks a detached signature from a trusted attestor.
    Attestation { address: Address, attestor: Address },
}

/// Vault backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VaultConfig {
    /// Process-local balances, for tests and dry runs.
    #[default]
    InMemory,
    /// A deployed vault contract withdrawals are sent to.
    Onchain { address: Address },
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("An event-proof verifier or onchain vault is configured but no rpc url is set")]
    MissingRpc,
    #[error("An onchain vault is configured but no wallet key is set")]
    MissingWalletKey,
    #[error("Failed to parse wallet key: {0}")]
    InvalidWalletKey(String),
}

impl Config {
    /// Get the port value.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the host value as an IpAddr.
    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Load configuration from the path named by CLI arguments.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument
    /// 2. `$CONFIG` environment variable
    /// 3. `./config.json`
    ///
    /// Values not present in the config file will be resolved via
    /// environment variables or defaults during deserialization.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

/// A transparent wrapper that resolves environment variables during
/// deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"http://localhost:8545"`
/// - Simple env var: `"$WALLET_KEY"`
/// - Braced env var: `"${WALLET_KEY}"`
///
/// The wrapper implements `Deref` to provide transparent access to the inner
/// type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    /// Get a reference to the inner value
    pub fn inner(&self) -> &T {
        &self.0
    }

    /// Parse environment variable syntax from a string.
    /// Returns the variable name if the string matches `$VAR` or `${VAR}` syntax.
    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if s.starts_with("${") && s.ends_with('}') {
            // ${VAR} syntax
            Some(s[2..s.len() - 1].to_string())
        } else if s.starts_with('$') && s.len() > 1 {
            // $VAR syntax - extract until first non-alphanumeric/underscore character
            let var_name = &s[1..];
            if var_name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(var_name.to_string())
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, s
                ))
            })?
        } else {
            s
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {}", e)))?;

        Ok(LiteralOrEnv(parsed))
    }
}
