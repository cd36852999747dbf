//! Facilitator configuration from the environment.
//!
//! `main` loads `.env` with dotenvy first; [`FacilitatorConfig::from_lookup`]
//! takes any key lookup so tests never touch the process environment.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use x402::{ChainConfig, X402Error, DEFAULT_SETTLE_TIMEOUT_SECS, DEFAULT_VERIFICATION_TTL_SECS};

pub const DEFAULT_PORT: u16 = 4022;
pub const DEFAULT_RATE_LIMIT_RPM: u64 = 120;
pub const DEFAULT_NONCE_DB_PATH: &str = "./x402-nonces.db";

/// Runtime settings for the facilitator binary.
pub struct FacilitatorConfig {
    /// Ledger owner, derived from `FACILITATOR_PRIVATE_KEY`. Only this identity can mint.
    pub owner: Address,
    pub hmac_secret: Vec<u8>,
    pub port: u16,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub webhook_urls: Vec<String>,
    /// Bearer token for `/metrics`, separate from the HMAC secret.
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
    pub nonce_db_path: String,
    /// Unset keeps verification records in memory.
    pub verification_db_path: Option<String>,
    pub verification_ttl_secs: u64,
    pub settle_timeout: Duration,
    pub chain: ChainConfig,
    /// Balances minted by the owner at startup.
    pub genesis: Vec<(Address, U256)>,
}

impl FacilitatorConfig {
    pub fn from_env() -> Result<Self, X402Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, X402Error> {
        // Empty values count as unset
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let key = var("FACILITATOR_PRIVATE_KEY").ok_or_else(|| {
            X402Error::ConfigError("FACILITATOR_PRIVATE_KEY is required".to_string())
        })?;
        let signer: PrivateKeySigner = key
            .parse()
            .map_err(|_| X402Error::ConfigError("invalid FACILITATOR_PRIVATE_KEY".to_string()))?;

        let hmac_secret = var("FACILITATOR_SHARED_SECRET")
            .ok_or_else(|| {
                X402Error::ConfigError(
                    "FACILITATOR_SHARED_SECRET is required (e.g. `openssl rand -hex 32`)"
                        .to_string(),
                )
            })?
            .into_bytes();
        if hmac_secret.len() < 32 {
            tracing::warn!(
                "FACILITATOR_SHARED_SECRET is only {} bytes (minimum 32 recommended)",
                hmac_secret.len()
            );
        }

        let port = match var("FACILITATOR_PORT").or_else(|| var("PORT")) {
            Some(p) => parse_number(&p, "FACILITATOR_PORT")?,
            None => DEFAULT_PORT,
        };
        let rate_limit_rpm = match var("RATE_LIMIT_RPM") {
            Some(r) => parse_number(&r, "RATE_LIMIT_RPM")?,
            None => DEFAULT_RATE_LIMIT_RPM,
        };
        let verification_ttl_secs = match var("VERIFICATION_TTL_SECS") {
            Some(t) => parse_number(&t, "VERIFICATION_TTL_SECS")?,
            None => DEFAULT_VERIFICATION_TTL_SECS,
        };
        let settle_timeout_secs = match var("SETTLE_TIMEOUT_SECS") {
            Some(t) => parse_number(&t, "SETTLE_TIMEOUT_SECS")?,
            None => DEFAULT_SETTLE_TIMEOUT_SECS,
        };

        let mut chain = ChainConfig::default();
        if let Some(id) = var("CHAIN_ID") {
            chain.chain_id = parse_number(&id, "CHAIN_ID")?;
            chain.network = format!("eip155:{}", chain.chain_id);
        }
        if let Some(network) = var("X402_NETWORK") {
            chain.network = network;
        }
        if let Some(address) = var("LEDGER_ADDRESS") {
            chain.ledger_address = address
                .parse()
                .map_err(|_| X402Error::ConfigError(format!("invalid LEDGER_ADDRESS: {address}")))?;
        }

        let genesis = match var("LEDGER_GENESIS") {
            Some(raw) => parse_genesis(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            owner: signer.address(),
            hmac_secret,
            port,
            rate_limit_rpm,
            allowed_origins: var("ALLOWED_ORIGINS").map(|v| parse_list(&v)).unwrap_or_default(),
            webhook_urls: var("WEBHOOK_URLS").map(|v| parse_list(&v)).unwrap_or_default(),
            metrics_token: var("METRICS_TOKEN").map(String::into_bytes),
            public_metrics: var("X402_PUBLIC_METRICS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            nonce_db_path: var("NONCE_DB_PATH")
                .unwrap_or_else(|| DEFAULT_NONCE_DB_PATH.to_string()),
            verification_db_path: var("VERIFICATION_DB_PATH"),
            verification_ttl_secs,
            settle_timeout: Duration::from_secs(settle_timeout_secs),
            chain,
            genesis,
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, X402Error> {
    raw.parse()
        .map_err(|_| X402Error::ConfigError(format!("invalid {key}: {raw}")))
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `0xADDR:AMOUNT,0xADDR:AMOUNT` (amounts in base units).
pub fn parse_genesis(raw: &str) -> Result<Vec<(Address, U256)>, X402Error> {
    parse_list(raw)
        .iter()
        .map(|entry| {
            let (address, amount) = entry.split_once(':').ok_or_else(|| {
                X402Error::ConfigError(format!(
                    "LEDGER_GENESIS entry '{entry}' is not address:amount"
                ))
            })?;
            let address: Address = address.trim().parse().map_err(|_| {
                X402Error::ConfigError(format!("invalid genesis address '{address}'"))
            })?;
            let amount: U256 = amount.trim().parse().map_err(|_| {
                X402Error::ConfigError(format!("invalid genesis amount '{amount}'"))
            })?;
            Ok((address, amount))
        })
        .collect()
}
