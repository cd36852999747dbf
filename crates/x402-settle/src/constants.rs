use alloy::primitives::{address, Address};

/// Base Sepolia chain ID.
pub const CHAIN_ID: u64 = 84532;

/// CAIP-2 network identifier for Base Sepolia.
pub const NETWORK: &str = "eip155:84532";

/// x402 scheme name for single-use transfer authorizations.
pub const SCHEME_NAME: &str = "exact";

/// x402 protocol version accepted by the facilitator.
pub const X402_VERSION: u32 = 1;

/// Default ledger (verifying contract) address: USDC on Base Sepolia.
pub const DEFAULT_LEDGER_ADDRESS: Address = address!("0x036cbd53842c5426634e7929541ec2318f3dcf7e");

/// USDC has 6 decimal places.
pub const ASSET_DECIMALS: u32 = 6;

/// How long a successful verification stays admissible for settlement.
pub const DEFAULT_VERIFICATION_TTL_SECS: u64 = 300;

/// Upper bound on a single ledger submission before the outcome is treated as unknown.
pub const DEFAULT_SETTLE_TIMEOUT_SECS: u64 = 60;

/// Runtime ledger identity. Everything a signature is bound to lives here,
/// so two ledgers with different configs never accept each other's authorizations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub network: String,
    pub scheme_name: String,
    pub ledger_address: Address,
    pub asset_name: String,
    pub asset_decimals: u32,
    pub eip712_domain_name: String,
    pub eip712_domain_version: String,
}

impl ChainConfig {
    /// Namespace part of the CAIP-2 network id (`eip155` for `eip155:84532`).
    pub fn namespace(&self) -> &str {
        self.network.split(':').next().unwrap_or_default()
    }
}

impl Default for ChainConfig {
    /// Defaults to USDC on Base Sepolia.
    fn default() -> Self {
        Self {
            chain_id: CHAIN_ID,
            network: NETWORK.to_string(),
            scheme_name: SCHEME_NAME.to_string(),
            ledger_address: DEFAULT_LEDGER_ADDRESS,
            asset_name: "USDC".to_string(),
            asset_decimals: ASSET_DECIMALS,
            eip712_domain_name: "USD Coin".to_string(),
            eip712_domain_version: "2".to_string(),
        }
    }
}
