//! Assemble the facilitator from a [`FacilitatorConfig`].
//!
//! Opens the stores, funds the genesis accounts, validates webhook targets and
//! wires the observer hooks. Any failure here is fatal at startup.

use std::sync::Arc;

use x402::ledger::InMemoryLedger;
use x402::nonce_store::{NonceStore, SqliteNonceStore};
use x402::verification_store::{
    InMemoryVerificationStore, SqliteVerificationStore, VerificationStore,
};
use x402::{Facilitator, X402Error};

use crate::config::FacilitatorConfig;
use crate::metrics::MetricsHook;
use crate::state::AppState;
use crate::webhook::{self, WebhookHook};

/// Build the shared [`AppState`].
///
/// The nonce store is always SQLite: in-memory nonces are lost on restart,
/// which would let any recently settled authorization be replayed.
pub fn build_state(config: &FacilitatorConfig) -> Result<AppState, X402Error> {
    let nonce_store: Arc<dyn NonceStore> = match SqliteNonceStore::open(&config.nonce_db_path) {
        Ok(store) => {
            tracing::info!("Nonce store: SQLite at {}", config.nonce_db_path);
            Arc::new(store)
        }
        Err(e) => {
            return Err(X402Error::StoreError(format!(
                "failed to open nonce store at {}: {e}",
                config.nonce_db_path
            )))
        }
    };

    let ledger =
        InMemoryLedger::new(config.chain.clone(), config.owner).with_nonce_store(nonce_store);
    for (account, amount) in &config.genesis {
        ledger.mint(config.owner, *account, *amount)?;
    }
    if !config.genesis.is_empty() {
        tracing::info!(
            accounts = config.genesis.len(),
            supply = %ledger.total_supply(),
            "genesis balances minted"
        );
    }

    let verifications: Arc<dyn VerificationStore> = match &config.verification_db_path {
        Some(path) => {
            let store = SqliteVerificationStore::open(path).map_err(|e| {
                X402Error::StoreError(format!("failed to open verification store at {path}: {e}"))
            })?;
            tracing::info!("Verification store: SQLite at {path}");
            Arc::new(store)
        }
        None => {
            tracing::info!("Verification store: in-memory");
            Arc::new(InMemoryVerificationStore::new())
        }
    };

    let mut facilitator = Facilitator::new(Arc::new(ledger))
        .with_verification_store(verifications)
        .with_verification_ttl(config.verification_ttl_secs)
        .with_settle_timeout(config.settle_timeout)
        .with_hook(Arc::new(MetricsHook));

    if !config.webhook_urls.is_empty() {
        webhook::validate_webhook_urls(&config.webhook_urls)?;
        tracing::info!("Webhook URLs configured: {}", config.webhook_urls.len());
        let hook = WebhookHook::new(
            webhook::webhook_client()?,
            config.webhook_urls.clone(),
            config.chain.network.clone(),
        )
        .with_signing_key(WebhookHook::derive_signing_key(&config.hmac_secret)?);
        facilitator = facilitator.with_hook(Arc::new(hook));
    }

    Ok(AppState::new(facilitator, config.hmac_secret.clone())
        .with_metrics_token(config.metrics_token.clone())
        .with_public_metrics(config.public_metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_genesis;
    use alloy::primitives::{Address, U256};

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn config(dir: &tempfile::TempDir, extra: &[(&str, String)]) -> FacilitatorConfig {
        let nonce_db = dir.path().join("nonces.db").to_string_lossy().into_owned();
        // Earlier entries win, so overrides go first
        let mut pairs = extra.to_vec();
        pairs.extend([
            ("FACILITATOR_PRIVATE_KEY", KEY.to_string()),
            ("FACILITATOR_SHARED_SECRET", "x".repeat(32)),
            ("NONCE_DB_PATH", nonce_db),
        ]);
        FacilitatorConfig::from_lookup(move |key| {
            pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn test_genesis_is_minted_by_owner() {
        let dir = tempfile::tempdir().unwrap();
        let genesis = "0x1111111111111111111111111111111111111111:1000000000";
        let config = config(&dir, &[("LEDGER_GENESIS", genesis.to_string())]);
        assert_eq!(config.genesis, parse_genesis(genesis).unwrap());

        let state = build_state(&config).unwrap();
        assert_eq!(
            state.ledger().balance(Address::repeat_byte(0x11)),
            U256::from(1_000_000_000u64)
        );
        assert_eq!(state.ledger().owner(), config.owner);
        assert!(dir.path().join("nonces.db").exists());
    }

    #[test]
    fn test_sqlite_verification_store_selected_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verifications.db").to_string_lossy().into_owned();
        let config = config(&dir, &[("VERIFICATION_DB_PATH", path)]);

        let state = build_state(&config).unwrap();
        assert_eq!(state.facilitator.pending_verifications(), 0);
        assert!(dir.path().join("verifications.db").exists());
    }

    #[test]
    fn test_private_webhook_refuses_to_boot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            &dir,
            &[("WEBHOOK_URLS", "https://127.0.0.1/hook".to_string())],
        );
        assert!(matches!(build_state(&config), Err(X402Error::ConfigError(_))));
    }

    #[test]
    fn test_unopenable_nonce_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no/such/dir/nonces.db").to_string_lossy().into_owned();
        let config = config(&dir, &[("NONCE_DB_PATH", missing)]);
        assert!(matches!(build_state(&config), Err(X402Error::StoreError(_))));
    }
}
