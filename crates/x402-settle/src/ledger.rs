//! Token ledger with EIP-3009 style authorized transfers.
//!
//! [`InMemoryLedger`] keeps balances in process memory and delegates nonce
//! bookkeeping to a [`NonceStore`], so consumed authorizations can outlive a
//! restart when backed by SQLite. The [`Ledger`] trait is the slice of it the
//! facilitator consumes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{keccak256, Address, B256, U256};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::eip712;
use crate::nonce_store::{InMemoryNonceStore, NonceStore};
use crate::{ChainConfig, LedgerError, SignatureInput, TransferWithAuthorization, X402Error};

/// Ledger operations the settlement engine depends on.
pub trait Ledger: Send + Sync {
    /// Identity the ledger binds signatures to.
    fn config(&self) -> &ChainConfig;

    fn balance_of(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, LedgerError>> + Send;

    /// Whether `nonce` has been consumed for `authorizer`.
    fn authorization_state(
        &self,
        authorizer: Address,
        nonce: B256,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Execute a signed authorization. Either every effect is applied or none is.
    fn authorize_and_transfer(
        &self,
        auth: &TransferWithAuthorization,
        signature: &SignatureInput,
    ) -> impl Future<Output = Result<TransferReceipt, LedgerError>> + Send;
}

/// Outcome of a successful authorized transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transaction: B256,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub nonce: B256,
    pub sequence: u64,
}

/// Append-only record of ledger mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LedgerEvent {
    Mint { to: Address, amount: U256 },
    Transfer { from: Address, to: Address, value: U256 },
    AuthorizationUsed { authorizer: Address, nonce: B256 },
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, U256>,
    total_supply: U256,
    sequence: u64,
    events: Vec<LedgerEvent>,
}

impl LedgerState {
    fn balance(&self, account: &Address) -> U256 {
        self.balances.get(account).copied().unwrap_or(U256::ZERO)
    }

    /// Move `value` from `from` to `to`. Caller has already checked the balance.
    fn move_funds(&mut self, from: Address, to: Address, value: U256) {
        let from_balance = self.balance(&from);
        self.balances.insert(from, from_balance - value);
        // Total supply bounds every balance, so this cannot overflow.
        let to_balance = self.balance(&to);
        self.balances.insert(to, to_balance + value);
        self.events.push(LedgerEvent::Transfer { from, to, value });
    }
}

/// In-process ledger. All mutations go through one lock, so no partially
/// applied transfer is ever observable.
pub struct InMemoryLedger {
    config: ChainConfig,
    owner: Address,
    clock: Arc<dyn Clock>,
    nonces: Arc<dyn NonceStore>,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Create an empty ledger. `owner` is the only identity allowed to mint.
    pub fn new(config: ChainConfig, owner: Address) -> Self {
        Self {
            config,
            owner,
            clock: Arc::new(SystemClock),
            nonces: Arc::new(InMemoryNonceStore::new()),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set a custom nonce store (e.g. SqliteNonceStore for persistence).
    pub fn with_nonce_store(mut self, store: Arc<dyn NonceStore>) -> Self {
        self.nonces = store;
        self
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => {
                tracing::error!("ledger mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.state().balance(&account)
    }

    pub fn total_supply(&self) -> U256 {
        self.state().total_supply
    }

    pub fn is_nonce_used(
        &self,
        authorizer: Address,
        nonce: &B256,
    ) -> Result<bool, LedgerError> {
        self.nonces.is_used(authorizer, nonce).map_err(store_unavailable)
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state().events.clone()
    }

    /// Create `amount` new tokens for `to`. Owner-only; used for bootstrap funding.
    pub fn mint(&self, caller: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        if caller != self.owner {
            return Err(LedgerError::NotOwner);
        }
        if to == Address::ZERO {
            return Err(LedgerError::InvalidRecipient);
        }

        let mut state = self.state();
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow)?;
        let balance = state.balance(&to) + amount;
        state.total_supply = supply;
        state.balances.insert(to, balance);
        state.events.push(LedgerEvent::Mint { to, amount });

        tracing::info!(to = %to, amount = %amount, "minted");
        Ok(())
    }

    /// Direct transfer authenticated by the caller's identity.
    pub fn transfer(
        &self,
        caller: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let mut state = self.state();
        let available = state.balance(&caller);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        if to == Address::ZERO {
            return Err(LedgerError::InvalidRecipient);
        }
        state.move_funds(caller, to, amount);
        Ok(())
    }

    /// Execute a signed, time-bounded, nonce-scoped transfer.
    ///
    /// Checks run in a fixed order and all of them precede the first mutation:
    /// validity window, nonce, signature length, signer, balance, recipient.
    pub fn transfer_with_authorization(
        &self,
        auth: &TransferWithAuthorization,
        signature: &SignatureInput,
    ) -> Result<TransferReceipt, LedgerError> {
        let now = U256::from(self.clock.now());
        if now <= auth.validAfter {
            return Err(LedgerError::NotYetValid);
        }
        if now >= auth.validBefore {
            return Err(LedgerError::Expired);
        }

        let mut state = self.state();

        if self.is_nonce_used(auth.from, &auth.nonce)? {
            return Err(LedgerError::NonceAlreadyUsed);
        }

        let signer = eip712::recover_signer(auth, signature, &self.config)?;
        if signer != auth.from {
            return Err(LedgerError::InvalidSignatureRecovery);
        }

        let available = state.balance(&auth.from);
        if available < auth.value {
            return Err(LedgerError::InsufficientBalance {
                available,
                required: auth.value,
            });
        }
        if auth.to == Address::ZERO {
            return Err(LedgerError::InvalidRecipient);
        }

        // Another process sharing the nonce store may have claimed it since the check above.
        let claimed = self
            .nonces
            .try_use(auth.from, auth.nonce, self.clock.now())
            .map_err(store_unavailable)?;
        if !claimed {
            return Err(LedgerError::NonceAlreadyUsed);
        }

        state.move_funds(auth.from, auth.to, auth.value);
        state.events.push(LedgerEvent::AuthorizationUsed {
            authorizer: auth.from,
            nonce: auth.nonce,
        });
        state.sequence += 1;
        let sequence = state.sequence;

        let hash = eip712::signing_hash(auth, &self.config);
        let mut preimage = Vec::with_capacity(20 + 8 + 32);
        preimage.extend_from_slice(self.config.ledger_address.as_slice());
        preimage.extend_from_slice(&sequence.to_be_bytes());
        preimage.extend_from_slice(hash.as_slice());
        let transaction = keccak256(&preimage);

        tracing::debug!(
            from = %auth.from,
            to = %auth.to,
            value = %auth.value,
            nonce = %format!("{:.8}", auth.nonce),
            tx = %transaction,
            "authorization executed"
        );

        Ok(TransferReceipt {
            transaction,
            from: auth.from,
            to: auth.to,
            value: auth.value,
            nonce: auth.nonce,
            sequence,
        })
    }
}

/// A nonce store that cannot answer leaves the outcome unknown, never "used".
fn store_unavailable(e: X402Error) -> LedgerError {
    tracing::error!(error = %e, "nonce store failed");
    LedgerError::Unavailable(e.to_string())
}

impl Ledger for InMemoryLedger {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn balance_of(&self, account: Address) -> Result<U256, LedgerError> {
        Ok(self.balance(account))
    }

    async fn authorization_state(
        &self,
        authorizer: Address,
        nonce: B256,
    ) -> Result<bool, LedgerError> {
        self.is_nonce_used(authorizer, &nonce)
    }

    async fn authorize_and_transfer(
        &self,
        auth: &TransferWithAuthorization,
        signature: &SignatureInput,
    ) -> Result<TransferReceipt, LedgerError> {
        self.transfer_with_authorization(auth, signature)
    }
}

impl<L: Ledger> Ledger for Arc<L> {
    fn config(&self) -> &ChainConfig {
        (**self).config()
    }

    fn balance_of(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, LedgerError>> + Send {
        (**self).balance_of(account)
    }

    fn authorization_state(
        &self,
        authorizer: Address,
        nonce: B256,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send {
        (**self).authorization_state(authorizer, nonce)
    }

    fn authorize_and_transfer(
        &self,
        auth: &TransferWithAuthorization,
        signature: &SignatureInput,
    ) -> impl Future<Output = Result<TransferReceipt, LedgerError>> + Send {
        (**self).authorize_and_transfer(auth, signature)
    }
}
