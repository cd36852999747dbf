//! Verify → settle lifecycle over a [`Ledger`].
//!
//! Per payment hash the facilitator moves through
//! `Unverified → Verified(t) → {Settled | SettlementFailed} → Unverified`.
//! A verification record admits one settlement attempt within the TTL; the
//! ledger's nonce record is what actually prevents a second transfer.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};

use crate::clock::{Clock, SystemClock};
use crate::hooks::{
    FacilitatorHook, HookChain, HookDecision, SettleContext, SettleFailure, VerifyContext,
};
use crate::ledger::Ledger;
use crate::signer::SignerRegistry;
use crate::verification_store::{InMemoryVerificationStore, VerificationStore};
use crate::{
    ChainConfig, ErrorReason, PaymentHash, PaymentPayload, PaymentRequirements, SchemeFacilitator,
    SettleResponse, SignatureError, VerifyResponse, X402Error, DEFAULT_SETTLE_TIMEOUT_SECS,
    DEFAULT_VERIFICATION_TTL_SECS, X402_VERSION,
};

/// Facilitator: verifies payloads read-only and settles verified ones on the ledger.
pub struct Facilitator<L> {
    ledger: L,
    signers: SignerRegistry,
    /// Pluggable store of successful verifications.
    verifications: Arc<dyn VerificationStore>,
    clock: Arc<dyn Clock>,
    hooks: HookChain,
    verification_ttl_secs: u64,
    /// Upper bound on one ledger submission.
    settle_timeout: Duration,
}

impl<L> Facilitator<L> {
    /// Create a facilitator with the `exact` signer, an in-memory verification
    /// store and the wall clock.
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            signers: SignerRegistry::with_defaults(),
            verifications: Arc::new(InMemoryVerificationStore::new()),
            clock: Arc::new(SystemClock),
            hooks: HookChain::default(),
            verification_ttl_secs: DEFAULT_VERIFICATION_TTL_SECS,
            settle_timeout: Duration::from_secs(DEFAULT_SETTLE_TIMEOUT_SECS),
        }
    }

    pub fn with_signers(mut self, signers: SignerRegistry) -> Self {
        self.signers = signers;
        self
    }

    /// Set a custom verification store (e.g. SqliteVerificationStore).
    pub fn with_verification_store(mut self, store: Arc<dyn VerificationStore>) -> Self {
        self.verifications = store;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Append a hook. Hooks run in the order they were added.
    pub fn with_hook(mut self, hook: Arc<dyn FacilitatorHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_verification_ttl(mut self, secs: u64) -> Self {
        self.verification_ttl_secs = secs;
        self
    }

    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn signers(&self) -> &SignerRegistry {
        &self.signers
    }

    pub fn verification_ttl_secs(&self) -> u64 {
        self.verification_ttl_secs
    }

    /// Number of verification records awaiting settlement.
    pub fn pending_verifications(&self) -> usize {
        self.verifications.len()
    }

    /// Start a background task that purges expired verification records every 60 seconds.
    /// Settlement re-checks the TTL itself, so this only bounds memory.
    pub fn start_cache_cleanup(&self) {
        let store = Arc::clone(&self.verifications);
        let clock = Arc::clone(&self.clock);
        let ttl = self.verification_ttl_secs;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                match store.purge_expired(clock.now(), ttl) {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "purged expired verifications"),
                    Err(e) => tracing::error!(error = %e, "verification purge failed"),
                }
            }
        });
    }
}

impl<L: Ledger> Facilitator<L> {
    pub fn config(&self) -> &ChainConfig {
        self.ledger.config()
    }

    /// The read-only checks behind `verify`, in order.
    async fn evaluate(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<VerifyResponse, X402Error> {
        let data = &payload.payload.authorization;
        let payer = Some(data.from);
        let reject = |reason: ErrorReason| -> Result<VerifyResponse, X402Error> {
            Ok(VerifyResponse::invalid(reason, payer))
        };

        // Malformed input is an error, not a verdict
        let auth = data.to_authorization()?;
        let required = requirements.required_amount()?;
        let config = self.ledger.config();

        if payload.x402_version != X402_VERSION {
            return reject(ErrorReason::UnsupportedVersion);
        }

        // 1. Scheme and network
        if payload.scheme != requirements.scheme || requirements.scheme != config.scheme_name {
            return reject(ErrorReason::InvalidScheme);
        }
        if payload.network != requirements.network || requirements.network != config.network {
            return reject(ErrorReason::InvalidNetwork);
        }
        let Some(signer) = self
            .signers
            .get(&requirements.scheme)
            .filter(|s| s.family() == config.namespace())
        else {
            return reject(ErrorReason::UnsupportedScheme);
        };

        // 2. Asset, amount, payee
        if requirements.asset != config.ledger_address {
            return reject(ErrorReason::AssetMismatch);
        }
        if auth.value != required {
            return reject(ErrorReason::AmountMismatch);
        }
        if auth.to != requirements.pay_to {
            return reject(ErrorReason::RecipientMismatch);
        }

        let now = U256::from(self.clock.now());
        if now <= auth.validAfter {
            return reject(ErrorReason::AuthorizationNotYetValid);
        }
        if now >= auth.validBefore {
            return reject(ErrorReason::AuthorizationExpired);
        }

        // 3. Signature, recovered locally and never submitted
        if let Err(e) = signer.verify(&auth, &payload.payload.signature, config) {
            tracing::info!(payer = %data.from, error = %e, "signature rejected");
            return reject(match e {
                SignatureError::InvalidLength(_) => ErrorReason::InvalidSignatureLength,
                _ => ErrorReason::InvalidSignatureRecovery,
            });
        }

        // 4. Balance
        let balance = self.ledger.balance_of(auth.from).await?;
        if balance < auth.value {
            tracing::info!(
                payer = %auth.from,
                balance = %balance,
                required = %auth.value,
                "payment rejected: insufficient balance"
            );
            return reject(ErrorReason::InsufficientBalance);
        }

        // 5. Nonce
        if self
            .ledger
            .authorization_state(auth.from, auth.nonce)
            .await?
        {
            tracing::warn!(
                nonce = %format!("{:.8}", auth.nonce),
                payer = %auth.from,
                "replayed nonce rejected"
            );
            return reject(ErrorReason::NonceAlreadyUsed);
        }

        Ok(VerifyResponse::valid(auth.from))
    }

    /// Evict before the ledger is involved. A store that cannot evict is an
    /// infrastructure failure and the attempt reports no verdict.
    fn evict(&self, ctx: &SettleContext<'_>) -> Result<(), X402Error> {
        self.verifications.remove(&ctx.payment_hash).map(|_| ()).inspect_err(|e| {
            tracing::error!(hash = %ctx.payment_hash, error = %e, "verification eviction failed");
            self.hooks.after_settle_failure(ctx, &SettleFailure::Error(e));
        })
    }

    fn reject(
        &self,
        ctx: &SettleContext<'_>,
        reason: ErrorReason,
        payer: Option<Address>,
    ) -> SettleResponse {
        self.hooks
            .after_settle_failure(ctx, &SettleFailure::Rejected(reason));
        SettleResponse::failed(reason, payer, &self.config().network)
    }
}

impl<L: Ledger> SchemeFacilitator for Facilitator<L> {
    async fn verify(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<VerifyResponse, X402Error> {
        let payment_hash = PaymentHash::of(payload)?;
        let response = self.evaluate(requirements, payload).await?;

        if response.is_valid {
            // Sole side effect of verification
            self.verifications.record(payment_hash, self.clock.now())?;
            tracing::info!(
                payer = ?response.payer,
                amount = %payload.payload.authorization.value,
                hash = %payment_hash,
                "payment verification succeeded"
            );
        } else {
            tracing::info!(
                payer = ?response.payer,
                reason = ?response.invalid_reason,
                "payment verification rejected"
            );
        }

        let ctx = VerifyContext {
            requirements,
            payload,
            payment_hash,
        };
        self.hooks.after_verify(&ctx, &response);
        Ok(response)
    }

    async fn settle(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<SettleResponse, X402Error> {
        let payment_hash = PaymentHash::of(payload)?;
        let payer = Some(payload.payload.authorization.from);
        let verified_at = self
            .verifications
            .get(&payment_hash)
            .inspect_err(|e| {
                tracing::error!(hash = %payment_hash, error = %e, "verification lookup failed")
            })?;
        let ctx = SettleContext {
            requirements,
            payload,
            payment_hash,
            verified_at,
        };

        let Some(verified_at) = verified_at else {
            tracing::warn!(
                hash = %payment_hash,
                payer = ?payer,
                "settlement attempted without verification"
            );
            return Ok(self.reject(&ctx, ErrorReason::NotVerified, payer));
        };

        let age = self.clock.now().saturating_sub(verified_at);
        if age > self.verification_ttl_secs {
            self.evict(&ctx)?;
            tracing::warn!(
                hash = %payment_hash,
                age,
                ttl = self.verification_ttl_secs,
                "verification expired before settlement"
            );
            return Ok(self.reject(&ctx, ErrorReason::VerificationExpired, payer));
        }

        let auth = match payload.payload.authorization.to_authorization() {
            Ok(auth) => auth,
            Err(e) => {
                self.evict(&ctx)?;
                self.hooks.after_settle_failure(&ctx, &SettleFailure::Error(&e));
                return Err(e);
            }
        };

        if let HookDecision::Abort(_) = self.hooks.before_settle(&ctx) {
            self.evict(&ctx)?;
            return Ok(self.reject(&ctx, ErrorReason::SettlementAborted, payer));
        }

        let submission = tokio::time::timeout(
            self.settle_timeout,
            self.ledger
                .authorize_and_transfer(&auth, &payload.payload.signature),
        )
        .await;

        let outcome = match submission {
            Ok(outcome) => outcome,
            Err(_) => {
                // No answer from the ledger: the record stays so the payload can be retried.
                let err = X402Error::Timeout(format!(
                    "ledger submission exceeded {}s",
                    self.settle_timeout.as_secs_f64()
                ));
                tracing::error!(
                    hash = %payment_hash,
                    payer = ?payer,
                    "settlement outcome unknown: ledger submission timed out"
                );
                self.hooks.after_settle_failure(&ctx, &SettleFailure::Error(&err));
                return Err(err);
            }
        };

        // The ledger answered, so this verification has had its one attempt.
        // Its outcome stands even if the record survives; the nonce blocks a repeat.
        if let Err(e) = self.verifications.remove(&payment_hash) {
            tracing::error!(
                hash = %payment_hash,
                error = %e,
                "failed to evict verification after ledger outcome"
            );
        }

        match outcome {
            Ok(receipt) => {
                let response = SettleResponse {
                    success: true,
                    error_reason: None,
                    payer,
                    transaction: Some(receipt.transaction.to_string()),
                    network: self.config().network.clone(),
                };
                tracing::info!(
                    payer = %receipt.from,
                    amount = %receipt.value,
                    nonce = %format!("{:.8}", receipt.nonce),
                    tx = %receipt.transaction,
                    "payment settled successfully"
                );
                self.hooks.after_settle_success(&ctx, &response);
                Ok(response)
            }
            Err(e) => match e.reason() {
                Some(reason) => {
                    tracing::warn!(
                        hash = %payment_hash,
                        payer = ?payer,
                        error = %e,
                        "ledger rejected settlement"
                    );
                    Ok(self.reject(&ctx, reason, payer))
                }
                None => {
                    tracing::error!(hash = %payment_hash, error = %e, "ledger submission failed");
                    let err = X402Error::from(e);
                    self.hooks.after_settle_failure(&ctx, &SettleFailure::Error(&err));
                    Err(err)
                }
            },
        }
    }
}
