//! Interceptors around verify and settle.
//!
//! Hooks see the requirement and payload by shared reference only. They may
//! observe every outcome and, before settlement, refuse it; they cannot alter
//! what gets settled.

use std::sync::Arc;

use crate::{
    ErrorReason, PaymentHash, PaymentPayload, PaymentRequirements, SettleResponse,
    VerifyResponse, X402Error,
};

pub struct VerifyContext<'a> {
    pub requirements: &'a PaymentRequirements,
    pub payload: &'a PaymentPayload,
    pub payment_hash: PaymentHash,
}

pub struct SettleContext<'a> {
    pub requirements: &'a PaymentRequirements,
    pub payload: &'a PaymentPayload,
    pub payment_hash: PaymentHash,
    /// When the payload was verified; `None` if it never was.
    pub verified_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    Continue,
    Abort(String),
}

/// How a settlement attempt ended without success.
#[derive(Debug)]
pub enum SettleFailure<'a> {
    /// A structured rejection (ordering, hook abort or ledger business rule).
    Rejected(ErrorReason),
    /// Infrastructure failure; the outcome may be unknown.
    Error(&'a X402Error),
}

pub trait FacilitatorHook: Send + Sync {
    fn name(&self) -> &str;

    /// Runs after every verification, valid or not.
    fn after_verify(&self, _ctx: &VerifyContext<'_>, _result: &VerifyResponse) {}

    /// Runs once the payload is admitted for settlement, before the ledger is touched.
    fn before_settle(&self, _ctx: &SettleContext<'_>) -> HookDecision {
        HookDecision::Continue
    }

    fn after_settle_success(&self, _ctx: &SettleContext<'_>, _result: &SettleResponse) {}

    fn after_settle_failure(&self, _ctx: &SettleContext<'_>, _failure: &SettleFailure<'_>) {}
}

/// Hooks in registration order.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn FacilitatorHook>>,
}

impl HookChain {
    pub fn push(&mut self, hook: Arc<dyn FacilitatorHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn after_verify(&self, ctx: &VerifyContext<'_>, result: &VerifyResponse) {
        for hook in &self.hooks {
            hook.after_verify(ctx, result);
        }
    }

    /// First abort wins; later hooks are not consulted.
    pub fn before_settle(&self, ctx: &SettleContext<'_>) -> HookDecision {
        for hook in &self.hooks {
            if let HookDecision::Abort(reason) = hook.before_settle(ctx) {
                tracing::warn!(
                    hook = hook.name(),
                    hash = %ctx.payment_hash,
                    reason = %reason,
                    "settlement aborted by hook"
                );
                return HookDecision::Abort(reason);
            }
        }
        HookDecision::Continue
    }

    pub fn after_settle_success(&self, ctx: &SettleContext<'_>, result: &SettleResponse) {
        for hook in &self.hooks {
            hook.after_settle_success(ctx, result);
        }
    }

    pub fn after_settle_failure(&self, ctx: &SettleContext<'_>, failure: &SettleFailure<'_>) {
        for hook in &self.hooks {
            hook.after_settle_failure(ctx, failure);
        }
    }
}
