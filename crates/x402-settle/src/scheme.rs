//! Facilitator-side contract of the payment model.
//!
//! See [`crate::facilitator::Facilitator`] for the ledger-backed implementation.

use crate::error::X402Error;
use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::response::{SettleResponse, VerifyResponse};

/// Facilitator-side scheme: verifies and settles payments.
///
/// Expected business failures come back as `Ok` with `is_valid = false` /
/// `success = false`. `Err` is reserved for malformed input and for failures
/// whose outcome is unknown (ledger unreachable, submission timeout).
///
/// # Security
/// `verify()` reads balances. It should not be exposed as an unauthenticated
/// endpoint, or anyone could probe arbitrary balances for free.
pub trait SchemeFacilitator: Send + Sync {
    /// Check a payload against the requirements without touching the ledger.
    fn verify(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> impl std::future::Future<Output = Result<VerifyResponse, X402Error>> + Send;

    /// Settle a previously verified payload.
    fn settle(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> impl std::future::Future<Output = Result<SettleResponse, X402Error>> + Send;
}
