use alloy::primitives::U256;
use thiserror::Error;

use crate::response::ErrorReason;

/// Errors returned by x402 operations.
///
/// Business-rule rejections never travel through this type; they are reported as
/// structured [`VerifyResponse`](crate::VerifyResponse) / [`SettleResponse`](crate::SettleResponse)
/// values. An `X402Error` means the input was malformed or the outcome is unknown.
#[derive(Debug, Error)]
pub enum X402Error {
    #[error("ledger error: {0}")]
    LedgerError(LedgerError),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Failure to turn a signature into a signer address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature must be 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("signature recovery failed: {0}")]
    Recovery(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Rejections produced by the ledger's state transitions.
///
/// The variants that map to an [`ErrorReason`] are definite: the ledger did not
/// mutate. [`LedgerError::Unavailable`] is an infrastructure failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("authorization is not yet valid")]
    NotYetValid,

    #[error("authorization is expired")]
    Expired,

    #[error("authorization is used")]
    NonceAlreadyUsed,

    #[error("invalid signature length: {0} bytes")]
    InvalidSignatureLength(usize),

    #[error("invalid signature")]
    InvalidSignatureRecovery,

    #[error("transfer amount exceeds balance (available {available}, required {required})")]
    InsufficientBalance { available: U256, required: U256 },

    #[error("transfer to the zero address")]
    InvalidRecipient,

    #[error("caller is not the owner")]
    NotOwner,

    #[error("total supply overflow")]
    SupplyOverflow,

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Structured reason for business-rule rejections; `None` for infrastructure failures.
    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            LedgerError::NotYetValid => Some(ErrorReason::AuthorizationNotYetValid),
            LedgerError::Expired => Some(ErrorReason::AuthorizationExpired),
            LedgerError::NonceAlreadyUsed => Some(ErrorReason::NonceAlreadyUsed),
            LedgerError::InvalidSignatureLength(_) => Some(ErrorReason::InvalidSignatureLength),
            LedgerError::InvalidSignatureRecovery => Some(ErrorReason::InvalidSignatureRecovery),
            LedgerError::InsufficientBalance { .. } => Some(ErrorReason::InsufficientBalance),
            LedgerError::InvalidRecipient => Some(ErrorReason::InvalidRecipient),
            LedgerError::NotOwner => Some(ErrorReason::NotOwner),
            LedgerError::SupplyOverflow => Some(ErrorReason::SupplyOverflow),
            LedgerError::Unavailable(_) => None,
        }
    }
}

impl From<SignatureError> for LedgerError {
    fn from(e: SignatureError) -> Self {
        match e {
            SignatureError::InvalidLength(len) => LedgerError::InvalidSignatureLength(len),
            SignatureError::Recovery(_) | SignatureError::Signing(_) => {
                LedgerError::InvalidSignatureRecovery
            }
        }
    }
}

impl From<LedgerError> for X402Error {
    fn from(e: LedgerError) -> Self {
        X402Error::LedgerError(e)
    }
}
