use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Machine-readable reason attached to a failed verification or settlement.
///
/// Callers branch on these, so the set is closed and the wire names are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    UnsupportedVersion,
    InvalidScheme,
    InvalidNetwork,
    UnsupportedScheme,
    AssetMismatch,
    AmountMismatch,
    RecipientMismatch,
    AuthorizationNotYetValid,
    AuthorizationExpired,
    InvalidSignatureLength,
    InvalidSignatureRecovery,
    InsufficientBalance,
    NonceAlreadyUsed,
    InvalidRecipient,
    NotOwner,
    SupplyOverflow,
    /// Settle was called for a payload with no live verification record.
    NotVerified,
    /// The verification record outlived the TTL.
    VerificationExpired,
    /// A pre-settle hook refused the settlement.
    SettlementAborted,
}

impl ErrorReason {
    /// True for failures of the verify-before-settle protocol rather than of the payment itself.
    pub fn is_ordering(&self) -> bool {
        matches!(self, ErrorReason::NotVerified | ErrorReason::VerificationExpired)
    }

    /// Wire name, identical to the serde representation.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorReason::UnsupportedVersion => "unsupported_version",
            ErrorReason::InvalidScheme => "invalid_scheme",
            ErrorReason::InvalidNetwork => "invalid_network",
            ErrorReason::UnsupportedScheme => "unsupported_scheme",
            ErrorReason::AssetMismatch => "asset_mismatch",
            ErrorReason::AmountMismatch => "amount_mismatch",
            ErrorReason::RecipientMismatch => "recipient_mismatch",
            ErrorReason::AuthorizationNotYetValid => "authorization_not_yet_valid",
            ErrorReason::AuthorizationExpired => "authorization_expired",
            ErrorReason::InvalidSignatureLength => "invalid_signature_length",
            ErrorReason::InvalidSignatureRecovery => "invalid_signature_recovery",
            ErrorReason::InsufficientBalance => "insufficient_balance",
            ErrorReason::NonceAlreadyUsed => "nonce_already_used",
            ErrorReason::InvalidRecipient => "invalid_recipient",
            ErrorReason::NotOwner => "not_owner",
            ErrorReason::SupplyOverflow => "supply_overflow",
            ErrorReason::NotVerified => "not_verified",
            ErrorReason::VerificationExpired => "verification_expired",
            ErrorReason::SettlementAborted => "settlement_aborted",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::UnsupportedVersion => "unsupported x402 version",
            ErrorReason::InvalidScheme => "scheme mismatch",
            ErrorReason::InvalidNetwork => "network mismatch",
            ErrorReason::UnsupportedScheme => "no signer registered for scheme",
            ErrorReason::AssetMismatch => "asset mismatch",
            ErrorReason::AmountMismatch => "authorized value does not match required amount",
            ErrorReason::RecipientMismatch => "recipient mismatch",
            ErrorReason::AuthorizationNotYetValid => "authorization is not yet valid",
            ErrorReason::AuthorizationExpired => "authorization is expired",
            ErrorReason::InvalidSignatureLength => "invalid signature length",
            ErrorReason::InvalidSignatureRecovery => "invalid signature",
            ErrorReason::InsufficientBalance => "insufficient balance",
            ErrorReason::NonceAlreadyUsed => "authorization nonce already used",
            ErrorReason::InvalidRecipient => "invalid recipient",
            ErrorReason::NotOwner => "caller is not the owner",
            ErrorReason::SupplyOverflow => "total supply overflow",
            ErrorReason::NotVerified => "payment must be verified before settlement",
            ErrorReason::VerificationExpired => "verification expired",
            ErrorReason::SettlementAborted => "settlement aborted by hook",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response from the facilitator's `/verify` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<ErrorReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

impl VerifyResponse {
    pub fn valid(payer: Address) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer),
        }
    }

    pub fn invalid(reason: ErrorReason, payer: Option<Address>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer,
        }
    }
}

/// Response from the facilitator's `/settle` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
    /// Transaction id, if settlement succeeded. `None` on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    pub network: String,
}

impl SettleResponse {
    pub fn failed(reason: ErrorReason, payer: Option<Address>, network: &str) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer,
            transaction: None,
            network: network.to_string(),
        }
    }
}
