use std::fmt;

use alloy::primitives::{Address, Bytes, B256, U256};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{TransferWithAuthorization, X402Error};

/// Authorization fields as they travel on the wire (decimal strings for amounts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationData {
    pub from: Address,
    pub to: Address,
    pub value: String,
    pub valid_after: u64,
    pub valid_before: u64,
    pub nonce: B256,
}

impl AuthorizationData {
    /// Convert to the EIP-712 struct. Fails on an unparseable value.
    pub fn to_authorization(&self) -> Result<TransferWithAuthorization, X402Error> {
        let value = parse_amount(&self.value)?;
        Ok(TransferWithAuthorization {
            from: self.from,
            to: self.to,
            value,
            validAfter: U256::from(self.valid_after),
            validBefore: U256::from(self.valid_before),
            nonce: self.nonce,
        })
    }
}

impl From<&TransferWithAuthorization> for AuthorizationData {
    fn from(auth: &TransferWithAuthorization) -> Self {
        Self {
            from: auth.from,
            to: auth.to,
            value: auth.value.to_string(),
            valid_after: auth.validAfter.saturating_to(),
            valid_before: auth.validBefore.saturating_to(),
            nonce: auth.nonce,
        }
    }
}

/// A signature in either of the two encodings the ledger accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignatureInput {
    /// `r ‖ s ‖ v`, expected to be 65 bytes.
    Packed(Bytes),
    /// The `(v, r, s)` tuple.
    Split { v: u8, r: B256, s: B256 },
}

impl SignatureInput {
    pub fn packed(bytes: impl Into<Bytes>) -> Self {
        SignatureInput::Packed(bytes.into())
    }
}

/// Scheme-specific part of the payload: the signed authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactPayload {
    pub signature: SignatureInput,
    pub authorization: AuthorizationData,
}

/// Wire-format payment payload (sent in the X-PAYMENT header, base64-encoded JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: ExactPayload,
}

/// Token metadata the resource owner publishes alongside the price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
}

/// A single entry in the `accepts` array of a 402 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub asset: Address,
    pub amount: String,
    pub pay_to: Address,
    pub max_timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<AssetMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl PaymentRequirements {
    pub fn required_amount(&self) -> Result<U256, X402Error> {
        parse_amount(&self.amount)
    }
}

fn parse_amount(raw: &str) -> Result<U256, X402Error> {
    raw.parse::<U256>()
        .map_err(|e| X402Error::InvalidPayment(format!("invalid amount '{raw}': {e}")))
}

/// Content digest of a payload; correlates its verification and settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaymentHash(pub B256);

impl PaymentHash {
    /// SHA-256 over the payload's JSON serialization. Field order is fixed by the
    /// struct definitions, so equal payloads always hash equally.
    pub fn of(payload: &PaymentPayload) -> Result<Self, X402Error> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self(B256::from_slice(&Sha256::digest(&bytes))))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encode a payload for the X-PAYMENT header.
pub fn encode_payment_header(payload: &PaymentPayload) -> Result<String, X402Error> {
    let json = serde_json::to_vec(payload)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Decode an X-PAYMENT header value.
pub fn decode_payment_header(header: &str) -> Result<PaymentPayload, X402Error> {
    let json = base64::engine::general_purpose::STANDARD
        .decode(header.trim())
        .map_err(|e| X402Error::InvalidPayment(format!("invalid base64 payment header: {e}")))?;
    Ok(serde_json::from_slice(&json)?)
}
