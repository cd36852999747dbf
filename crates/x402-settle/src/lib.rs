//! x402 settlement engine.
//!
//! A payer signs an EIP-712 [`TransferWithAuthorization`] off-band; the facilitator
//! checks it against the resource owner's [`PaymentRequirements`] and, once verified,
//! settles it on a [`Ledger`](ledger::Ledger) exactly once.
//!
//! # Components
//!
//! - **Ledger** ([`ledger::InMemoryLedger`]): balances plus per-authorizer nonce usage,
//!   mutated through one atomic `transfer_with_authorization`
//! - **Signers** ([`signer::SignerRegistry`]): scheme-keyed signature recovery
//! - **Verification store** ([`verification_store::VerificationStore`]): which payloads
//!   passed verification, and when
//! - **Facilitator** ([`Facilitator`]): the verify → settle lifecycle with a TTL and
//!   at most one settlement attempt per verification
//! - **Hooks** ([`hooks::FacilitatorHook`]): ordered interceptors around both operations
//!
//! # Quick example
//!
//! ```no_run
//! use alloy::primitives::Address;
//! use x402::ledger::InMemoryLedger;
//! use x402::{ChainConfig, Facilitator, SchemeFacilitator};
//!
//! # async fn run(requirements: x402::PaymentRequirements, payload: x402::PaymentPayload) {
//! let owner = Address::repeat_byte(0x01);
//! let ledger = InMemoryLedger::new(ChainConfig::default(), owner);
//! let facilitator = Facilitator::new(ledger);
//!
//! let verdict = facilitator.verify(&requirements, &payload).await.unwrap();
//! if verdict.is_valid {
//!     let settled = facilitator.settle(&requirements, &payload).await.unwrap();
//!     println!("settled: {:?}", settled.transaction);
//! }
//! # }
//! ```

// Core types and traits
pub mod constants;
pub mod error;
pub mod payment;
pub mod response;
pub mod scheme;

// Engine
pub mod clock;
pub mod eip712;
pub mod facilitator;
pub mod hooks;
pub mod ledger;
pub mod nonce_store;
pub mod signer;
pub mod verification_store;

// Transport helpers shared with the HTTP server
pub mod hmac;
pub mod security;

use alloy::sol;

// EIP-3009 authorization. The sol! macro derives SolStruct which provides eip712_signing_hash().
sol! {
    #[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

// Re-exports
pub use constants::ChainConfig;
pub use constants::*;
pub use error::{LedgerError, SignatureError, X402Error};
pub use facilitator::Facilitator;
pub use payment::*;
pub use response::*;
pub use scheme::*;
