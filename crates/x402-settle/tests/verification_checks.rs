//! Read-only verification: each check, its reason, and that none of them mutate.

mod common;

use alloy::primitives::{Address, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use common::{Harness, T0, USDC};
use x402::signer::SignerRegistry;
use x402::{ErrorReason, SchemeFacilitator, SignatureInput, X402Error};

async fn reason_for(
    h: &Harness,
    requirements: &x402::PaymentRequirements,
    payload: &x402::PaymentPayload,
) -> Option<ErrorReason> {
    let facilitator = h.facilitator();
    let verdict = facilitator.verify(requirements, payload).await.unwrap();
    assert_eq!(verdict.is_valid, verdict.invalid_reason.is_none());
    if !verdict.is_valid {
        assert_eq!(facilitator.pending_verifications(), 0, "rejection must not record");
    }
    verdict.invalid_reason
}

#[tokio::test]
async fn test_valid_payload_records_once() {
    let h = Harness::new();
    let facilitator = h.facilitator();
    let requirements = h.requirements(1_000);
    let payload = h.payload(1_000, 0x10);

    for _ in 0..3 {
        assert!(facilitator.verify(&requirements, &payload).await.unwrap().is_valid);
    }
    assert_eq!(facilitator.pending_verifications(), 1);
    // Verification never touches balances or nonces
    assert_eq!(h.payer_balance(), U256::from(1_000 * USDC));
    assert!(h.ledger.events().len() == 1);
}

#[tokio::test]
async fn test_scheme_and_network_mismatch() {
    let h = Harness::new();
    let payload = h.payload(10, 0x11);

    let mut requirements = h.requirements(10);
    requirements.scheme = "upto".to_string();
    assert_eq!(reason_for(&h, &requirements, &payload).await, Some(ErrorReason::InvalidScheme));

    let mut requirements = h.requirements(10);
    requirements.network = "eip155:1".to_string();
    assert_eq!(reason_for(&h, &requirements, &payload).await, Some(ErrorReason::InvalidNetwork));

    let mut wrong_version = payload.clone();
    wrong_version.x402_version = 2;
    assert_eq!(
        reason_for(&h, &h.requirements(10), &wrong_version).await,
        Some(ErrorReason::UnsupportedVersion)
    );
}

#[tokio::test]
async fn test_missing_signer_is_unsupported_scheme() {
    let h = Harness::new();
    let facilitator = h.facilitator().with_signers(SignerRegistry::new());
    let verdict = facilitator
        .verify(&h.requirements(10), &h.payload(10, 0x12))
        .await
        .unwrap();
    assert_eq!(verdict.invalid_reason, Some(ErrorReason::UnsupportedScheme));
}

#[tokio::test]
async fn test_asset_amount_payee_mismatch() {
    let h = Harness::new();
    let payload = h.payload(1_000, 0x13);

    let mut requirements = h.requirements(1_000);
    requirements.asset = Address::repeat_byte(0x99);
    assert_eq!(reason_for(&h, &requirements, &payload).await, Some(ErrorReason::AssetMismatch));

    // Paying more than asked is still a mismatch
    assert_eq!(
        reason_for(&h, &h.requirements(999), &payload).await,
        Some(ErrorReason::AmountMismatch)
    );

    let mut requirements = h.requirements(1_000);
    requirements.pay_to = Address::repeat_byte(0x42);
    assert_eq!(reason_for(&h, &requirements, &payload).await, Some(ErrorReason::RecipientMismatch));
}

#[tokio::test]
async fn test_validity_window() {
    let h = Harness::new();
    let requirements = h.requirements(10);

    let mut auth = h.authorization(10, 0x14);
    auth.validAfter = U256::from(T0);
    assert_eq!(
        reason_for(&h, &requirements, &h.sign(&auth)).await,
        Some(ErrorReason::AuthorizationNotYetValid)
    );

    let mut auth = h.authorization(10, 0x15);
    auth.validBefore = U256::from(T0);
    assert_eq!(
        reason_for(&h, &requirements, &h.sign(&auth)).await,
        Some(ErrorReason::AuthorizationExpired)
    );
}

#[tokio::test]
async fn test_bad_signatures() {
    let h = Harness::new();
    let requirements = h.requirements(10);

    let mut short = h.payload(10, 0x16);
    short.payload.signature = SignatureInput::Packed(Bytes::from(vec![0x11u8; 64]));
    assert_eq!(
        reason_for(&h, &requirements, &short).await,
        Some(ErrorReason::InvalidSignatureLength)
    );

    // Signed by someone other than the claimed authorizer
    let impostor = PrivateKeySigner::random();
    let auth = h.authorization(10, 0x17);
    let mut forged = h.sign(&auth);
    forged.payload.signature =
        x402::eip712::sign_authorization(&impostor, &auth, h.config()).unwrap();
    assert_eq!(
        reason_for(&h, &requirements, &forged).await,
        Some(ErrorReason::InvalidSignatureRecovery)
    );

    // Field tampered after signing
    let mut tampered = h.payload(10, 0x18);
    tampered.payload.authorization.valid_before += 1;
    assert_eq!(
        reason_for(&h, &requirements, &tampered).await,
        Some(ErrorReason::InvalidSignatureRecovery)
    );
}

#[tokio::test]
async fn test_insufficient_balance() {
    let h = Harness::new();
    let amount = 1_000 * USDC + 1;
    assert_eq!(
        reason_for(&h, &h.requirements(amount), &h.payload(amount, 0x19)).await,
        Some(ErrorReason::InsufficientBalance)
    );
}

#[tokio::test]
async fn test_used_nonce() {
    let h = Harness::new();
    let requirements = h.requirements(10);
    let payload = h.payload(10, 0x1a);
    let facilitator = h.facilitator();

    assert!(facilitator.verify(&requirements, &payload).await.unwrap().is_valid);
    assert!(facilitator.settle(&requirements, &payload).await.unwrap().success);

    assert_eq!(
        reason_for(&h, &requirements, &payload).await,
        Some(ErrorReason::NonceAlreadyUsed)
    );
}

#[tokio::test]
async fn test_checks_run_in_order() {
    let h = Harness::new();
    // Wrong payee, too poor, and a short signature: the payee check comes first
    let amount = 2_000 * USDC;
    let mut payload = h.payload(amount, 0x1b);
    payload.payload.signature = SignatureInput::Packed(Bytes::from(vec![0u8; 10]));
    let mut requirements = h.requirements(amount);
    requirements.pay_to = Address::repeat_byte(0x33);

    assert_eq!(
        reason_for(&h, &requirements, &payload).await,
        Some(ErrorReason::RecipientMismatch)
    );

    requirements.pay_to = h.payee;
    assert_eq!(
        reason_for(&h, &requirements, &payload).await,
        Some(ErrorReason::InvalidSignatureLength)
    );
}

#[tokio::test]
async fn test_malformed_amount_is_an_error() {
    let h = Harness::new();
    let mut requirements = h.requirements(10);
    requirements.amount = "ten dollars".to_string();

    let err = h
        .facilitator()
        .verify(&requirements, &h.payload(10, 0x1c))
        .await
        .unwrap_err();
    assert!(matches!(err, X402Error::InvalidPayment(_)));
}
