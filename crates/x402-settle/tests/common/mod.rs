#![allow(dead_code)]

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use x402::clock::ManualClock;
use x402::eip712;
use x402::ledger::InMemoryLedger;
use x402::nonce_store::{InMemoryNonceStore, NonceStore};
use x402::{
    AuthorizationData, ChainConfig, ExactPayload, Facilitator, PaymentPayload,
    PaymentRequirements, TransferWithAuthorization, X402_VERSION,
};

pub const T0: u64 = 1_700_000_000;
/// One USDC in base units.
pub const USDC: u64 = 1_000_000;

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<InMemoryLedger>,
    pub owner: Address,
    pub payer: PrivateKeySigner,
    pub payee: Address,
}

impl Harness {
    /// Ledger at `T0` with the payer holding 1000 USDC.
    pub fn new() -> Self {
        Self::with_nonce_store(Arc::new(InMemoryNonceStore::new()))
    }

    pub fn with_nonce_store(nonces: Arc<dyn NonceStore>) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let owner = Address::repeat_byte(0x01);
        let payer = PrivateKeySigner::random();
        let ledger = Arc::new(
            InMemoryLedger::new(ChainConfig::default(), owner)
                .with_clock(clock.clone())
                .with_nonce_store(nonces),
        );
        ledger
            .mint(owner, payer.address(), U256::from(1_000 * USDC))
            .unwrap();

        Self {
            clock,
            ledger,
            owner,
            payer,
            payee: Address::repeat_byte(0xbe),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        use x402::ledger::Ledger;
        self.ledger.config()
    }

    pub fn facilitator(&self) -> Facilitator<Arc<InMemoryLedger>> {
        Facilitator::new(Arc::clone(&self.ledger)).with_clock(self.clock.clone())
    }

    pub fn requirements(&self, amount: u64) -> PaymentRequirements {
        let config = self.config();
        PaymentRequirements {
            scheme: config.scheme_name.clone(),
            network: config.network.clone(),
            asset: config.ledger_address,
            amount: amount.to_string(),
            pay_to: self.payee,
            max_timeout_seconds: 60,
            extra: None,
            resource: Some("https://api.example.com/report".to_string()),
            description: None,
            mime_type: None,
        }
    }

    pub fn authorization(&self, amount: u64, nonce: u8) -> TransferWithAuthorization {
        TransferWithAuthorization {
            from: self.payer.address(),
            to: self.payee,
            value: U256::from(amount),
            validAfter: U256::from(T0 - 60),
            validBefore: U256::from(T0 + 3_600),
            nonce: B256::repeat_byte(nonce),
        }
    }

    /// Sign `auth` with the payer key and wrap it as a wire payload.
    pub fn sign(&self, auth: &TransferWithAuthorization) -> PaymentPayload {
        let signature = eip712::sign_authorization(&self.payer, auth, self.config()).unwrap();
        let config = self.config();
        PaymentPayload {
            x402_version: X402_VERSION,
            scheme: config.scheme_name.clone(),
            network: config.network.clone(),
            payload: ExactPayload {
                signature,
                authorization: AuthorizationData::from(auth),
            },
        }
    }

    pub fn payload(&self, amount: u64, nonce: u8) -> PaymentPayload {
        self.sign(&self.authorization(amount, nonce))
    }

    pub fn payer_balance(&self) -> U256 {
        self.ledger.balance(self.payer.address())
    }

    pub fn payee_balance(&self) -> U256 {
        self.ledger.balance(self.payee)
    }
}
