//! Scheme-keyed signature capabilities.
//!
//! Each network family provides a [`Signer`]; the facilitator looks one up by
//! scheme name and never inspects signatures itself.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;

use crate::eip712;
use crate::{ChainConfig, SignatureError, SignatureInput, TransferWithAuthorization, SCHEME_NAME};

/// Signature recovery for one network family.
pub trait Signer: Send + Sync {
    /// CAIP-2 namespace this signer understands (e.g. `eip155`).
    fn family(&self) -> &str;

    /// Recover the signing address.
    fn recover(
        &self,
        auth: &TransferWithAuthorization,
        signature: &SignatureInput,
        config: &ChainConfig,
    ) -> Result<Address, SignatureError>;

    /// Recover and require the signer to be `auth.from`.
    fn verify(
        &self,
        auth: &TransferWithAuthorization,
        signature: &SignatureInput,
        config: &ChainConfig,
    ) -> Result<Address, SignatureError> {
        let recovered = self.recover(auth, signature, config)?;
        if recovered != auth.from {
            return Err(SignatureError::Recovery(format!(
                "signer {recovered} does not match authorizer {}",
                auth.from
            )));
        }
        Ok(recovered)
    }
}

/// EIP-712 / EIP-3009 signatures on EVM networks.
#[derive(Debug, Default, Clone, Copy)]
pub struct Eip3009Signer;

impl Signer for Eip3009Signer {
    fn family(&self) -> &str {
        "eip155"
    }

    fn recover(
        &self,
        auth: &TransferWithAuthorization,
        signature: &SignatureInput,
        config: &ChainConfig,
    ) -> Result<Address, SignatureError> {
        eip712::recover_signer(auth, signature, config)
    }
}

/// Lookup table from scheme name to signer, filled at startup.
#[derive(Clone, Default)]
pub struct SignerRegistry {
    signers: HashMap<String, Arc<dyn Signer>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with [`Eip3009Signer`] under the `exact` scheme.
    pub fn with_defaults() -> Self {
        Self::new().with(SCHEME_NAME, Eip3009Signer)
    }

    pub fn with(mut self, scheme: &str, signer: impl Signer + 'static) -> Self {
        self.register(scheme, Arc::new(signer));
        self
    }

    /// Register (or replace) the signer for `scheme`.
    pub fn register(&mut self, scheme: &str, signer: Arc<dyn Signer>) {
        if self.signers.insert(scheme.to_string(), signer).is_some() {
            tracing::warn!(scheme = %scheme, "replaced registered signer");
        }
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Signer>> {
        self.signers.get(scheme).cloned()
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.signers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, U256};
    use alloy::signers::local::PrivateKeySigner;

    #[test]
    fn defaults_register_exact() {
        let registry = SignerRegistry::with_defaults();
        assert_eq!(registry.schemes(), vec!["exact"]);
        assert_eq!(registry.get("exact").unwrap().family(), "eip155");
        assert!(registry.get("upto").is_none());
    }

    #[test]
    fn verify_rejects_claimed_authorizer_mismatch() {
        let signer = PrivateKeySigner::random();
        let config = ChainConfig::default();
        let mut auth = TransferWithAuthorization {
            from: signer.address(),
            to: Address::repeat_byte(0xbb),
            value: U256::from(5u64),
            validAfter: U256::ZERO,
            validBefore: U256::from(u64::MAX),
            nonce: B256::repeat_byte(0x03),
        };
        let sig = eip712::sign_authorization(&signer, &auth, &config).unwrap();
        assert!(Eip3009Signer.verify(&auth, &sig, &config).is_ok());

        auth.from = Address::repeat_byte(0xee);
        assert!(matches!(
            Eip3009Signer.verify(&auth, &sig, &config),
            Err(SignatureError::Recovery(_))
        ));
    }
}
