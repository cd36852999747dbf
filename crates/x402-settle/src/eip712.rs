//! EIP-712 typed-data hashing and signature recovery.
//!
//! Provides functions for:
//! - Building the ledger's EIP-712 domain ([`payment_domain`])
//! - Computing signing hashes ([`signing_hash`])
//! - Recovering signers from packed or split signatures with EIP-2 malleability
//!   protection ([`recover_signer`])
//! - Signing an authorization as a payer would ([`sign_authorization`])

use alloy::primitives::{Address, Signature, B256, U256};
use alloy::signers::SignerSync;
use alloy::sol_types::SolStruct;

use crate::{ChainConfig, SignatureError, SignatureInput, TransferWithAuthorization};

/// Build the EIP-712 domain. The verifying contract is the ledger itself, so a
/// signature made for one ledger instance never recovers correctly on another.
pub fn payment_domain(config: &ChainConfig) -> alloy::sol_types::Eip712Domain {
    alloy::sol_types::Eip712Domain {
        name: Some(std::borrow::Cow::Owned(config.eip712_domain_name.clone())),
        version: Some(std::borrow::Cow::Owned(
            config.eip712_domain_version.clone(),
        )),
        chain_id: Some(U256::from(config.chain_id)),
        verifying_contract: Some(config.ledger_address),
        salt: None,
    }
}

/// Compute the EIP-712 signing hash of an authorization.
pub fn signing_hash(auth: &TransferWithAuthorization, config: &ChainConfig) -> B256 {
    auth.eip712_signing_hash(&payment_domain(config))
}

/// secp256k1 curve order N / 2. Signatures with s above this are malleable (EIP-2).
const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xBFD25E8CD0364140,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0x7FFFFFFFFFFFFFFF,
]);

/// Map a recovery id to Electrum notation. Raw parity values 0/1 become 27/28.
fn normalize_v(v: u8) -> Result<bool, SignatureError> {
    let v = if v < 27 { v.saturating_add(27) } else { v };
    match v {
        27 => Ok(false),
        28 => Ok(true),
        other => Err(SignatureError::Recovery(format!(
            "invalid recovery id {other}"
        ))),
    }
}

fn parse_signature(signature: &SignatureInput) -> Result<Signature, SignatureError> {
    let (r, s, v) = match signature {
        SignatureInput::Packed(bytes) => {
            if bytes.len() != 65 {
                return Err(SignatureError::InvalidLength(bytes.len()));
            }
            (
                U256::from_be_slice(&bytes[..32]),
                U256::from_be_slice(&bytes[32..64]),
                bytes[64],
            )
        }
        SignatureInput::Split { v, r, s } => {
            (U256::from_be_bytes(r.0), U256::from_be_bytes(s.0), *v)
        }
    };

    if s > SECP256K1_N_DIV_2 {
        return Err(SignatureError::Recovery(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }

    Ok(Signature::new(r, s, normalize_v(v)?))
}

/// Recover the address that signed `auth` under this ledger's domain.
///
/// A recovery that yields the zero address is treated as a failure.
pub fn recover_signer(
    auth: &TransferWithAuthorization,
    signature: &SignatureInput,
    config: &ChainConfig,
) -> Result<Address, SignatureError> {
    let sig = parse_signature(signature)?;
    let hash = signing_hash(auth, config);
    let recovered = sig
        .recover_address_from_prehash(&hash)
        .map_err(|e| SignatureError::Recovery(e.to_string()))?;
    if recovered == Address::ZERO {
        return Err(SignatureError::Recovery(
            "recovered the zero address".to_string(),
        ));
    }
    Ok(recovered)
}

/// Sign an authorization as the payer would.
pub fn sign_authorization<S: SignerSync>(
    signer: &S,
    auth: &TransferWithAuthorization,
    config: &ChainConfig,
) -> Result<SignatureInput, SignatureError> {
    let hash = signing_hash(auth, config);
    let sig = signer
        .sign_hash_sync(&hash)
        .map_err(|e| SignatureError::Signing(e.to_string()))?;
    Ok(SignatureInput::packed(sig.as_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;
    use alloy::signers::local::PrivateKeySigner;

    fn authorization(from: Address) -> TransferWithAuthorization {
        TransferWithAuthorization {
            from,
            to: Address::repeat_byte(0xbb),
            value: U256::from(1000u64),
            validAfter: U256::from(0u64),
            validBefore: U256::from(u64::MAX),
            nonce: B256::repeat_byte(0x01),
        }
    }

    fn packed_bytes(sig: &SignatureInput) -> Vec<u8> {
        match sig {
            SignatureInput::Packed(bytes) => bytes.to_vec(),
            SignatureInput::Split { .. } => unreachable!("sign_authorization returns packed"),
        }
    }

    #[test]
    fn test_sign_and_recover() {
        let signer = PrivateKeySigner::random();
        let config = ChainConfig::default();
        let auth = authorization(signer.address());

        let sig = sign_authorization(&signer, &auth, &config).unwrap();
        assert_eq!(recover_signer(&auth, &sig, &config).unwrap(), signer.address());
    }

    #[test]
    fn test_split_signature_recovers_same_signer() {
        let signer = PrivateKeySigner::random();
        let config = ChainConfig::default();
        let auth = authorization(signer.address());
        let bytes = packed_bytes(&sign_authorization(&signer, &auth, &config).unwrap());

        let split = SignatureInput::Split {
            v: bytes[64],
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..64]),
        };
        assert_eq!(recover_signer(&auth, &split, &config).unwrap(), signer.address());
    }

    #[test]
    fn test_raw_parity_is_normalized() {
        let signer = PrivateKeySigner::random();
        let config = ChainConfig::default();
        let auth = authorization(signer.address());
        let mut bytes = packed_bytes(&sign_authorization(&signer, &auth, &config).unwrap());
        bytes[64] -= 27;

        let sig = SignatureInput::Packed(Bytes::from(bytes));
        assert_eq!(recover_signer(&auth, &sig, &config).unwrap(), signer.address());
    }

    #[test]
    fn test_out_of_range_v_rejected() {
        let signer = PrivateKeySigner::random();
        let config = ChainConfig::default();
        let auth = authorization(signer.address());
        let mut bytes = packed_bytes(&sign_authorization(&signer, &auth, &config).unwrap());
        bytes[64] = 35;

        let sig = SignatureInput::Packed(Bytes::from(bytes));
        assert!(matches!(
            recover_signer(&auth, &sig, &config),
            Err(SignatureError::Recovery(_))
        ));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let auth = authorization(Address::repeat_byte(0xaa));
        let sig = SignatureInput::packed(vec![0u8; 64]);
        assert_eq!(
            recover_signer(&auth, &sig, &ChainConfig::default()),
            Err(SignatureError::InvalidLength(64))
        );
    }

    #[test]
    fn test_high_s_rejected() {
        let auth = authorization(Address::repeat_byte(0xaa));
        let mut bytes = vec![0x11u8; 65];
        bytes[32..64].copy_from_slice(&[0xff; 32]);
        bytes[64] = 27;
        let sig = SignatureInput::packed(bytes);
        assert!(matches!(
            recover_signer(&auth, &sig, &ChainConfig::default()),
            Err(SignatureError::Recovery(_))
        ));
    }

    #[test]
    fn test_other_ledger_domain_does_not_recover_signer() {
        let signer = PrivateKeySigner::random();
        let config = ChainConfig::default();
        let auth = authorization(signer.address());
        let sig = sign_authorization(&signer, &auth, &config).unwrap();

        let other = ChainConfig {
            ledger_address: Address::repeat_byte(0x42),
            ..ChainConfig::default()
        };
        assert_ne!(recover_signer(&auth, &sig, &other).ok(), Some(signer.address()));
    }
}
