use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::identity::{Identity, KeyAlgorithm};

pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new Ed25519 keypair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        KeyPair {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// Deterministic keypair from a 32 byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        KeyPair {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Seed derived from an arbitrary passphrase (dev and demo accounts only)
    pub fn from_passphrase(phrase: &str) -> Self {
        let seed: [u8; 32] = Sha256::digest(phrase.as_bytes()).into();
        Self::from_seed(seed)
    }

    /// Sign a message with the private key
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Casper-style tagged signature: `01` + 64 byte signature, hex encoded
    pub fn sign_hex(&self, message: &[u8]) -> String {
        let signature = self.sign(message);
        format!(
            "{:02x}{}",
            KeyAlgorithm::Ed25519.tag(),
            hex::encode(signature.to_bytes())
        )
    }

    /// Public key as a tagged identity
    pub fn identity(&self) -> Identity {
        Identity::from_ed25519(&self.verifying_key().to_bytes())
    }
}

/// Verify a tagged signature hex against an Ed25519 identity.
/// Returns false for other key algorithms or malformed input.
pub fn verify_with_identity(message: &[u8], signature_hex: &str, identity: &Identity) -> bool {
    if identity.algorithm() != KeyAlgorithm::Ed25519 {
        return false;
    }
    let sig_hex = match signature_hex.len() {
        130 => signature_hex.get(2..).unwrap_or_default(),
        _ => signature_hex,
    };
    let (Ok(sig_bytes), Ok(pk_bytes)) = (
        hex::decode(sig_hex),
        <[u8; 32]>::try_from(identity.key_bytes().as_slice()),
    ) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let Ok(pubkey) = VerifyingKey::from_bytes(&pk_bytes) else {
        return false;
    };
    pubkey.verify(message, &Signature::from_bytes(&sig_bytes)).is_ok()
}
