//! Public-key identities as reported by the wallet extension.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WalletError;

/// Signature scheme, encoded as the first byte of a Casper public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    Ed25519,
    Secp256k1,
}

impl KeyAlgorithm {
    pub fn tag(self) -> u8 {
        match self {
            KeyAlgorithm::Ed25519 => 0x01,
            KeyAlgorithm::Secp256k1 => 0x02,
        }
    }

    /// Key length in bytes, excluding the tag byte.
    fn key_len(self) -> usize {
        match self {
            KeyAlgorithm::Ed25519 => 32,
            KeyAlgorithm::Secp256k1 => 33,
        }
    }
}

/// Hex encoded public key, tag byte included. Always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, WalletError> {
        let normalized = raw.trim().to_ascii_lowercase();
        let bytes = hex::decode(&normalized)
            .map_err(|e| WalletError::InvalidIdentity(format!("{}: {}", raw, e)))?;

        let algorithm = match bytes.first() {
            Some(0x01) => KeyAlgorithm::Ed25519,
            Some(0x02) => KeyAlgorithm::Secp256k1,
            Some(tag) => {
                return Err(WalletError::InvalidIdentity(format!(
                    "unknown key tag {:#04x}",
                    tag
                )))
            }
            None => return Err(WalletError::InvalidIdentity("empty key".to_string())),
        };

        if bytes.len() != algorithm.key_len() + 1 {
            return Err(WalletError::InvalidIdentity(format!(
                "{:?} key must be {} bytes, got {}",
                algorithm,
                algorithm.key_len() + 1,
                bytes.len()
            )));
        }

        Ok(Identity(normalized))
    }

    pub fn from_ed25519(key: &[u8; 32]) -> Self {
        Identity(format!("{:02x}{}", KeyAlgorithm::Ed25519.tag(), hex::encode(key)))
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        if self.0.starts_with("01") {
            KeyAlgorithm::Ed25519
        } else {
            KeyAlgorithm::Secp256k1
        }
    }

    /// Key passed to `state_get_item` to read the account record.
    pub fn account_key(&self) -> &str {
        &self.0
    }

    /// Raw key bytes without the tag.
    pub fn key_bytes(&self) -> Vec<u8> {
        // Validated in `parse`.
        hex::decode(&self.0[2..]).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs: `01ab..11`.
    pub fn short(&self) -> String {
        let len = self.0.len();
        format!("{}..{}", &self.0[..4], &self.0[len - 2..])
    }
}

impl FromStr for Identity {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = WalletError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
