//! Deploy signing through the wallet extension.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::crypto::verify_with_identity;
use crate::error::{Result, WalletError};
use crate::extension::ExtensionBridge;
use crate::identity::Identity;
use crate::session::SessionStore;

#[derive(Deserialize, Debug)]
struct SignatureEnvelope {
    #[serde(default)]
    cancelled: bool,
    #[serde(rename = "signatureHex", alias = "signature", default)]
    signature_hex: Option<String>,
}

/// A deploy together with the extension's signature over `payload_json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignedDeploy {
    pub deploy: Value,
    /// Exact bytes that were signed.
    pub payload_json: String,
    pub signer: Identity,
    pub signature_hex: String,
    pub signed_at: DateTime<Utc>,
}

impl SignedDeploy {
    /// Checks an Ed25519 signature over the exact `payload_json` bytes, which is
    /// what [`HeadlessWallet`](crate::extension::HeadlessWallet) signs. The
    /// Casper Wallet extension signs the deploy hash instead, so its signatures
    /// do not verify here. Secp256k1 signers always return false.
    pub fn verify(&self) -> bool {
        verify_with_identity(self.payload_json.as_bytes(), &self.signature_hex, &self.signer)
    }
}

pub struct DeploySigner {
    bridge: Arc<ExtensionBridge>,
    session: SessionStore,
}

impl DeploySigner {
    pub fn new(session: SessionStore) -> Self {
        Self {
            bridge: Arc::clone(session.bridge()),
            session,
        }
    }

    /// Canonical JSON to hand to the extension. Strings are taken as
    /// already-serialized deploys.
    pub fn serialize_deploy(deploy: &Value) -> String {
        match deploy {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub async fn sign_deploy(&self, deploy: &Value) -> Result<SignedDeploy> {
        let signer = self.session.active_identity().ok_or(WalletError::NotConnected)?;
        let payload_json = Self::serialize_deploy(deploy);

        let response = self.bridge.sign(&payload_json, &signer).await?;
        let envelope: SignatureEnvelope = serde_json::from_str(&response)
            .map_err(|e| WalletError::MalformedSignatureResponse(e.to_string()))?;
        if envelope.cancelled {
            return Err(WalletError::SigningRejected("cancelled by user".to_string()));
        }

        let signature_hex = envelope
            .signature_hex
            .filter(|s| !s.is_empty())
            .ok_or_else(|| WalletError::MalformedSignatureResponse("missing signature".to_string()))?;
        if hex::decode(&signature_hex).is_err() {
            return Err(WalletError::MalformedSignatureResponse(format!(
                "signature is not hex: {}",
                signature_hex
            )));
        }

        if self.session.active_identity().as_ref() != Some(&signer) {
            return Err(WalletError::IdentityMismatch);
        }

        let deploy = match deploy {
            Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| deploy.clone()),
            other => other.clone(),
        };

        Ok(SignedDeploy {
            deploy,
            payload_json,
            signer,
            signature_hex,
            signed_at: Utc::now(),
        })
    }

    /// `None` when the deploy was not signed; the reason is logged.
    pub async fn try_sign_deploy(&self, deploy: &Value) -> Option<SignedDeploy> {
        match self.sign_deploy(deploy).await {
            Ok(signed) => {
                info!("Deploy signed by {}", signed.signer.short());
                Some(signed)
            }
            Err(e) if e.is_user_outcome() => {
                info!("Signing failed: {}", e);
                None
            }
            Err(e) => {
                error!("Signing failed: {}", e);
                None
            }
        }
    }
}
