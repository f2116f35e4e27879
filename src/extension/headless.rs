//! In-process wallet provider backed by local Ed25519 keys.
//!
//! Behaves like the browser extension from the session's point of view:
//! connections and signatures are approved or refused according to a policy,
//! and key switches are announced on the shared [`EventHub`].

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::events::{EventHub, EventKind};
use super::{ProviderError, WalletProvider};
use crate::crypto::KeyPair;
use crate::identity::Identity;

struct HeadlessState {
    accounts: Vec<KeyPair>,
    active: usize,
    connected: bool,
    approve_connections: bool,
    approve_signing: bool,
    fail_disconnect: bool,
}

pub struct HeadlessWallet {
    state: Mutex<HeadlessState>,
    events: EventHub,
}

impl HeadlessWallet {
    pub fn new(account: KeyPair, events: EventHub) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                accounts: vec![account],
                active: 0,
                connected: false,
                approve_connections: true,
                approve_signing: true,
                fail_disconnect: false,
            }),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key_payload(identity: Option<&Identity>) -> String {
        json!({ "activeKey": identity.map(Identity::as_str) }).to_string()
    }

    pub fn active_identity(&self) -> Identity {
        let state = self.state();
        state.accounts[state.active].identity()
    }

    pub fn is_site_connected(&self) -> bool {
        self.state().connected
    }

    pub fn set_approve_connections(&self, approve: bool) {
        self.state().approve_connections = approve;
    }

    pub fn set_approve_signing(&self, approve: bool) {
        self.state().approve_signing = approve;
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.state().fail_disconnect = fail;
    }

    /// Add an account and make it active. Connected sites get `activeKeyChanged`.
    pub fn switch_account(&self, account: KeyPair) -> Identity {
        let identity = account.identity();
        let notify = {
            let mut state = self.state();
            state.accounts.push(account);
            state.active = state.accounts.len() - 1;
            state.connected
        };
        if notify {
            self.events
                .emit(EventKind::ActiveKeyChanged, &Self::key_payload(Some(&identity)));
        }
        identity
    }

    /// The user locks the extension: the site loses its connection.
    pub fn lock(&self) {
        let was_connected = std::mem::replace(&mut self.state().connected, false);
        if was_connected {
            self.events.emit(EventKind::Disconnected, &Self::key_payload(None));
        }
    }
}

#[async_trait]
impl WalletProvider for HeadlessWallet {
    async fn request_connection(&self) -> Result<bool, ProviderError> {
        let identity = {
            let mut state = self.state();
            if !state.approve_connections {
                return Ok(false);
            }
            state.connected = true;
            state.accounts[state.active].identity()
        };
        self.events
            .emit(EventKind::Connected, &Self::key_payload(Some(&identity)));
        Ok(true)
    }

    async fn is_connected(&self) -> Result<bool, ProviderError> {
        Ok(self.state().connected)
    }

    async fn get_active_public_key(&self) -> Result<String, ProviderError> {
        let state = self.state();
        if !state.connected {
            return Err(ProviderError("site is not connected".to_string()));
        }
        Ok(state.accounts[state.active].identity().to_string())
    }

    async fn sign(&self, deploy_json: &str, public_key: &str) -> Result<String, ProviderError> {
        let state = self.state();
        if !state.connected {
            return Err(ProviderError("site is not connected".to_string()));
        }
        let account = &state.accounts[state.active];
        if account.identity().as_str() != public_key.to_ascii_lowercase() {
            return Err(ProviderError(format!(
                "public key {} is not the active account",
                public_key
            )));
        }
        if !state.approve_signing {
            debug!("Headless wallet declined signature");
            return Ok(json!({ "cancelled": true }).to_string());
        }
        let signature = account.sign_hex(deploy_json.as_bytes());
        Ok(json!({ "cancelled": false, "signatureHex": signature }).to_string())
    }

    async fn disconnect_from_site(&self) -> Result<bool, ProviderError> {
        {
            let mut state = self.state();
            if state.fail_disconnect {
                return Err(ProviderError("extension unavailable".to_string()));
            }
            if !std::mem::replace(&mut state.connected, false) {
                return Ok(false);
            }
        }
        self.events
            .emit(EventKind::Disconnected, &Self::key_payload(None));
        Ok(true)
    }
}
