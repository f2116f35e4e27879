//! Bridge over the Casper Wallet browser extension.
//!
//! The extension injects a provider object into the page at some point after
//! start-up. [`ProviderHost`] is where that object is looked up, and
//! [`ExtensionBridge`] wraps it with a uniform, time-bounded async interface.
//!
//! Absence of the provider (`ProviderNotFound`) and refusal by the user
//! (`ConnectionRejected`, `SigningRejected`) are distinct error kinds.

pub mod events;
pub mod headless;
pub mod host;

pub use events::{parse_event, EventHub, EventKind, SessionSignal, Subscription};
pub use headless::HeadlessWallet;
pub use host::SlotHost;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ExtensionConfig;
use crate::error::{Result, WalletError};
use crate::identity::Identity;

/// Rejection raised by the extension itself (a rejected promise).
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// Capability injected by the wallet extension.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_connection(&self) -> std::result::Result<bool, ProviderError>;
    async fn is_connected(&self) -> std::result::Result<bool, ProviderError>;
    async fn get_active_public_key(&self) -> std::result::Result<String, ProviderError>;
    /// Returns the signing envelope JSON.
    async fn sign(&self, deploy_json: &str, public_key: &str) -> std::result::Result<String, ProviderError>;
    async fn disconnect_from_site(&self) -> std::result::Result<bool, ProviderError>;
}

/// The environment the extension injects itself into.
pub trait ProviderHost: Send + Sync {
    /// Current provider, looked up on every call.
    fn provider(&self) -> Option<Arc<dyn WalletProvider>>;
    /// Direct the user to the extension's install page.
    fn open_install_page(&self, url: &str);
}

pub struct ExtensionBridge {
    host: Arc<dyn ProviderHost>,
    events: EventHub,
    install_url: String,
    timeout: Duration,
}

impl ExtensionBridge {
    pub fn new(host: Arc<dyn ProviderHost>, events: EventHub, config: &ExtensionConfig) -> Self {
        Self {
            host,
            events,
            install_url: config.install_url.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn detect(&self) -> Option<Arc<dyn WalletProvider>> {
        self.host.provider()
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    fn require(&self) -> Result<Arc<dyn WalletProvider>> {
        self.detect().ok_or(WalletError::ProviderNotFound)
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<std::result::Result<T, ProviderError>>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| WalletError::Timeout(op))
    }

    /// `Ok(false)` when the user declines. Without a provider the install
    /// page is opened and `ProviderNotFound` returned.
    pub async fn request_connection(&self) -> Result<bool> {
        let Some(provider) = self.detect() else {
            warn!("Casper Wallet not detected, directing user to {}", self.install_url);
            self.host.open_install_page(&self.install_url);
            return Err(WalletError::ProviderNotFound);
        };
        self.bounded("connection approval", provider.request_connection())
            .await?
            .map_err(|e| {
                debug!("requestConnection rejected: {}", e);
                WalletError::ConnectionRejected
            })
    }

    pub async fn is_connected_to_extension(&self) -> Result<bool> {
        let provider = self.require()?;
        self.bounded("isConnected", provider.is_connected())
            .await?
            .map_err(|e| WalletError::Extension(e.0))
    }

    pub async fn active_identity(&self) -> Result<Identity> {
        let provider = self.require()?;
        let key = self
            .bounded("getActivePublicKey", provider.get_active_public_key())
            .await?
            .map_err(|e| {
                debug!("getActivePublicKey failed: {}", e);
                WalletError::NotConnected
            })?;
        if key.trim().is_empty() {
            return Err(WalletError::NotConnected);
        }
        Identity::parse(&key).map_err(|e| WalletError::MalformedResponse(e.to_string()))
    }

    pub async fn sign(&self, payload_json: &str, identity: &Identity) -> Result<String> {
        let provider = self.require()?;
        self.bounded("signature approval", provider.sign(payload_json, identity.as_str()))
            .await?
            .map_err(|e| WalletError::SigningRejected(e.0))
    }

    pub async fn disconnect(&self) -> Result<bool> {
        let provider = self.require()?;
        self.bounded("disconnectFromSite", provider.disconnect_from_site())
            .await?
            .map_err(|e| WalletError::Extension(e.0))
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(EventKind, &str) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, handler)
    }
}
