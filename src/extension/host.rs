use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::info;

use super::{ProviderHost, WalletProvider};

type InstallOpener = Box<dyn Fn(&str) + Send + Sync>;

/// In-process host with a provider slot that may be filled at any time.
pub struct SlotHost {
    slot: RwLock<Option<Arc<dyn WalletProvider>>>,
    opener: InstallOpener,
    install_prompts: AtomicUsize,
}

impl SlotHost {
    pub fn new() -> Self {
        Self::with_opener(|url| info!("Install Casper Wallet from {}", url))
    }

    pub fn with_provider(provider: Arc<dyn WalletProvider>) -> Self {
        let host = Self::new();
        host.inject(provider);
        host
    }

    pub fn with_opener<F>(opener: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            slot: RwLock::new(None),
            opener: Box::new(opener),
            install_prompts: AtomicUsize::new(0),
        }
    }

    pub fn inject(&self, provider: Arc<dyn WalletProvider>) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(provider);
    }

    pub fn eject(&self) -> Option<Arc<dyn WalletProvider>> {
        self.slot.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// How many times the user was sent to the install page.
    pub fn install_prompts(&self) -> usize {
        self.install_prompts.load(Ordering::SeqCst)
    }
}

impl Default for SlotHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderHost for SlotHost {
    fn provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn open_install_page(&self, url: &str) {
        self.install_prompts.fetch_add(1, Ordering::SeqCst);
        (self.opener)(url);
    }
}
