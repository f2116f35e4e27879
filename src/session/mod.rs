//! Process-wide wallet session.
//!
//! [`SessionStore`] is the only writer of the [`Session`]. It is driven by
//! explicit `connect`/`disconnect` calls and by extension push events, and it
//! keeps the balance of the active identity fresh by spawning one resolution
//! task per identity. A resolution result is applied only while its identity
//! is still the active one (last identity wins).

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::balance::Balance;
use crate::client::BalanceSource;
use crate::error::{Result, WalletError};
use crate::extension::{parse_event, EventKind, ExtensionBridge, SessionSignal, Subscription};
use crate::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub status: ConnectionStatus,
    pub active_identity: Option<Identity>,
    /// `None` is "unknown", distinct from a confirmed zero balance.
    pub balance: Option<Balance>,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.status == ConnectionStatus::Connecting
    }
}

struct RefreshTask {
    identity: Identity,
    handle: JoinHandle<()>,
}

struct StoreInner {
    bridge: Arc<ExtensionBridge>,
    balances: Arc<dyn BalanceSource>,
    state: watch::Sender<Session>,
    refresh: Mutex<Option<RefreshTask>>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    pub fn new(bridge: Arc<ExtensionBridge>, balances: Arc<dyn BalanceSource>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(StoreInner {
                bridge,
                balances,
                state,
                refresh: Mutex::new(None),
            }),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn active_identity(&self) -> Option<Identity> {
        self.inner.state.borrow().active_identity.clone()
    }

    /// Observe session changes. No-op transitions do not notify.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    pub fn bridge(&self) -> &Arc<ExtensionBridge> {
        &self.inner.bridge
    }

    /// Ask the extension for a connection. Returns whether the session is now
    /// connected; the balance arrives later.
    pub async fn connect(&self) -> bool {
        let previous = self.snapshot();
        self.inner.state.send_if_modified(|s| {
            if s.is_connecting() {
                return false;
            }
            s.status = ConnectionStatus::Connecting;
            true
        });

        match self.try_connect().await {
            Ok(identity) => {
                info!("Wallet connected: {}", identity.short());
                self.adopt_identity(identity);
                true
            }
            Err(e) => {
                match &e {
                    WalletError::ProviderNotFound => info!("Casper Wallet not detected"),
                    WalletError::ConnectionRejected => info!("Connection request declined"),
                    other => error!("Connection failed: {}", other),
                }
                let restored = self.inner.state.send_if_modified(|s| {
                    // An extension event may already have settled the session.
                    if !s.is_connecting() {
                        return false;
                    }
                    if !previous.is_connected() {
                        *s = Session::default();
                    } else if s.active_identity == previous.active_identity {
                        // Keep a balance that arrived while the prompt was open.
                        s.status = ConnectionStatus::Connected;
                        if s.balance.is_none() {
                            s.balance = previous.balance.clone();
                        }
                    } else {
                        *s = previous.clone();
                    }
                    true
                });
                if restored {
                    let session = self.snapshot();
                    if let (true, None, Some(identity)) =
                        (session.is_connected(), &session.balance, session.active_identity)
                    {
                        self.spawn_refresh(identity, false);
                    }
                }
                false
            }
        }
    }

    async fn try_connect(&self) -> Result<Identity> {
        if !self.inner.bridge.request_connection().await? {
            return Err(WalletError::ConnectionRejected);
        }
        self.inner.bridge.active_identity().await
    }

    /// Adopt an existing extension connection without prompting the user.
    pub async fn restore(&self) -> bool {
        if self.inner.bridge.detect().is_none() {
            debug!("No wallet provider to restore from");
            return false;
        }
        let connected = match self.inner.bridge.is_connected_to_extension().await {
            Ok(connected) => connected,
            Err(e) => {
                error!("Failed to check wallet connection: {}", e);
                return false;
            }
        };
        if !connected {
            return false;
        }
        match self.inner.bridge.active_identity().await {
            Ok(identity) => {
                info!("Restored wallet session for {}", identity.short());
                self.adopt_identity(identity);
                true
            }
            Err(e) => {
                warn!("Extension reports a connection but no active key: {}", e);
                false
            }
        }
    }

    /// Local state is always cleared, whatever the extension says.
    pub async fn disconnect(&self) {
        match self.inner.bridge.disconnect().await {
            Ok(_) => {}
            Err(WalletError::ProviderNotFound) => debug!("Disconnect without a provider"),
            Err(e) => warn!("Disconnect error: {}", e),
        }
        self.clear();
    }

    /// Apply an extension push event.
    pub fn handle_event(&self, kind: EventKind, payload: &str) {
        match parse_event(kind, payload) {
            Ok(SessionSignal::IdentityChanged(identity)) => {
                debug!("{} -> {}", kind, identity.short());
                self.adopt_identity(identity);
            }
            Ok(SessionSignal::Disconnected) => {
                debug!("{} -> disconnected", kind);
                self.clear();
            }
            Err(e) => warn!("Ignoring {}: {}", kind, e),
        }
    }

    /// Route all extension events to this store. Handlers hold a weak
    /// reference, so the subscriptions do not keep the store alive.
    pub fn attach(&self) -> Vec<Subscription> {
        EventKind::ALL
            .into_iter()
            .map(|kind| {
                let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
                self.inner.bridge.subscribe(kind, move |kind, payload| {
                    if let Some(inner) = weak.upgrade() {
                        SessionStore { inner }.handle_event(kind, payload);
                    }
                })
            })
            .collect()
    }

    /// Re-resolve the balance of the active identity.
    pub fn refresh_balance(&self) {
        let session = self.snapshot();
        match session.active_identity {
            Some(identity) if session.is_connected() => self.spawn_refresh(identity, true),
            _ => debug!("Balance refresh skipped: not connected"),
        }
    }

    /// Wait until a balance is known, or give up after `timeout`.
    pub async fn wait_for_balance(&self, timeout: Duration) -> Option<Balance> {
        let mut rx = self.watch();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|s| s.balance.is_some())).await;
        match waited {
            Ok(Ok(session)) => session.balance.clone(),
            _ => None,
        }
    }

    fn adopt_identity(&self, identity: Identity) {
        let changed = self.inner.state.send_if_modified(|s| {
            let same = s.active_identity.as_ref() == Some(&identity);
            if same && s.is_connected() {
                return false;
            }
            if !same {
                s.balance = None;
            }
            s.status = ConnectionStatus::Connected;
            s.active_identity = Some(identity.clone());
            true
        });
        if changed {
            self.spawn_refresh(identity, false);
        }
    }

    fn clear(&self) {
        if let Some(task) = self.refresh_slot().take() {
            task.handle.abort();
        }
        self.inner.state.send_if_modified(|s| {
            if *s == Session::default() {
                return false;
            }
            *s = Session::default();
            true
        });
    }

    fn refresh_slot(&self) -> MutexGuard<'_, Option<RefreshTask>> {
        self.inner.refresh.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_refresh(&self, identity: Identity, force: bool) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; balance for {} not refreshed", identity.short());
            return;
        };

        let mut slot = self.refresh_slot();
        // Superseded before this task could be registered.
        if self.inner.state.borrow().active_identity.as_ref() != Some(&identity) {
            debug!("Balance refresh for {} skipped: no longer active", identity.short());
            return;
        }
        if let Some(task) = slot.as_ref() {
            if !force && task.identity == identity && !task.handle.is_finished() {
                return;
            }
        }
        if let Some(stale) = slot.take() {
            stale.handle.abort();
        }

        let store = self.clone();
        let target = identity.clone();
        let handle = runtime.spawn(async move {
            match store.inner.balances.resolve_balance(&target).await {
                Ok(balance) => store.apply_balance(&target, balance),
                Err(e) => warn!("Failed to fetch balance for {}: {}", target.short(), e),
            }
        });
        *slot = Some(RefreshTask { identity, handle });
    }

    fn apply_balance(&self, identity: &Identity, balance: Balance) {
        let mut stale = false;
        self.inner.state.send_if_modified(|s| {
            if s.active_identity.as_ref() != Some(identity) {
                stale = true;
                return false;
            }
            if s.balance.as_ref() == Some(&balance) {
                return false;
            }
            s.balance = Some(balance.clone());
            true
        });
        if stale {
            debug!("Discarding balance for inactive identity {}", identity.short());
        } else {
            info!("Balance for {}: {}", identity.short(), balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtensionConfig;
    use crate::crypto::KeyPair;
    use crate::extension::{EventHub, HeadlessWallet, ProviderError, SlotHost, WalletProvider};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Balance source with per-identity latency, recording every call.
    #[derive(Default)]
    struct ScriptedSource {
        balances: Mutex<HashMap<Identity, (u64, Duration)>>,
        calls: Mutex<Vec<Identity>>,
    }

    impl ScriptedSource {
        fn set(&self, identity: &Identity, motes: u64, latency_ms: u64) {
            self.balances
                .lock()
                .unwrap()
                .insert(identity.clone(), (motes, Duration::from_millis(latency_ms)));
        }

        fn calls(&self) -> Vec<Identity> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BalanceSource for ScriptedSource {
        async fn resolve_balance(&self, identity: &Identity) -> Result<Balance> {
            self.calls.lock().unwrap().push(identity.clone());
            let entry = self.balances.lock().unwrap().get(identity).copied();
            match entry {
                Some((motes, latency)) => {
                    tokio::time::sleep(latency).await;
                    Ok(Balance::parse_motes(&motes.to_string())?)
                }
                None => Err(WalletError::RpcProtocol {
                    code: -32003,
                    message: "ValueNotFound".to_string(),
                }),
            }
        }
    }

    struct Fixture {
        host: Arc<SlotHost>,
        wallet: Arc<HeadlessWallet>,
        source: Arc<ScriptedSource>,
        store: SessionStore,
        _subs: Vec<Subscription>,
    }

    fn fixture() -> Fixture {
        let events = EventHub::new();
        let wallet = Arc::new(HeadlessWallet::new(KeyPair::from_passphrase("alice"), events.clone()));
        let host = Arc::new(SlotHost::with_provider(wallet.clone()));
        let bridge = Arc::new(ExtensionBridge::new(host.clone(), events, &ExtensionConfig::default()));
        let source = Arc::new(ScriptedSource::default());
        let store = SessionStore::new(bridge, source.clone());
        let subs = store.attach();
        Fixture { host, wallet, source, store, _subs: subs }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_then_balance() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        f.source.set(&alice, 2_500_000_000, 50);

        assert!(f.store.connect().await);
        let session = f.store.snapshot();
        assert!(session.is_connected());
        assert_eq!(session.active_identity.as_ref(), Some(&alice));
        // connect() does not wait for the balance.
        assert!(session.balance.is_none());

        let balance = f.store.wait_for_balance(Duration::from_secs(5)).await.unwrap();
        assert_eq!(balance.to_cspr_string(), "2.5");
        // The connected event and connect() itself resolve once.
        assert_eq!(f.source.calls(), vec![alice]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_provider() {
        let f = fixture();
        f.host.eject();

        assert!(!f.store.connect().await);
        assert_eq!(f.store.snapshot(), Session::default());
        assert_eq!(f.host.install_prompts(), 1);
        assert!(f.source.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_declined() {
        let f = fixture();
        f.wallet.set_approve_connections(false);

        assert!(!f.store.connect().await);
        assert_eq!(f.store.snapshot(), Session::default());
        assert_eq!(f.host.install_prompts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnect_keeps_session() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        f.source.set(&alice, 7, 0);
        assert!(f.store.connect().await);
        settle().await;
        let before = f.store.snapshot();

        f.wallet.set_approve_connections(false);
        assert!(!f.store.connect().await);
        assert_eq!(f.store.snapshot(), before);
    }

    /// Extension whose connection prompt stays open for `delay` before answering.
    struct SlowPrompt {
        key: String,
        approve: AtomicBool,
        delay: Duration,
    }

    #[async_trait]
    impl WalletProvider for SlowPrompt {
        async fn request_connection(&self) -> std::result::Result<bool, ProviderError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.approve.load(Ordering::SeqCst))
        }
        async fn is_connected(&self) -> std::result::Result<bool, ProviderError> {
            Ok(true)
        }
        async fn get_active_public_key(&self) -> std::result::Result<String, ProviderError> {
            Ok(self.key.clone())
        }
        async fn sign(&self, _: &str, _: &str) -> std::result::Result<String, ProviderError> {
            Err(ProviderError("not supported".to_string()))
        }
        async fn disconnect_from_site(&self) -> std::result::Result<bool, ProviderError> {
            Ok(true)
        }
    }

    fn slow_prompt_store(source: Arc<ScriptedSource>) -> (Arc<SlowPrompt>, SessionStore) {
        let prompt = Arc::new(SlowPrompt {
            key: KeyPair::from_passphrase("carol").identity().to_string(),
            approve: AtomicBool::new(true),
            delay: Duration::from_millis(500),
        });
        let host = Arc::new(SlotHost::with_provider(prompt.clone()));
        let bridge = Arc::new(ExtensionBridge::new(host, EventHub::new(), &ExtensionConfig::default()));
        (prompt, SessionStore::new(bridge, source))
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_arriving_during_declined_reconnect_is_kept() {
        let carol = KeyPair::from_passphrase("carol").identity();
        let source = Arc::new(ScriptedSource::default());
        source.set(&carol, 3_000_000_000, 100);
        let (prompt, store) = slow_prompt_store(source.clone());

        assert!(store.connect().await);
        prompt.approve.store(false, Ordering::SeqCst);
        // The resolution completes while the second prompt is still open.
        assert!(!store.connect().await);

        let session = store.snapshot();
        assert!(session.is_connected());
        assert_eq!(session.active_identity, Some(carol.clone()));
        assert_eq!(session.balance.unwrap().to_cspr_string(), "3");
        assert_eq!(source.calls(), vec![carol]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_reconnect_without_balance_resolves_again() {
        let carol = KeyPair::from_passphrase("carol").identity();
        let source = Arc::new(ScriptedSource::default());
        let (prompt, store) = slow_prompt_store(source.clone());

        // First resolution fails, so the session has no balance yet.
        assert!(store.connect().await);
        settle().await;
        assert!(store.snapshot().balance.is_none());

        source.set(&carol, 5_000_000_000, 10);
        prompt.approve.store(false, Ordering::SeqCst);
        assert!(!store.connect().await);
        settle().await;

        assert_eq!(store.snapshot().balance.unwrap().to_cspr_string(), "5");
        assert_eq!(source.calls(), vec![carol.clone(), carol]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_for_inactive_identity_is_not_spawned() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        let bob = KeyPair::from_passphrase("bob").identity();
        f.source.set(&alice, 1_000_000_000, 100);
        f.source.set(&bob, 2_000_000_000, 0);

        // Not connected: nothing to refresh.
        f.store.spawn_refresh(bob.clone(), true);
        settle().await;
        assert!(f.source.calls().is_empty());

        // A refresh for a superseded identity must not abort the active one.
        assert!(f.store.connect().await);
        f.store.spawn_refresh(bob, true);
        settle().await;
        assert_eq!(f.source.calls(), vec![alice]);
        assert_eq!(f.store.snapshot().balance.unwrap().to_cspr_string(), "1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_even_when_extension_fails() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        f.source.set(&alice, 1_000_000_000, 0);
        assert!(f.store.connect().await);
        settle().await;
        assert!(f.store.snapshot().balance.is_some());

        f.wallet.set_fail_disconnect(true);
        f.store.disconnect().await;
        let session = f.store.snapshot();
        assert!(!session.is_connected());
        assert!(session.active_identity.is_none());
        assert!(session.balance.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_from_any_state() {
        let f = fixture();
        f.store.disconnect().await;
        assert_eq!(f.store.snapshot(), Session::default());

        f.host.eject();
        f.store.disconnect().await;
        assert_eq!(f.store.snapshot(), Session::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_without_key_equals_disconnect() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        f.source.set(&alice, 5, 0);
        assert!(f.store.connect().await);
        settle().await;

        f.store.bridge().events().emit(EventKind::ActiveKeyChanged, "{}");
        assert_eq!(f.store.snapshot(), Session::default());
        // Extension side untouched.
        assert!(f.wallet.is_site_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_key_event_is_idempotent() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        f.source.set(&alice, 3_000_000_000, 0);
        let payload = format!(r#"{{"activeKey":"{}"}}"#, alice);

        let mut rx = f.store.watch();
        f.store.handle_event(EventKind::ActiveKeyChanged, &payload);
        settle().await;
        let first = f.store.snapshot();
        assert!(first.is_connected());
        assert!(first.balance.is_some());
        rx.borrow_and_update();

        f.store.handle_event(EventKind::ActiveKeyChanged, &payload);
        settle().await;
        assert_eq!(f.store.snapshot(), first);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(f.source.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_event_is_ignored() {
        let f = fixture();
        f.store.handle_event(EventKind::ActiveKeyChanged, "{not json");
        f.store.handle_event(EventKind::Connected, r#"{"activeKey":"xyz"}"#);
        assert_eq!(f.store.snapshot(), Session::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_switch_discards_stale_balance() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        let bob = KeyPair::from_passphrase("bob").identity();
        // Alice's resolution is much slower than Bob's.
        f.source.set(&alice, 1_000_000_000, 500);
        f.source.set(&bob, 2_000_000_000, 10);

        assert!(f.store.connect().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.store.snapshot().balance.is_none());

        f.wallet.switch_account(KeyPair::from_passphrase("bob"));
        assert_eq!(f.store.active_identity(), Some(bob.clone()));
        assert!(f.store.snapshot().balance.is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let session = f.store.snapshot();
        assert_eq!(session.active_identity, Some(bob.clone()));
        assert_eq!(session.balance.unwrap().to_cspr_string(), "2");
        assert_eq!(f.source.calls(), vec![alice, bob]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_for_previous_identity_not_applied() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        let bob = KeyPair::from_passphrase("bob").identity();
        f.source.set(&bob, 42, 0);

        f.store.handle_event(EventKind::ActiveKeyChanged, &format!(r#"{{"activeKey":"{}"}}"#, bob));
        settle().await;

        f.store.apply_balance(&alice, Balance::parse_motes("999").unwrap());
        let session = f.store.snapshot();
        assert_eq!(session.active_identity, Some(bob));
        assert_eq!(session.balance.unwrap().to_cspr_string(), "0.000000042");

        f.store.disconnect().await;
        f.store.apply_balance(&alice, Balance::parse_motes("999").unwrap());
        assert!(f.store.snapshot().balance.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_resolution_leaves_balance_unknown() {
        let f = fixture();
        // No scripted balance: the source answers with an RPC error.
        assert!(f.store.connect().await);
        settle().await;
        let session = f.store.snapshot();
        assert!(session.is_connected());
        assert!(session.balance.is_none());
        assert!(f.store.wait_for_balance(Duration::from_millis(100)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_balance_is_not_unknown() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        f.source.set(&alice, 0, 0);
        assert!(f.store.connect().await);
        let balance = f.store.wait_for_balance(Duration::from_secs(1)).await.unwrap();
        assert!(balance.is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_adopts_existing_connection() {
        let f = fixture();
        assert!(!f.store.restore().await);

        // Site connected in an earlier page load; this store starts empty.
        f.wallet.request_connection().await.unwrap();
        f.store.handle_event(EventKind::Disconnected, "{}");
        assert_eq!(f.store.snapshot(), Session::default());

        assert!(f.store.restore().await);
        assert_eq!(f.store.active_identity(), Some(f.wallet.active_identity()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_balance_picks_up_new_value() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        f.source.set(&alice, 1_000_000_000, 0);
        assert!(f.store.connect().await);
        settle().await;

        f.source.set(&alice, 4_000_000_000, 0);
        f.store.refresh_balance();
        settle().await;
        assert_eq!(f.store.snapshot().balance.unwrap().to_cspr_string(), "4");
        assert_eq!(f.source.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extension_lock_disconnects() {
        let f = fixture();
        assert!(f.store.connect().await);
        f.wallet.lock();
        assert_eq!(f.store.snapshot(), Session::default());
    }

    #[test]
    fn test_event_without_runtime_still_updates_state() {
        let f = fixture();
        let alice = f.wallet.active_identity();
        f.store.handle_event(EventKind::Connected, &format!(r#"{{"activeKey":"{}"}}"#, alice));
        assert_eq!(f.store.active_identity(), Some(alice));
        assert!(f.store.snapshot().balance.is_none());
    }
}
