//! Push notifications from the wallet extension.
//!
//! The extension announces key switches, connections and disconnections as
//! named events carrying a JSON payload. Handlers are registered on an
//! [`EventHub`] and receive the raw payload; [`parse_event`] turns it into a
//! validated [`SessionSignal`].

use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::error::{Result, WalletError};
use crate::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ActiveKeyChanged,
    Connected,
    Disconnected,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::ActiveKeyChanged,
        EventKind::Connected,
        EventKind::Disconnected,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            EventKind::ActiveKeyChanged => "casper-wallet:activeKeyChanged",
            EventKind::Connected => "casper-wallet:connected",
            EventKind::Disconnected => "casper-wallet:disconnected",
        }
    }

    /// Accepts the extension's `casper-wallet:` names and the bare `wallet:` form.
    pub fn from_event_name(name: &str) -> Option<Self> {
        let suffix = name
            .strip_prefix("casper-")
            .unwrap_or(name)
            .strip_prefix("wallet:")?;
        Self::ALL
            .into_iter()
            .find(|k| k.event_name().strip_prefix("casper-wallet:") == Some(suffix))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// What an event means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    IdentityChanged(Identity),
    Disconnected,
}

#[derive(Deserialize, Debug)]
struct EventPayload {
    #[serde(rename = "activeKey", default)]
    active_key: Option<String>,
}

/// Validate an event payload. A `disconnected` event, or any payload without
/// a non-empty `activeKey`, means the session is gone.
pub fn parse_event(kind: EventKind, payload: &str) -> Result<SessionSignal> {
    if kind == EventKind::Disconnected {
        return Ok(SessionSignal::Disconnected);
    }

    let payload: EventPayload = serde_json::from_str(payload)
        .map_err(|e| WalletError::MalformedResponse(format!("{} payload: {}", kind, e)))?;

    match payload.active_key.filter(|k| !k.trim().is_empty()) {
        None => Ok(SessionSignal::Disconnected),
        Some(key) => Identity::parse(&key)
            .map(SessionSignal::IdentityChanged)
            .map_err(|e| WalletError::MalformedResponse(format!("{} payload: {}", kind, e))),
    }
}

pub type EventHandler = Arc<dyn Fn(EventKind, &str) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    next_id: u64,
    handlers: Vec<(u64, EventKind, EventHandler)>,
}

/// Fan-out of extension events to registered handlers.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(EventKind, &str) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.handlers.push((id, kind, Arc::new(handler)));
        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    /// Deliver an event to every handler registered for `kind`.
    /// Handlers run outside the hub lock so they may subscribe or unsubscribe.
    pub fn emit(&self, kind: EventKind, payload: &str) -> usize {
        let handlers: Vec<EventHandler> = lock(&self.inner)
            .handlers
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        for handler in &handlers {
            handler(kind, payload);
        }
        handlers.len()
    }

    /// Dispatch by wire name; unknown names are ignored.
    pub fn emit_named(&self, event_name: &str, payload: &str) -> usize {
        match EventKind::from_event_name(event_name) {
            Some(kind) => self.emit(kind, payload),
            None => 0,
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).handlers.len()
    }
}

/// Registration handle. Dropping it keeps the handler registered.
pub struct Subscription {
    id: u64,
    hub: Weak<Mutex<HubInner>>,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the handler. Returns true only on the call that removed it.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        match self.hub.upgrade() {
            Some(hub) => {
                let mut inner = lock(&hub);
                let before = inner.handlers.len();
                inner.handlers.retain(|(id, _, _)| *id != self.id);
                inner.handlers.len() != before
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
