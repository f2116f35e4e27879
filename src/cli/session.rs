//! Headless walkthrough of a wallet session: connect, resolve the balance,
//! sign a deploy, disconnect.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::client::ChainQueryClient;
use crate::config::WalletConfig;
use crate::crypto::KeyPair;
use crate::error::{Result, WalletError};
use crate::extension::{EventHub, ExtensionBridge, HeadlessWallet, SlotHost};
use crate::identity::Identity;
use crate::session::SessionStore;
use crate::signer::DeploySigner;

pub struct DemoOptions {
    pub passphrase: String,
    pub approve_signing: bool,
    pub wait: Duration,
}

/// Market order deploy used by the walkthrough.
pub fn sample_deploy(account: &Identity) -> Value {
    json!({
        "header": {
            "account": account.as_str(),
            "chain_name": "casper-test",
            "ttl": "30m",
            "gas_price": 1
        },
        "payment": {
            "ModuleBytes": {
                "module_bytes": "",
                "args": [["amount", {"cl_type": "U512", "parsed": "2500000000"}]]
            }
        },
        "session": {
            "StoredContractByName": {
                "name": "prediction_market",
                "entry_point": "buy_yes",
                "args": [["shares", {"cl_type": "U64", "parsed": 10}]]
            }
        }
    })
}

pub async fn handle_demo(config: &WalletConfig, options: DemoOptions) -> Result<()> {
    let events = EventHub::new();
    let wallet = Arc::new(HeadlessWallet::new(
        KeyPair::from_passphrase(&options.passphrase),
        events.clone(),
    ));
    wallet.set_approve_signing(options.approve_signing);

    let host = Arc::new(SlotHost::with_provider(wallet.clone()));
    let bridge = Arc::new(ExtensionBridge::new(host, events, &config.extension));
    let client = Arc::new(ChainQueryClient::from_config(&config.node)?);
    let store = SessionStore::new(bridge, client);
    let subscriptions = store.attach();

    println!("Wallet account: {}", wallet.active_identity());
    if !store.connect().await {
        return Err(WalletError::ConnectionRejected);
    }
    let identity = store.active_identity().ok_or(WalletError::NotConnected)?;
    println!("Connected as {}", identity.short());

    match store.wait_for_balance(options.wait).await {
        Some(balance) => println!("Balance: {}", balance),
        None => {
            warn!("No balance from {} within {:?}", config.node.rpc_url, options.wait);
            println!("Balance: unavailable");
        }
    }

    let signer = DeploySigner::new(store.clone());
    match signer.try_sign_deploy(&sample_deploy(&identity)).await {
        Some(signed) => {
            println!("Signature: {}", signed.signature_hex);
            println!("Verified against payload: {}", signed.verify());
        }
        None => println!("Deploy not signed"),
    }

    store.disconnect().await;
    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    info!("Session closed, extension connected: {}", wallet.is_site_connected());
    println!("Disconnected");
    Ok(())
}
