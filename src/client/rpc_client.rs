// JSON-RPC client for the Casper node balance queries
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::BalanceSource;
use crate::balance::Balance;
use crate::config::NodeConfig;
use crate::error::{Result, WalletError};
use crate::identity::Identity;
use crate::rpc::types::{
    GetBalanceParams, GetBalanceResult, GetBlockParams, GetBlockResult, GetItemParams,
    GetItemResult, RpcRequest, RpcResponse, METHOD_GET_BALANCE, METHOD_GET_BLOCK,
    METHOD_GET_ITEM,
};

/// Stateless with respect to the session: every resolution starts from a fresh
/// state root hash.
pub struct ChainQueryClient {
    url: String,
    client: Client,
    request_id: AtomicU64,
}

impl ChainQueryClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        Self::new(config.rpc_url.clone(), config.request_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Step 1: snapshot point for the two reads that follow.
    pub async fn get_state_root_hash(&self) -> Result<String> {
        let res: GetBlockResult = self
            .send_request(METHOD_GET_BLOCK, GetBlockParams::default())
            .await?;
        if res.block.header.state_root_hash.is_empty() {
            return Err(WalletError::MalformedResponse(
                "empty state_root_hash".to_string(),
            ));
        }
        Ok(res.block.header.state_root_hash)
    }

    /// Step 2: the account's main purse under the given state root.
    pub async fn get_main_purse(&self, state_root_hash: &str, identity: &Identity) -> Result<String> {
        let res: GetItemResult = self
            .send_request(
                METHOD_GET_ITEM,
                GetItemParams {
                    state_root_hash,
                    key: identity.account_key(),
                    path: vec![],
                },
            )
            .await?;
        res.stored_value
            .account
            .map(|account| account.main_purse)
            .ok_or_else(|| {
                WalletError::MalformedResponse(format!(
                    "stored value for {} is not an account",
                    identity.short()
                ))
            })
    }

    /// Step 3: purse balance under the same state root.
    pub async fn get_purse_balance(&self, state_root_hash: &str, purse_uref: &str) -> Result<Balance> {
        let res: GetBalanceResult = self
            .send_request(
                METHOD_GET_BALANCE,
                GetBalanceParams {
                    state_root_hash,
                    purse_uref,
                },
            )
            .await?;
        Balance::parse_motes(&res.balance_value)
    }

    /// Three dependent calls, strictly in order. Any failure stops the chain.
    pub async fn resolve_balance(&self, identity: &Identity) -> Result<Balance> {
        let state_root_hash = self.get_state_root_hash().await?;
        let purse = self.get_main_purse(&state_root_hash, identity).await?;
        let balance = self.get_purse_balance(&state_root_hash, &purse).await?;
        debug!(
            "Resolved balance for {} at {}: {}",
            identity.short(),
            state_root_hash,
            balance
        );
        Ok(balance)
    }

    // Helper for sending requests
    async fn send_request<P: Serialize, T: DeserializeOwned>(&self, method: &str, params: P) -> Result<T> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest::new(id, method, params);
        debug!("RPC {} (id {}) -> {}", method, id, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::RpcTransport(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::RpcTransport(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let body: RpcResponse = response.json().await.map_err(|e| {
            WalletError::RpcTransport(format!("Failed to parse {} response: {}", method, e))
        })?;
        body.into_typed(method)
    }
}

#[async_trait]
impl BalanceSource for ChainQueryClient {
    async fn resolve_balance(&self, identity: &Identity) -> Result<Balance> {
        ChainQueryClient::resolve_balance(self, identity).await
    }
}
