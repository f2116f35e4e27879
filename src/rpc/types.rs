// JSON-RPC 2.0 envelope and Casper node result types
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

pub const JSONRPC_VERSION: &str = "2.0";

pub const METHOD_GET_BLOCK: &str = "chain_get_block";
pub const METHOD_GET_ITEM: &str = "state_get_item";
pub const METHOD_GET_BALANCE: &str = "state_get_balance";

#[derive(Serialize, Debug)]
pub struct RpcRequest<'a, P: Serialize> {
    pub id: u64,
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: P,
}

impl<'a, P: Serialize> RpcRequest<'a, P> {
    pub fn new(id: u64, method: &'a str, params: P) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
}

impl RpcResponse {
    /// Exactly one of `result` / `error` must be present.
    pub fn into_result(self) -> Result<serde_json::Value, WalletError> {
        match (self.result, self.error) {
            (Some(result), None) => Ok(result),
            (None, Some(RpcError { code, message: Some(message) })) => {
                Err(WalletError::RpcProtocol { code, message })
            }
            (None, Some(RpcError { code, message: None })) => Err(WalletError::MalformedResponse(
                format!("error object {} carries no message", code),
            )),
            (Some(_), Some(_)) => Err(WalletError::MalformedResponse(
                "response carries both result and error".to_string(),
            )),
            (None, None) => Err(WalletError::MalformedResponse(
                "response carries neither result nor error".to_string(),
            )),
        }
    }

    /// Decode the successful result into a typed shape.
    pub fn into_typed<T: DeserializeOwned>(self, method: &str) -> Result<T, WalletError> {
        let value = self.into_result()?;
        serde_json::from_value(value)
            .map_err(|e| WalletError::MalformedResponse(format!("{}: {}", method, e)))
    }
}

// Empty object, `chain_get_block` takes no block identifier for the tip.
#[derive(Serialize, Debug, Default)]
pub struct GetBlockParams {}

#[derive(Serialize, Debug)]
pub struct GetItemParams<'a> {
    pub state_root_hash: &'a str,
    pub key: &'a str,
    pub path: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct GetBalanceParams<'a> {
    pub state_root_hash: &'a str,
    pub purse_uref: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct GetBlockResult {
    pub block: BlockInfo,
}

#[derive(Deserialize, Debug)]
pub struct BlockInfo {
    pub header: BlockHeader,
}

#[derive(Deserialize, Debug)]
pub struct BlockHeader {
    pub state_root_hash: String,
    #[serde(default)]
    pub height: Option<u64>,
}

#[derive(Deserialize, Debug)]
pub struct GetItemResult {
    pub stored_value: StoredValue,
}

#[derive(Deserialize, Debug)]
pub struct StoredValue {
    #[serde(rename = "Account", default)]
    pub account: Option<AccountRecord>,
}

#[derive(Deserialize, Debug)]
pub struct AccountRecord {
    pub main_purse: String,
}

#[derive(Deserialize, Debug)]
pub struct GetBalanceResult {
    pub balance_value: String,
}
