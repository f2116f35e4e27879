// Client module
pub mod rpc_client;

pub use rpc_client::ChainQueryClient;

use async_trait::async_trait;

use crate::balance::Balance;
use crate::error::Result;
use crate::identity::Identity;

/// Anything that can resolve the spendable balance of an identity.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn resolve_balance(&self, identity: &Identity) -> Result<Balance>;
}
