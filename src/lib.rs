//! Casper Wallet session and chain-state queries for the prediction market
//! front end.
//!
//! ```text
//! connect() ──► ExtensionBridge ──► WalletProvider (extension)
//!    │                 │
//!    │           push events
//!    ▼                 ▼
//! SessionStore ◄───────┘
//!    │  identity changed
//!    ▼
//! ChainQueryClient: chain_get_block → state_get_item → state_get_balance
//! ```
//!
//! [`signer::DeploySigner`] signs deploys with the session's active key.

pub mod balance;
pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extension;
pub mod identity;
pub mod rpc;
pub mod session;
pub mod signer;

pub use balance::Balance;
pub use client::{BalanceSource, ChainQueryClient};
pub use config::WalletConfig;
pub use error::WalletError;
pub use extension::{ExtensionBridge, WalletProvider};
pub use identity::Identity;
pub use session::{ConnectionStatus, Session, SessionStore};
pub use signer::{DeploySigner, SignedDeploy};
