pub mod chain;
pub mod session;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "casper-session")]
#[command(about = "Casper Wallet session and chain-state queries", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "casper-session.toml")]
    pub config: String,

    /// Node RPC endpoint, overrides the configuration file
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the state root hash of the latest block
    StateRoot,
    /// Print the main purse of an account
    Purse {
        /// Account public key (hex, algorithm-tagged)
        public_key: String,
    },
    /// Print the spendable balance of an account
    Balance {
        /// Account public key (hex, algorithm-tagged)
        public_key: String,
    },
    /// Walk through a wallet session against an in-process wallet
    Demo {
        /// Approve the signing prompt (default)
        #[arg(long, conflicts_with = "reject")]
        approve: bool,
        /// Reject the signing prompt
        #[arg(long)]
        reject: bool,
        /// Passphrase the demo wallet key is derived from
        #[arg(long, default_value = "casper-session-demo")]
        passphrase: String,
        /// Seconds to wait for the balance before signing
        #[arg(long, default_value = "15")]
        wait_secs: u64,
    },
}
