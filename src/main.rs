use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use casper_session::cli::session::DemoOptions;
use casper_session::cli::{chain, session, Cli, Commands};
use casper_session::{ChainQueryClient, WalletConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = WalletConfig::load_or_default(&cli.config);
    if let Some(url) = cli.rpc_url {
        config.node.rpc_url = url;
    }
    info!("RPC URL: {}", config.node.rpc_url);

    match cli.command {
        Commands::StateRoot => {
            let client = ChainQueryClient::from_config(&config.node)?;
            chain::handle_state_root(&client).await?;
        }
        Commands::Purse { public_key } => {
            let client = ChainQueryClient::from_config(&config.node)?;
            chain::handle_purse(&client, &public_key).await?;
        }
        Commands::Balance { public_key } => {
            let client = ChainQueryClient::from_config(&config.node)?;
            chain::handle_balance(&client, &public_key).await?;
        }
        Commands::Demo {
            approve: _,
            reject,
            passphrase,
            wait_secs,
        } => {
            let options = DemoOptions {
                passphrase,
                approve_signing: !reject,
                wait: Duration::from_secs(wait_secs),
            };
            session::handle_demo(&config, options).await?;
        }
    }

    Ok(())
}
