use crate::client::ChainQueryClient;
use crate::error::Result;
use crate::identity::Identity;

pub async fn handle_state_root(client: &ChainQueryClient) -> Result<()> {
    let state_root_hash = client.get_state_root_hash().await?;
    println!("{}", state_root_hash);
    Ok(())
}

pub async fn handle_purse(client: &ChainQueryClient, public_key: &str) -> Result<()> {
    let identity: Identity = public_key.parse()?;
    let state_root_hash = client.get_state_root_hash().await?;
    let purse = client.get_main_purse(&state_root_hash, &identity).await?;
    println!("{}", purse);
    Ok(())
}

pub async fn handle_balance(client: &ChainQueryClient, public_key: &str) -> Result<()> {
    let identity: Identity = public_key.parse()?;
    let balance = client.resolve_balance(&identity).await?;
    println!("Account: {}", identity);
    println!("Motes:   {}", balance.motes());
    println!("Balance: {}", balance);
    Ok(())
}
