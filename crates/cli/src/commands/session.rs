use crate::wiring;
use anyhow::{Context, Result};
use clap::Args;
use spreadbot_core::ConfigLoader;

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Discard the cached token and log in again
    #[arg(long)]
    pub renew: bool,
}

pub async fn run_session(args: SessionArgs) -> Result<()> {
    let config = ConfigLoader::load_from(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    let session = wiring::session(&config).await?;
    if args.renew {
        session.invalidate().await;
    }
    let state = session.ensure_valid().await?;

    let account = session.client().primary_account().await?;
    println!("Session valid");
    println!("  Account:     {}", account.account_number);
    println!("  Quote feed:  {}", state.dxlink_url);
    Ok(())
}
