use anyhow::Result;
use clap::Args;
use spreadbot_core::OptionSymbol;

#[derive(Args, Debug)]
pub struct SymbolArgs {
    /// Fixed-width identifier, e.g. "SPXW  241014P05850000"
    pub symbol: String,
}

pub fn run_symbol(args: &SymbolArgs) -> Result<()> {
    let decoded = OptionSymbol::parse(&args.symbol)?;
    println!("Root:        {}", decoded.root);
    println!("Expiration:  {}", decoded.expiration);
    println!("Right:       {:?}", decoded.right);
    println!("Strike:      {:.2}", decoded.strike);
    println!("Quote feed:  {}", decoded.streamer_symbol());
    Ok(())
}
