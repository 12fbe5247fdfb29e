use clap::{Parser, Subcommand};

mod commands;
mod wiring;

use commands::{OpenSpreadArgs, SessionArgs, SymbolArgs};

#[derive(Parser)]
#[command(name = "spreadbot")]
#[command(about = "Delta-targeted options spread automation for tastytrade", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select, price, validate and (optionally) place one spread
    OpenSpread(OpenSpreadArgs),
    /// Validate the cached session, renewing it if needed
    Session(SessionArgs),
    /// Decode a fixed-width option identifier
    Symbol(SymbolArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::OpenSpread(args) => commands::run_open_spread(args).await,
        Commands::Session(args) => commands::run_session(args).await,
        Commands::Symbol(args) => commands::run_symbol(&args),
    }
}
