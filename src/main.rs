use clap::Parser;
use memberlist_coordinator::cli::{Cli, CliHandler, Commands};
use memberlist_coordinator::logging;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Needs neither a valid config nor a cluster
    if let Commands::InitConfig { path } = &cli.command {
        CliHandler::init_config(path)?;
        return Ok(());
    }

    let config = cli.load_config()?;
    logging::init(&config.logging)?;

    let handler = CliHandler::new(config);
    if let Err(e) = handler.execute(&cli.command).await {
        error!("Command failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}
