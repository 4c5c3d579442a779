//! CLI entry point.
//!
//! Settings are loaded before logging so the configured level and log file
//! apply from the first line.

use clap::Parser;

use zunda_cli::{Cli, Commands, handlers, load_settings, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let ctx = load_settings(cli.config.as_deref())?;
    let _log_guard = logging::init(cli.verbose, &ctx.settings.logging)?;
    tracing::debug!(config = %ctx.config_path.display(), "Settings loaded");

    match cli.command {
        Commands::Serve {
            host,
            port,
            static_dir,
        } => handlers::serve::execute(&ctx, host, port, static_dir).await,
        Commands::Run { source, obs } => handlers::run::execute(&ctx, &source, obs).await,
        Commands::Check => handlers::check::execute(&ctx).await,
        Commands::Projects => handlers::projects::execute(&ctx),
    }
}
