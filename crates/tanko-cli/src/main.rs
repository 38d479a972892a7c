//! CLI entry point.
//!
//! Logging, `.env` loading and argument parsing happen here; everything
//! else is wired in `bootstrap` and run by `handlers`.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use tanko_cli::error::exit_code_of;
use tanko_cli::handlers::download::DownloadArgs;
use tanko_cli::{Cli, CliConfig, Commands, handlers};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = cli.settings();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Download {
            chapter_urls,
            manga,
            source_name,
            base_url,
            token,
            workers: _,
            retries: _,
        } => {
            let args = DownloadArgs {
                chapter_urls,
                manga,
                source_name,
                base_url,
                token,
            };
            handlers::download::execute(settings, args).await?;
        }
        Commands::Cache { command } => {
            let config = CliConfig::from_settings(settings)?;
            handlers::cache::execute(&config, command).await?;
        }
        Commands::Paths => {
            let config = CliConfig::from_settings(settings)?;
            handlers::paths::execute(&config);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(u8::try_from(exit_code_of(&err)).unwrap_or(1))
        }
    }
}
