mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    //  Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,specfile=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();

    match args.command {
        cli::Commands::List { path } => cli::scans::list(&args.global, &path),
        cli::Commands::Info { path } => cli::scans::info(&args.global, &path),
        cli::Commands::Show { path, scan } => cli::scans::show(&args.global, &path, scan),
        cli::Commands::Data { path, scan, json } => {
            cli::scans::data(&args.global, &path, scan, json)
        }
        cli::Commands::Config(c) => cli::config_cmd::execute(c),
    }
}
