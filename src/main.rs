use anyhow::Result;
use clap::Parser;

use livemd::cli::commands::{self, add::AddArgs};
use livemd::cli::{Cli, Commands};
use livemd::lockfile::LockFile;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Version => {
            println!("livemd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Port { port } => commands::port::run(port, config, &LockFile::default_location()?),
        Commands::Start { port } => {
            let settings = commands::load_settings(config)?;
            commands::start::run(port, settings, LockFile::default_location()?).await
        }
        Commands::Add {
            path,
            recursive,
            filter,
            inactive,
            yes,
        } => {
            let settings = commands::load_settings(config)?;
            let args = AddArgs {
                path,
                recursive,
                filter,
                inactive,
                yes,
            };
            commands::add::run(args, &settings, &LockFile::default_location()?).await
        }
        Commands::Remove { path } => {
            commands::remove::run(&path, &LockFile::default_location()?).await
        }
        Commands::List => commands::list::run(&LockFile::default_location()?).await,
        Commands::Stop => commands::stop::run(&LockFile::default_location()?).await,
        Commands::Update => commands::update::run().await,
    }
}
