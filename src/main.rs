use clap::Parser;
use skiff::cli::{Cli, Commands};
use skiff::commands;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with env-filter support.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render { debug, debug_opts } => {
            commands::render::run(&cli.global, debug, &debug_opts).await
        }
        Commands::Deploy { flags } => commands::deploy::run(&cli.global, &flags).await,
        Commands::Debug { flags, debug_opts } => {
            commands::debug::run(&cli.global, &flags, &debug_opts).await
        }
        Commands::Delete { dry_run } => commands::delete::run(&cli.global, dry_run).await,
        Commands::Init => commands::init::run(),
        Commands::Validate => commands::validate::run(&cli.global),
        Commands::Doctor => commands::doctor::run().await,
    };

    if let Err(err) = result {
        match err.downcast::<skiff::errors::Error>() {
            Ok(diagnostic) => eprintln!("{:?}", miette::Report::new(diagnostic)),
            Err(other) => eprintln!("Error: {:#}", other),
        }
        std::process::exit(1);
    }
}
