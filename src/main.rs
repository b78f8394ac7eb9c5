//! Curator CLI entry point.

use clap::Parser;

use curator::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => curator::cli::commands::serve::execute(args, cli.json).await,
        Commands::Config(command) => {
            curator::cli::commands::config::execute(command, cli.json).await
        }
    };

    if let Err(err) = result {
        curator::cli::handle_error(err, cli.json);
    }
}
