//! docquery - ask a language model questions about spreadsheets, PDFs and text files

use anyhow::Result;
use clap::Parser as _;
use cli::{Cli, Commands};
use handlers::Query;

mod cli;
mod handlers;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = handlers::Settings {
        config: cli.config,
        model: cli.model,
        log_dir: cli.log_dir,
    };

    match cli.command {
        Commands::Ask { file, question } => {
            handlers::handle_query(&settings, &file, Query::Ask(question)).await
        }
        Commands::Summary { file } => handlers::handle_query(&settings, &file, Query::Summary).await,
        Commands::Suggest { file } => handlers::handle_query(&settings, &file, Query::Suggest).await,
        Commands::Explain { file, column } => {
            handlers::handle_query(&settings, &file, Query::Explain(column)).await
        }
        Commands::Chat { file, report } => {
            handlers::handle_chat(&settings, &file, report.as_deref()).await
        }
        Commands::Preview { file } => handlers::handle_preview(&settings, &file).await,
        Commands::InitConfig { force } => handlers::handle_init_config(&settings, force),
    }
}
