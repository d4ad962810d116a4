use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "docquery")]
#[command(about = "Ask questions about CSV, Excel, PDF and text files", long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (default: ~/.docquery/config.toml)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Model to use (overrides config)")]
    pub model: Option<String>,

    #[arg(long, global = true, help = "Directory for app.log and interaction logs")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Ask one question about a file")]
    Ask {
        #[arg(help = "File to analyze")]
        file: PathBuf,

        #[arg(help = "The question to answer")]
        question: String,
    },

    #[command(about = "Generate a comprehensive summary report")]
    Summary {
        #[arg(help = "File to analyze")]
        file: PathBuf,
    },

    #[command(about = "Suggest questions worth asking about a file")]
    Suggest {
        #[arg(help = "File to analyze")]
        file: PathBuf,
    },

    #[command(about = "Explain a single column of a tabular file")]
    Explain {
        #[arg(help = "File to analyze")]
        file: PathBuf,

        #[arg(short, long, help = "Column to explain")]
        column: String,
    },

    #[command(about = "Answer questions read from stdin, one per line")]
    Chat {
        #[arg(help = "File to analyze")]
        file: PathBuf,

        #[arg(long, help = "Write a Markdown report of the session on exit")]
        report: Option<PathBuf>,
    },

    #[command(about = "Print the data summary without contacting the model")]
    Preview {
        #[arg(help = "File to analyze")]
        file: PathBuf,
    },

    #[command(about = "Write a default configuration file")]
    InitConfig {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}
