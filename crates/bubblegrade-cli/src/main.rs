//! bubblegrade CLI: grade multiple-choice bubble sheets with a vision model.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "bubblegrade",
    version,
    about = "Grade multiple-choice bubble answer sheets with a vision model"
)]
struct Cli {
    /// Config file path (default: ./bubblegrade.toml, then ~/.config/bubblegrade/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read and grade a sheet image (or every image in a directory)
    Grade {
        /// Image file, directory of images, or "-" for stdin
        #[arg(long)]
        image: PathBuf,

        /// Answer key TOML file (default: the active key)
        #[arg(long)]
        key: Option<PathBuf>,

        /// Student name stored with the result
        #[arg(long)]
        student: Option<String>,

        /// Save the result to the history
        #[arg(long)]
        save: bool,

        /// Output format: text, json, html, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Directory for HTML reports
        #[arg(long, default_value = ".")]
        output: PathBuf,

        /// Model to use, as "provider/model" or a model of the default provider
        #[arg(long)]
        model: Option<String>,

        /// Ask for the pixel location of each mark
        #[arg(long)]
        locations: bool,

        /// Grade with a key that leaves some questions unset
        #[arg(long)]
        allow_incomplete: bool,
    },

    /// Grade a recognition reply stored as JSON, without calling a model
    Regrade {
        /// JSON file holding the reply ({"1": "A", "2": "N/A", ...})
        #[arg(long)]
        answers: PathBuf,

        /// Answer key TOML file (default: the active key)
        #[arg(long)]
        key: Option<PathBuf>,

        /// Student name stored with the result
        #[arg(long)]
        student: Option<String>,

        /// Save the result to the history
        #[arg(long)]
        save: bool,

        /// Output format: text, json, html, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Directory for HTML reports
        #[arg(long, default_value = ".")]
        output: PathBuf,

        /// Grade with a key that leaves some questions unset
        #[arg(long)]
        allow_incomplete: bool,
    },

    /// Manage the active answer key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Inspect or export saved results
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Validate an answer key TOML file
    Validate {
        /// Path to the answer key file
        #[arg(long)]
        key: PathBuf,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,
    },

    /// Create starter config and example answer key
    Init,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Make a key file the active answer key
    Import {
        /// Answer key TOML file
        #[arg(long)]
        file: PathBuf,

        /// Accept a key that leaves some questions unset
        #[arg(long)]
        allow_incomplete: bool,
    },
    /// Print the active answer key
    Show,
    /// Remove the active answer key
    Clear,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List saved results, newest first
    List {
        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Summary statistics and per-question analysis
    Stats,
    /// Write the history as an HTML page
    Export {
        /// Output HTML file
        #[arg(long)]
        output: PathBuf,
    },
    /// Delete every saved result
    Clear,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bubblegrade=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Grade {
            image,
            key,
            student,
            save,
            format,
            output,
            model,
            locations,
            allow_incomplete,
        } => {
            commands::grade::execute(commands::grade::GradeArgs {
                image,
                key,
                student,
                save,
                format,
                output,
                model,
                locations,
                allow_incomplete,
                config,
            })
            .await
        }
        Commands::Regrade {
            answers,
            key,
            student,
            save,
            format,
            output,
            allow_incomplete,
        } => commands::regrade::execute(commands::regrade::RegradeArgs {
            answers,
            key,
            student,
            save,
            format,
            output,
            allow_incomplete,
            config,
        }),
        Commands::Key { action } => match action {
            KeyAction::Import {
                file,
                allow_incomplete,
            } => commands::key::import(file, allow_incomplete, config),
            KeyAction::Show => commands::key::show(config),
            KeyAction::Clear => commands::key::clear(config),
        },
        Commands::History { action } => match action {
            HistoryAction::List { format } => commands::history::list(format, config),
            HistoryAction::Stats => commands::history::stats(config),
            HistoryAction::Export { output } => commands::history::export(output, config),
            HistoryAction::Clear => commands::history::clear(config),
        },
        Commands::Validate { key } => commands::validate::execute(key),
        Commands::ListModels { provider } => commands::list_models::execute(provider, config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
