//! idbkit demo
//!
//! Runs the todo and user-preferences sessions against the in-memory engine
//! and prints every snapshot the binding goes through.
//!
//! Usage:
//!     idbkit-demo todos "Buy milk" "Walk dog"
//!     idbkit-demo prefs --theme dark --language fr
//!     idbkit-demo --config db.json todos "Write report"

mod logging;
mod scenarios;

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use idbkit_core::{Binding, MemoryEngine};
use tracing::info;

use scenarios::{PrefsChanges, Theme};

#[derive(Parser, Debug)]
#[command(name = "idbkit-demo")]
#[command(about = "Drive an idbkit binding through the demo sessions")]
#[command(version)]
struct Args {
    /// JSON database configuration replacing the scenario's default
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add todos, toggle the first one and delete the last one
    Todos {
        /// Todo texts to add
        #[arg(default_values = ["Buy milk", "Write report"])]
        texts: Vec<String>,
    },
    /// Load the stored preferences, change them and save
    Prefs {
        #[arg(long, value_enum)]
        theme: Option<Theme>,

        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        notifications: Option<bool>,

        #[arg(long)]
        auto_save: Option<bool>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_with_filter(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "idbkit demo");

    let engine = MemoryEngine::new();
    let mut out = io::stdout().lock();

    match args.command {
        Command::Todos { texts } => {
            let config =
                scenarios::load_config(args.config.as_deref(), scenarios::todo_config())?;
            let todos = Binding::new(config, engine)?;
            scenarios::run_todos(&todos, &texts, &mut out).await?;
        }
        Command::Prefs {
            theme,
            language,
            notifications,
            auto_save,
        } => {
            let config =
                scenarios::load_config(args.config.as_deref(), scenarios::prefs_config())?;
            let prefs = Binding::new(config, engine)?;
            let changes = PrefsChanges {
                theme,
                language,
                notifications,
                auto_save,
            };
            scenarios::run_prefs(&prefs, changes, &mut out).await?;
        }
    }

    Ok(())
}
