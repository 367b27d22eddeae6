//! # scancatch CLI
//!
//! ```bash
//! scancatch --config ./config/scancatch.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scancatch init` | Create the SQLite database and run schema migrations |
//! | `scancatch serve` | Start the capture listener with a live feed |
//! | `scancatch recent` | List recent captures |
//! | `scancatch show <id>` | Print one capture |
//! | `scancatch copy <id>` | Copy a capture's body to the clipboard |
//! | `scancatch completions <shell>` | Print shell completions |

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use scancatch::{config, history, migrate, server};

/// scancatch: capture HTTP POSTs from the local network and copy them to
/// the clipboard.
#[derive(Parser)]
#[command(name = "scancatch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/scancatch.toml`. When the file does not exist,
    /// built-in defaults are used with the database under `./data`.
    #[arg(long, global = true, default_value = "./config/scancatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; also upgrades databases created before the copied flag
    /// existed.
    Init,

    /// Start the capture listener.
    ///
    /// Binds 0.0.0.0 on the configured port, prints every capture as it
    /// arrives, and copies a capture when its id is typed on stdin.
    Serve {
        /// Port to listen on (overrides `[server].port`).
        #[arg(long)]
        port: Option<u16>,
    },

    /// List recent captures, newest first.
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print one capture in full.
    Show { id: i64 },

    /// Copy a capture's body to the clipboard and mark it copied.
    Copy { id: i64 },

    /// Print shell completions.
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let cfg = load_or_default(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve { port } => {
            let cfg = load_or_default(&cli.config)?;
            server::run_server(&cfg, port).await?;
        }
        Commands::Recent { limit, json } => {
            let cfg = load_or_default(&cli.config)?;
            history::run_recent(&cfg, limit, json).await?;
        }
        Commands::Show { id } => {
            let cfg = load_or_default(&cli.config)?;
            history::run_show(&cfg, id).await?;
        }
        Commands::Copy { id } => {
            let cfg = load_or_default(&cli.config)?;
            history::run_copy(&cfg, id).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "scancatch", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load the config file, or fall back to defaults when it does not exist.
fn load_or_default(path: &Path) -> anyhow::Result<config::Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(config::Config::minimal())
    }
}
