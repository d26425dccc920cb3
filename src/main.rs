//! # Spoorgids CLI (`spoor`)
//!
//! The `spoor` binary executes one skill action per invocation and prints
//! the JSON result envelope. It is the same surface a conversational caller
//! uses, exposed for scripting and debugging.
//!
//! ## Usage
//!
//! ```bash
//! spoor --config ./config/spoor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `spoor exec <action> [--args JSON]` | Execute a named action with structured arguments |
//! | `spoor ask "<free text>"` | Run Dutch free text through the heuristics into a trip search |
//! | `spoor stations <query>` | Shorthand for `exec stations.search` |
//!
//! ## Examples
//!
//! ```bash
//! # Structured trip search
//! spoor exec trips.search --args '{"from": "ASD", "to": "UT", "hard": {"directOnly": true}}'
//!
//! # Free-text trip search
//! spoor ask "morgen om 9 van Amsterdam naar Utrecht zonder overstap"
//!
//! # Station lookup
//! spoor stations "den haag"
//!
//! # Departure board
//! spoor exec departures.list --args '{"station": "Utrecht Centraal"}'
//! ```

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use spoorgids::{config, Skill};

/// Spoorgids CLI — a conversational skill for Dutch public-transit queries.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/spoor.example.toml` for a full example. The upstream
/// subscription key may also be supplied via the `NS_API_KEY` environment
/// variable.
#[derive(Parser)]
#[command(
    name = "spoor",
    about = "Spoorgids — NS travel queries from the command line",
    version,
    long_about = "Spoorgids turns travel intent into NS rail-information API calls: it \
    resolves ambiguous station names, applies hard and soft constraints, and prints ranked, \
    cached results as JSON envelopes."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/spoor.toml`. Gateway mirrors, timeouts, cache
    /// and resolver settings are read from this file.
    #[arg(long, global = true, default_value = "./config/spoor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Execute a named action.
    ///
    /// Actions: stations.search, stations.nearest, departures.list,
    /// departures.window, arrivals.list, trips.search, trips.detail,
    /// journey.detail, disruptions.list, disruptions.by_station,
    /// disruptions.detail.
    Exec {
        /// Action name, e.g. `trips.search`.
        action: String,

        /// Action arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Run Dutch free text through the route/time heuristics and search
    /// trips.
    ///
    /// Understands "van X naar Y" routes, "zonder overstap" directness, and
    /// relative day phrases like "morgen om 9" or "vanavond".
    Ask {
        /// The free-text travel question.
        text: String,
    },

    /// Search stations by name (shorthand for `exec stations.search`).
    Stations {
        /// Free-text station query.
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let skill = Skill::new(&cfg)?;

    let envelope = match cli.command {
        Commands::Exec { action, args } => {
            let args: Value = serde_json::from_str(&args)
                .map_err(|e| anyhow::anyhow!("--args is not valid JSON: {}", e))?;
            skill.execute(&action, args).await
        }
        Commands::Ask { text } => skill.ask(&text).await,
        Commands::Stations { query } => {
            skill
                .execute("stations.search", serde_json::json!({"query": query}))
                .await
        }
    };

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}
