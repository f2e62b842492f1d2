//! sqlite-playground CLI - run the schema, CRUD, session and relationship walkthroughs.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlite_playground::logging::{LineFormat, Loggers, NormalizedLayer};
use sqlite_playground::sqlite::{Schema, SqliteConfig, SqliteEngine};
use sqlite_playground::{printer, walkthrough};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlite-playground")]
#[command(about = "Schema, CRUD, session and logging walkthroughs on SQLite")]
#[command(version)]
struct Cli {
    /// Database file (default depends on the walkthrough)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Do not echo SQL statements
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    /// Keep the engine's own echo handler and propagation (lines print twice)
    #[arg(long, global = true)]
    no_normalize: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Students table through table objects and CRUD operations
    Core,

    /// Customers through the session
    Declarative,

    /// Customers and invoices
    Relations {
        /// Stop once the tables are created
        #[arg(long)]
        schema_only: bool,
    },

    /// Show the driver and reflect every table of an existing database
    Inspect {
        /// Print the reflected schema as JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn default_db(&self) -> &'static str {
        match self {
            Commands::Core | Commands::Inspect { .. } => "college.db",
            Commands::Declarative | Commands::Relations { .. } => "sales.db",
        }
    }

    /// Inspect reads an existing file; every other walkthrough starts from scratch
    fn resets_db(&self) -> bool {
        !matches!(self, Commands::Inspect { .. })
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(loggers: &Loggers, verbosity: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(verbosity))
        .with_context(|| format!("invalid verbosity {verbosity:?}"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(NormalizedLayer::new(loggers.clone(), std::io::stdout))
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let loggers = Loggers::new(LineFormat::Fixed);
    init_logging(&loggers, &cli.verbosity)?;

    let db = cli
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(cli.command.default_db()));
    let config = SqliteConfig::new(&db, Schema::new())
        .with_echo(!cli.quiet)
        .with_reset(cli.command.resets_db());
    let engine = SqliteEngine::open(config, &loggers)
        .with_context(|| format!("opening {}", db.display()))?;

    if !cli.no_normalize {
        let changed = loggers.normalize(&[walkthrough::LOG_TARGET, module_path!()]);
        info!("normalized {} logger(s)", changed);
    }

    match cli.command {
        Commands::Core => walkthrough::core(&engine)?,
        Commands::Declarative => walkthrough::declarative(&engine)?,
        Commands::Relations { schema_only } => walkthrough::relations(&engine, schema_only)?,
        Commands::Inspect { json } => {
            let schema = walkthrough::inspect(&engine)?;
            if json {
                println!("{}", printer::render_json(&schema)?);
            }
        }
    }
    Ok(())
}
