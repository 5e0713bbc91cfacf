//! Dossier CLI: build or inspect a run's report bundle.
//!
//! Usage:
//!   dossier synthesize --run <id> [--force] [--no-intermediate] [--db path] [--config path]
//!   dossier show --run <id> [--db path]

use clap::{Parser, Subcommand};
use dossier::{
    OpenStore, RunId, SqliteStore, SynthesisConfig, SynthesisOptions, SynthesisPipeline,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dossier", version, about = "Evidence-grounded synthesis pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to a YAML pipeline configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the final bundle for a run, reusing cached artifacts
    Synthesize {
        /// Run identifier
        #[arg(long)]
        run: String,
        /// Ignore cached artifacts and rebuild every phase
        #[arg(long)]
        force: bool,
        /// Persist only the final bundle
        #[arg(long)]
        no_intermediate: bool,
    },
    /// Print the stored final bundle for a run
    Show {
        /// Run identifier
        #[arg(long)]
        run: String,
    },
}

/// Get the default database path (~/.local/share/dossier/dossier.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("dossier").join("dossier.db")
}

fn open_pipeline(db: Option<PathBuf>, config: Option<PathBuf>) -> Result<SynthesisPipeline, String> {
    let config = match config {
        Some(path) => SynthesisConfig::from_yaml_file(&path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e))?,
        None => SynthesisConfig::default(),
    };
    let db_path = db.unwrap_or_else(default_db_path);
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    SynthesisPipeline::new(Arc::new(store), config).map_err(|e| e.to_string())
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_synthesize(pipeline: &SynthesisPipeline, run: &str, force: bool, no_intermediate: bool) -> i32 {
    let mut options = SynthesisOptions::from_config(pipeline.config());
    if force {
        options = options.forced();
    }
    if no_intermediate {
        options = options.with_persist_intermediate(false);
    }
    match pipeline.synthesize(&RunId::from_string(run), options) {
        Ok(outcome) => {
            for diagnostic in outcome.diagnostics.entries() {
                match serde_json::to_string(diagnostic) {
                    Ok(line) => eprintln!("diagnostic: {}", line),
                    Err(e) => eprintln!("diagnostic: <unprintable: {}>", e),
                }
            }
            print_json(&outcome.bundle)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_show(pipeline: &SynthesisPipeline, run: &str) -> i32 {
    match pipeline.load_final_bundle(&RunId::from_string(run)) {
        Ok(Some(bundle)) => print_json(&bundle),
        Ok(None) => {
            eprintln!("Error: no final bundle for run '{}'", run);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dossier=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let pipeline = match open_pipeline(cli.db, cli.config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let code = match cli.command {
        Commands::Synthesize { run, force, no_intermediate } => {
            cmd_synthesize(&pipeline, &run, force, no_intermediate)
        }
        Commands::Show { run } => cmd_show(&pipeline, &run),
    };
    std::process::exit(code);
}
