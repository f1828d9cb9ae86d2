//! # pagewright CLI
//!
//! Command-line interface for the pagewright documentation site generator.

mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagewright")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "pagewright.yml", env = "PAGEWRIGHT_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site and write artifacts to the output directory
    Build {
        #[command(flatten)]
        overrides: BuildOverrides,
    },

    /// Run the pipeline without writing output and summarize diagnostics
    Verify {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        overrides: BuildOverrides,
    },

    /// Query the search index written by the last build
    Search {
        /// Search query
        query: String,

        /// Maximum results to return
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Return JSON for machine consumption
        #[arg(long)]
        json: bool,
    },
}

/// Command-line overrides layered on top of the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildOverrides {
    /// Additional docs content root (repeatable)
    #[arg(long = "content-root", value_name = "DIR")]
    pub content_roots: Vec<PathBuf>,

    /// Output directory
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Failure policy for broken links
    #[arg(long, value_enum)]
    pub on_broken_links: Option<PolicyArg>,

    /// Include documents marked `draft: true`
    #[arg(long)]
    pub drafts: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum PolicyArg {
    Throw,
    Warn,
    Ignore,
}

impl PolicyArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyArg::Throw => "throw",
            PolicyArg::Warn => "warn",
            PolicyArg::Ignore => "ignore",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable with --json
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Build { overrides } => commands::build_site(&cli.config, &overrides),
        Commands::Verify { json, overrides } => commands::verify_site(&cli.config, &overrides, json),
        Commands::Search { query, limit, json } => commands::search_site(&cli.config, &query, limit, json),
    }
}
