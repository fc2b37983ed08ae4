//! # gedfix CLI
//!
//! ## Usage
//!
//! ```bash
//! gedfix [--config gedfix.toml] [-v] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gedfix fix <input>` | Run the full pipeline and write the cleaned file plus a report |
//! | `gedfix scan <input>` | Classify dates and validate; never writes the document |
//! | `gedfix profiles` | List the available rule profiles |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what the aggressive profile would change
//! gedfix fix family.ged --profile aggressive --dry-run --format text
//!
//! # Clean and write family.fixed.ged, report as JSON
//! gedfix fix family.ged --profile ultra --report report.json
//!
//! # Structural findings only
//! gedfix scan family.ged --format text
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gedfix::config::{self, Config, ReportFormat};
use gedfix::fix::{self, FixOptions};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Safe GEDCOM cleanup with date normalization, spelling
/// standardization, fact and person deduplication, validation.
#[derive(Parser)]
#[command(
    name = "gedfix",
    about = "gedfix: safe, idempotent GEDCOM cleanup and deduplication",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (debug level) on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a GEDCOM file.
    ///
    /// Writes the transformed document to `--out` (default
    /// `<input>.fixed.ged`) and the report to `--report` (default stdout).
    Fix {
        input: PathBuf,

        /// Where to write the transformed document.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Rule profile: standard, aggressive, ultra, comprehensive, or a
        /// `[profiles.*]` entry from the config.
        #[arg(long)]
        profile: Option<String>,

        /// Produce the report without writing the document.
        #[arg(long)]
        dry_run: bool,

        /// Where to write the report.
        #[arg(long)]
        report: Option<PathBuf>,

        #[arg(long, value_enum)]
        format: Option<ReportFormat>,

        /// Prefix for inserted annotation notes.
        #[arg(long)]
        note_prefix: Option<String>,

        #[arg(long)]
        auto_merge_threshold: Option<f64>,

        #[arg(long)]
        review_threshold: Option<f64>,

        /// Fail the run when a merge cannot be verified.
        #[arg(long)]
        strict: bool,
    },

    /// Classify dates and validate structure; the document is never written.
    Scan {
        input: PathBuf,

        #[arg(long)]
        report: Option<PathBuf>,

        #[arg(long, value_enum)]
        format: Option<ReportFormat>,
    },

    /// List rule profiles and their thresholds.
    Profiles,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "gedfix=debug,gedfix_core=debug"
    } else {
        "gedfix=info,gedfix_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Fix {
            input,
            out,
            profile,
            dry_run,
            report,
            format,
            note_prefix,
            auto_merge_threshold,
            review_threshold,
            strict,
        } => {
            let opts = FixOptions {
                input,
                out,
                profile,
                dry_run,
                report,
                format,
                note_prefix,
                auto_merge_threshold,
                review_threshold,
                strict,
            };
            fix::run_fix(&cfg, &opts)?;
        }
        Commands::Scan {
            input,
            report,
            format,
        } => {
            fix::run_scan(&cfg, &input, report.as_deref(), format)?;
        }
        Commands::Profiles => {
            fix::list_profiles(&cfg)?;
        }
    }

    Ok(())
}
