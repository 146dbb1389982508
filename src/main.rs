use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use covspan::cli::{self, Style};
use covspan::detect::Format;
use covspan::load::{LoadedReport, Session};

/// covspan: read block/range and line-hit coverage XML and annotate sources.
#[derive(Parser)]
#[command(name = "covspan", version, about)]
struct Cli {
    /// Override format detection (modules, cobertura).
    #[arg(long, global = true)]
    format: Option<String>,

    /// Log parser and annotator decisions to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a summary of a report.
    Summary {
        /// Path to the coverage report.
        report: PathBuf,
    },

    /// List per-file coverage for a report.
    Files {
        /// Path to the coverage report.
        report: PathBuf,

        /// Only list files whose path matches this regular expression.
        #[arg(long)]
        filter: Option<String>,

        /// Sort by coverage rate ascending (show worst files first).
        #[arg(long)]
        sort_by_coverage: bool,
    },

    /// Print a source file annotated with its coverage.
    Show {
        /// Path to the coverage report.
        report: PathBuf,

        /// The source file path (as stored in the coverage data).
        source_file: String,

        /// Read the source text from here instead of the stored path.
        #[arg(long)]
        source: Option<PathBuf>,

        /// Output style.
        #[arg(long, value_enum, default_value = "ansi")]
        style: Style,

        /// Omit the line number gutter.
        #[arg(long)]
        no_line_numbers: bool,
    },

    /// Show line-level hit counts for a source file.
    Lines {
        /// Path to the coverage report.
        report: PathBuf,

        /// The source file path (as stored in the coverage data).
        source_file: String,

        /// Show only uncovered lines, as compact ranges.
        #[arg(long)]
        uncovered: bool,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let format = args
        .format
        .as_deref()
        .map(str::parse::<Format>)
        .transpose()?;
    let mut session = Session::new();

    let output = match &args.command {
        Commands::Summary { report } => cli::cmd_summary(load(&mut session, report, format)?)?,
        Commands::Files {
            report,
            filter,
            sort_by_coverage,
        } => cli::cmd_files(
            load(&mut session, report, format)?,
            filter.as_deref(),
            *sort_by_coverage,
        )?,
        Commands::Show {
            report,
            source_file,
            source,
            style,
            no_line_numbers,
        } => cli::cmd_show(
            load(&mut session, report, format)?,
            source_file,
            source.as_deref(),
            style,
            !no_line_numbers,
        )?,
        Commands::Lines {
            report,
            source_file,
            uncovered,
        } => cli::cmd_lines(load(&mut session, report, format)?, source_file, *uncovered)?,
    };

    print!("{output}");
    Ok(())
}

fn load<'s>(session: &'s mut Session, path: &Path, format: Option<Format>) -> Result<&'s LoadedReport> {
    session
        .load(path, format)
        .with_context(|| format!("Failed to load coverage report {}", path.display()))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
