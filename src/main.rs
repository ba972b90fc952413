//! # tutor CLI
//!
//! Command-line interface for Subtitle Tutor.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tutor segment <file>` | Split a subtitle file into scenario blocks |
//! | `tutor analyze <scenario.json>` | Generate learning analyses per block |
//! | `tutor scenario normalize <file>` | Print the normalized scenario |
//! | `tutor scenario validate <file>` | Check a scenario file (`--strict` adds line ranges) |
//! | `tutor notes export <scenario.json>` | Render the study-notes markdown |
//! | `tutor notes import <notes.md>` | Recover notes and analyses from markdown |
//! | `tutor serve` | Start the HTTP API |
//!
//! ## Configuration
//!
//! Reads `./config/tutor.toml` by default (built-in defaults when that file
//! does not exist). Model credentials come from `OPENAI_API_KEY`,
//! `OPENAI_BASE_URL`, and `OPENAI_EXTRA_HEADERS`.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use subtitle_tutor::{
    analyze_cmd, config, logging, notes_cmd, scenario_cmd, segment_cmd, server, services,
};
use subtitle_tutor_core::notes::ExportTemplate;

const DEFAULT_CONFIG: &str = "./config/tutor.toml";

/// Subtitle Tutor: scenario-based English study notes from subtitles.
#[derive(Parser)]
#[command(name = "tutor", version, about)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr (filter with TUTOR_LOG).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a subtitle file into scenario blocks.
    ///
    /// Accepts SRT-style or plain `Speaker: line` text. Prints the scenario
    /// JSON unless `--output` is given.
    Segment {
        /// Subtitle file (.srt or plain text).
        file: PathBuf,
        /// Title for the subtitle; derived from the first line if omitted.
        #[arg(long)]
        title: Option<String>,
        /// Write the scenario JSON here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Single-line JSON instead of pretty-printed.
        #[arg(long)]
        compact: bool,
    },
    /// Analyse scenario blocks (vocabulary, grammar, listening, culture,
    /// practice).
    ///
    /// Results for identical inputs are cached for the lifetime of the
    /// process.
    Analyze {
        /// Scenario JSON produced by `tutor segment`.
        file: PathBuf,
        /// Only analyse this block index (repeatable).
        #[arg(long = "block")]
        blocks: Vec<u32>,
        /// Write the results JSON here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Offline scenario file tools.
    Scenario {
        #[command(subcommand)]
        action: ScenarioAction,
    },
    /// Study-notes markdown export and import.
    Notes {
        #[command(subcommand)]
        action: NotesAction,
    },
    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ScenarioAction {
    /// Validate, normalize, and re-print a scenario file.
    Normalize {
        file: PathBuf,
        #[arg(long)]
        compact: bool,
    },
    /// Validate a scenario file and print a summary.
    Validate {
        file: PathBuf,
        /// Also require dialogue orders to fall within each block's line range.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum NotesAction {
    /// Render a scenario, its analyses, and notes as one markdown document.
    Export {
        /// Scenario JSON.
        scenario: PathBuf,
        /// Analyses JSON: `tutor analyze` output or a `{ "1": "markdown" }` map.
        #[arg(long)]
        analyses: Option<PathBuf>,
        /// Notes JSON array.
        #[arg(long)]
        notes: Option<PathBuf>,
        /// `standard` or `concise`; defaults to `[export].template`.
        #[arg(long)]
        template: Option<ExportTemplate>,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Parse an exported markdown document back into JSON.
    Import {
        file: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    let explicit = cli.config.as_path() != Path::new(DEFAULT_CONFIG);
    let cfg = config::load_or_default(&cli.config, explicit)?.with_env_overrides();

    match cli.command {
        Commands::Segment {
            file,
            title,
            output,
            compact,
        } => {
            let services = services::Services::from_config(cfg)?;
            segment_cmd::run_segment(
                &services,
                &file,
                title.as_deref(),
                output.as_deref(),
                compact,
            )
            .await?;
        }
        Commands::Analyze {
            file,
            blocks,
            output,
        } => {
            let services = services::Services::from_config(cfg)?;
            analyze_cmd::run_analyze(&services, &file, &blocks, output.as_deref()).await?;
        }
        Commands::Scenario { action } => match action {
            ScenarioAction::Normalize { file, compact } => {
                scenario_cmd::run_normalize(&file, compact)?;
            }
            ScenarioAction::Validate { file, strict } => {
                scenario_cmd::run_validate(&file, strict)?;
            }
        },
        Commands::Notes { action } => match action {
            NotesAction::Export {
                scenario,
                analyses,
                notes,
                template,
                output,
            } => {
                notes_cmd::run_export(
                    &cfg,
                    &scenario,
                    analyses.as_deref(),
                    notes.as_deref(),
                    template,
                    output.as_deref(),
                )?;
            }
            NotesAction::Import { file, output } => {
                notes_cmd::run_import(&file, output.as_deref())?;
            }
        },
        Commands::Serve => {
            let services = services::Services::from_config(cfg)?;
            server::run_server(services).await?;
        }
    }

    Ok(())
}
