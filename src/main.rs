#![forbid(unsafe_code)]

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use activity_journal::{
    run_blocking, ClientCredentials, JournalConfig, JournalError, RunOptions, RunSummary,
};
use clap::Parser;
use log::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "activity-journal: merge recent Strava activities into a static HTML journal",
    long_about = None
)]
struct Cli {
    /// Config file (default: ./activity-journal.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the journal document path.
    #[arg(long)]
    document: Option<PathBuf>,

    /// Override how many recent activities to list.
    #[arg(long)]
    page_size: Option<u32>,

    /// Print the merged document to stdout instead of writing it.
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ACTIVITY_JOURNAL_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "activity_journal=debug,info"
        } else {
            "activity_journal=info,warn"
        })
    });

    let format = env::var("ACTIVITY_JOURNAL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn load_config(cli: &Cli) -> Result<JournalConfig, JournalError> {
    let mut config = JournalConfig::load(cli.config.as_deref())?;
    if let Some(document) = &cli.document {
        config.journal.document = document.clone();
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    config.validate()?;
    Ok(config)
}

fn execute(cli: &Cli) -> Result<RunSummary, JournalError> {
    let config = load_config(cli)?;
    let credentials = ClientCredentials::from_env()?;
    run_blocking(
        &config,
        credentials,
        RunOptions {
            dry_run: cli.dry_run,
        },
    )
}

fn report(cli: &Cli, summary: &RunSummary) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    if let Some(document) = &summary.merged_document {
        stdout.write_all(document.as_bytes())?;
    }
    if cli.json {
        let json = serde_json::to_string_pretty(summary).map_err(std::io::Error::other)?;
        writeln!(stdout, "{}", json)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match execute(&cli) {
        Ok(summary) => {
            info!(
                "Done: fetched={} relevant={} present={} inserted={} detail_failures={} render_failures={} written={} published={}",
                summary.fetched,
                summary.relevant,
                summary.already_present,
                summary.inserted.len(),
                summary.detail_failures,
                summary.render_failures,
                summary.written,
                summary.published
            );
            if let Err(e) = report(&cli, &summary) {
                error!("Failed to write output: {}", e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("[{}] {}", err.code(), err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
