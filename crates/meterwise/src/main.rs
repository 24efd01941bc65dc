//! meterwise - Home electricity tracker

mod cli;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use cli::CliError;
use meterwise_core::coach::{build_prompt, CoachClient, CoachSummary};
use meterwise_core::export::{
    export_readings_to_csv, export_readings_to_json, export_report_to_json,
};
use meterwise_core::ocr::{extract_meter_value, parse_bill_text, OcrClient, DEFAULT_MIN_DIGITS};
use meterwise_core::tariff::{preset, preset_codes};
use meterwise_core::{ReadingStore, UsageReport};
use meterwise_types::{ChatMessage, ReadingId, TariffMode, TariffSchedule};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "meterwise",
    version,
    about = "Home electricity tracker: month-end forecast, tiered bill estimate, budget coach",
    long_about = "Record cumulative meter readings and get a month-end usage forecast,\n\
                  a bill estimate under your tiered tariff, and a daily target that keeps\n\
                  you within your monthly goal.\n\
                  \n\
                  Examples:\n\
                    meterwise add 15234.5               # Record a reading taken now\n\
                    meterwise status                    # Forecast, bill and alerts\n\
                    meterwise tariff preset MA          # Use the Moroccan tier schedule\n\
                    meterwise tariff goal 250           # Monthly goal in tariff currency\n\
                    meterwise what-if 15                # Effect of cutting usage by 15%\n\
                    meterwise scan meter.jpg --add      # Read the counter from a photo\n\
                    meterwise coach \"why so high?\"      # Ask the AI coach\n\
                  \n\
                  Environment Variables:\n\
                    METERWISE_DATA_DIR                 # Override the data directory\n\
                    METERWISE_NO_COLOR                 # Disable ANSI colors\n\
                    GEMINI_API_KEY                     # Key for the coach\n\
                    OCR_SPACE_API_KEY                  # Key for scans (demo key otherwise)\n\
                    RUST_LOG                           # Log filter (default: warn)"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data directory (default: platform data dir / meterwise)
    #[arg(long, global = true, env = "METERWISE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, global = true, env = "METERWISE_NO_COLOR")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Month overview: usage, forecast, bill, budget and alerts (default)
    Status {
        /// Output the full report as JSON
        #[arg(long)]
        json: bool,
        /// Reference instant instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Record a cumulative meter reading (kWh)
    Add {
        value: f64,
        /// When the reading was taken (default: now)
        #[arg(long)]
        at: Option<String>,
        /// Do not ask for confirmation when the value goes backwards
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// List readings, oldest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete one reading
    Delete { id: u64 },
    /// Delete every reading
    Clear {
        /// Skip confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Daily target and allowance for the monthly goal
    Budget {
        /// Reference instant instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Simulate cutting usage for the rest of the month
    WhatIf {
        /// Reduction in percent (0-100)
        percent: f64,
        /// Reference instant instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Show or edit the tariff configuration
    Tariff {
        #[command(subcommand)]
        action: Option<TariffCommand>,
    },
    /// Export readings (CSV by default)
    Export {
        path: PathBuf,
        /// Write readings as JSON
        #[arg(long, conflicts_with = "report")]
        json: bool,
        /// Write the current usage report as JSON
        #[arg(long)]
        report: bool,
    },
    /// Ask the AI energy coach
    Coach {
        question: String,
        /// Start a new conversation first
        #[arg(long)]
        new: bool,
        /// Gemini API key
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Use this model instead of auto-detecting one
        #[arg(long)]
        model: Option<String>,
    },
    /// Read a meter photo or a bill with OCR
    Scan {
        image: PathBuf,
        /// Print the recognised text
        #[arg(long)]
        text: bool,
        /// Parse the image as a utility bill
        #[arg(long, conflicts_with = "add")]
        bill: bool,
        /// Record the recognised meter value as a reading
        #[arg(long)]
        add: bool,
        /// Minimum digits for a meter value
        #[arg(long, default_value_t = DEFAULT_MIN_DIGITS)]
        min_digits: usize,
        /// Do not ask for confirmation before recording
        #[arg(long, short = 'y')]
        yes: bool,
        /// OCR.space API key
        #[arg(long, env = "OCR_SPACE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

#[derive(Subcommand)]
enum TariffCommand {
    /// Show the tier table (default)
    Show,
    /// Load a country preset (MA, FR, US)
    Preset { code: String },
    /// Billing mode: progressive or whole-tier
    Mode { mode: TariffMode },
    /// Monthly goal in tariff currency (0 disables)
    Goal { amount: f64 },
    /// Load a tier schedule from a JSON file
    Set { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = cli
        .data_dir
        .or_else(ReadingStore::default_data_dir)
        .context("Could not determine the data directory (use --data-dir)")?;

    let no_color = cli.no_color;

    match cli.command.unwrap_or(Command::Status {
        json: false,
        at: None,
    }) {
        Command::Status { json, at } => {
            run_status(data_dir, json, at).await?;
        }
        Command::Add { value, at, yes } => {
            run_add(data_dir, value, at, yes).await?;
        }
        Command::List { json } => {
            run_list(data_dir, json, no_color).await?;
        }
        Command::Delete { id } => {
            run_delete(data_dir, id).await?;
        }
        Command::Clear { yes } => {
            run_clear(data_dir, yes).await?;
        }
        Command::Budget { at } => {
            run_budget(data_dir, at).await?;
        }
        Command::WhatIf { percent, at } => {
            run_what_if(data_dir, percent, at).await?;
        }
        Command::Tariff { action } => {
            run_tariff(data_dir, action.unwrap_or(TariffCommand::Show), no_color).await?;
        }
        Command::Export { path, json, report } => {
            run_export(data_dir, path, json, report).await?;
        }
        Command::Coach {
            question,
            new,
            api_key,
            model,
        } => {
            run_coach(data_dir, question, new, api_key, model).await?;
        }
        Command::Scan {
            image,
            text,
            bill,
            add,
            min_digits,
            yes,
            api_key,
        } => {
            run_scan(data_dir, image, text, bill, add, min_digits, yes, api_key).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Open the store and print load problems on stderr
async fn open_store(data_dir: PathBuf) -> Result<ReadingStore> {
    let (store, report) = ReadingStore::open(data_dir).await;

    if report.has_fatal_errors() {
        eprintln!("Fatal errors during data load:");
        for error in report.errors.iter() {
            eprintln!("  - {}: {}", error.source, error.message);
        }
        anyhow::bail!("Data directory {} is not usable", store.data_dir().display());
    }

    for error in report.problems() {
        eprintln!("Warning: {}: {}", error.source, error.message);
        if let Some(suggestion) = &error.suggestion {
            eprintln!("  hint: {}", suggestion);
        }
    }

    Ok(store)
}

fn report_now(store: &ReadingStore, at: Option<DateTime<Utc>>) -> UsageReport {
    match at {
        Some(at) => store.report_at(&at.with_timezone(&Local)),
        None => store.report_at(&Local::now()),
    }
}

/// Ask a yes/no question on stdin (default no)
fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn run_status(data_dir: PathBuf, json: bool, at: Option<String>) -> Result<()> {
    let at = at.as_deref().map(cli::parse_instant).transpose()?;
    let store = open_store(data_dir).await?;
    let report = report_now(&store, at);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        println!("{}", cli::format_status(&report));
    }
    Ok(())
}

async fn run_add(data_dir: PathBuf, value: f64, at: Option<String>, yes: bool) -> Result<()> {
    let at = match at.as_deref() {
        Some(s) => cli::parse_instant(s)?,
        None => Utc::now(),
    };
    let store = open_store(data_dir).await?;
    record_reading(&store, value, at, yes)?;
    Ok(())
}

fn record_reading(
    store: &ReadingStore,
    value: f64,
    at: DateTime<Utc>,
    yes: bool,
) -> Result<(), CliError> {
    if let Some(last) = store.last_reading() {
        if value < last.value && !yes {
            let question = format!(
                "{} kWh is below the last reading ({} kWh). Save anyway?",
                value, last.value
            );
            if !confirm(&question)? {
                return Err(CliError::Declined);
            }
        }
    }

    let reading = store.add_reading(value, at)?;
    println!("Saved reading #{}: {} kWh", reading.id, reading.value);
    Ok(())
}

async fn run_list(data_dir: PathBuf, json: bool, no_color: bool) -> Result<()> {
    let store = open_store(data_dir).await?;
    println!("{}", cli::format_readings(&store.readings(), json, no_color));
    Ok(())
}

async fn run_delete(data_dir: PathBuf, id: u64) -> Result<()> {
    let store = open_store(data_dir).await?;
    let removed = store
        .delete_reading(ReadingId(id))
        .map_err(CliError::from)?;
    println!("Deleted reading #{} ({} kWh)", removed.id, removed.value);
    Ok(())
}

async fn run_clear(data_dir: PathBuf, yes: bool) -> Result<()> {
    let store = open_store(data_dir).await?;

    if store.reading_count() == 0 {
        println!("No readings to delete.");
        return Ok(());
    }
    if !yes && !confirm(&format!("Delete all {} readings?", store.reading_count()))? {
        return Err(CliError::Declined.into());
    }

    let count = store.clear_readings().map_err(CliError::from)?;
    println!("Deleted {} readings.", count);
    Ok(())
}

async fn run_budget(data_dir: PathBuf, at: Option<String>) -> Result<()> {
    let at = at.as_deref().map(cli::parse_instant).transpose()?;
    let store = open_store(data_dir).await?;
    let report = report_now(&store, at);
    println!("{}", cli::format_budget(&report, &store.settings()));
    Ok(())
}

async fn run_what_if(data_dir: PathBuf, percent: f64, at: Option<String>) -> Result<()> {
    if !(0.0..=100.0).contains(&percent) {
        anyhow::bail!("Reduction must be between 0 and 100, got {}", percent);
    }

    let at = at.as_deref().map(cli::parse_instant).transpose()?;
    let store = open_store(data_dir).await?;
    let report = report_now(&store, at);
    let scenario = report.what_if(&store.settings(), percent);
    println!("{}", cli::format_what_if(&scenario));
    Ok(())
}

async fn run_tariff(data_dir: PathBuf, action: TariffCommand, no_color: bool) -> Result<()> {
    let store = open_store(data_dir).await?;

    let settings = match action {
        TariffCommand::Show => {
            let report = report_now(&store, None);
            println!(
                "{}",
                cli::format_tariff(&store.settings(), report.trend.usage_so_far, no_color)
            );
            return Ok(());
        }
        TariffCommand::Preset { code } => {
            let schedule = preset(&code).with_context(|| {
                format!(
                    "Unknown preset '{}' (available: {})",
                    code,
                    preset_codes().join(", ")
                )
            })?;
            store
                .update_settings(|s| {
                    s.country = code.trim().to_ascii_uppercase();
                    s.tariffs = schedule;
                })
                .map_err(CliError::from)?
        }
        TariffCommand::Mode { mode } => store
            .update_settings(|s| s.tariff_mode = mode)
            .map_err(CliError::from)?,
        TariffCommand::Goal { amount } => store
            .update_settings(|s| s.goal = amount)
            .map_err(CliError::from)?,
        TariffCommand::Set { file } => {
            let schedule = read_schedule(&file)?;
            store
                .update_settings(|s| s.tariffs = schedule)
                .map_err(CliError::from)?
        }
    };

    let report = report_now(&store, None);
    println!(
        "{}",
        cli::format_tariff(&settings, report.trend.usage_so_far, no_color)
    );
    Ok(())
}

fn read_schedule(path: &Path) -> Result<TariffSchedule> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a tariff schedule", path.display()))
}

async fn run_export(data_dir: PathBuf, path: PathBuf, json: bool, report: bool) -> Result<()> {
    let store = open_store(data_dir).await?;

    if report {
        export_report_to_json(&report_now(&store, None), &path)?;
    } else if json {
        export_readings_to_json(&store.readings(), &path)?;
    } else {
        export_readings_to_csv(&store.readings(), &path)?;
    }

    println!("Exported to {}", path.display());
    Ok(())
}

async fn run_coach(
    data_dir: PathBuf,
    question: String,
    new: bool,
    api_key: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let question = question.trim().to_string();
    if question.is_empty() {
        anyhow::bail!("Ask a question, e.g. meterwise coach \"why is my bill high?\"");
    }

    let mut client = CoachClient::new(api_key).map_err(CliError::from)?;
    if let Some(model) = model {
        client = client.with_model(model);
    }

    let store = open_store(data_dir).await?;
    if new {
        store.reset_chat().map_err(CliError::from)?;
    }

    let settings = store.settings();
    let report = report_now(&store, None);
    let summary = CoachSummary::from_report(&report, &settings);

    let user = ChatMessage::user(question);
    let mut history = store.chat_history();
    history.push(user.clone());
    let prompt = build_prompt(&summary, &history, &settings.language);

    let answer = client.ask(&prompt).await.map_err(CliError::from)?;
    store
        .append_chat([user, ChatMessage::model(answer.clone())])
        .map_err(CliError::from)?;

    println!("{}", answer);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_scan(
    data_dir: PathBuf,
    image: PathBuf,
    text: bool,
    bill: bool,
    add: bool,
    min_digits: usize,
    yes: bool,
    api_key: Option<String>,
) -> Result<()> {
    let client = OcrClient::new(api_key).map_err(CliError::from)?;
    if client.uses_demo_key() {
        tracing::info!("Using the OCR.space demo key; set OCR_SPACE_API_KEY for regular use");
    }

    let recognized = client
        .recognize_file(&image)
        .await
        .map_err(CliError::from)?;

    if text {
        println!("{}\n", recognized);
    }

    if bill {
        println!("{}", cli::format_bill_fields(&parse_bill_text(&recognized)));
        return Ok(());
    }

    let store = open_store(data_dir).await?;
    let last = store.last_reading().map(|r| r.value);
    let candidate = extract_meter_value(&recognized, min_digits, last)
        .ok_or(CliError::NoMeterValue { min_digits })?;

    println!("{}", cli::format_meter_candidate(&candidate, last));

    if add {
        record_reading(&store, candidate.value, Utc::now(), yes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_budget_and_what_if_accept_at() {
        let cli =
            Cli::try_parse_from(["meterwise", "budget", "--at", "2025-04-20T12:00:00Z"]).unwrap();
        match cli.command {
            Some(Command::Budget { at }) => assert_eq!(at.as_deref(), Some("2025-04-20T12:00:00Z")),
            _ => panic!("expected budget"),
        }

        let cli =
            Cli::try_parse_from(["meterwise", "what-if", "15", "--at", "2025-04-20"]).unwrap();
        match cli.command {
            Some(Command::WhatIf { percent, at }) => {
                assert_eq!(percent, 15.0);
                assert_eq!(at.as_deref(), Some("2025-04-20"));
            }
            _ => panic!("expected what-if"),
        }

        let cli = Cli::try_parse_from(["meterwise", "budget"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Budget { at: None })));
    }

    #[tokio::test]
    async fn test_report_uses_reference_instant() {
        let dir = tempdir().unwrap();
        let (store, _) = ReadingStore::open(dir.path().to_path_buf()).await;
        store
            .add_reading(1000.0, Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap())
            .unwrap();
        store
            .add_reading(1150.0, Utc.with_ymd_and_hms(2025, 4, 11, 8, 0, 0).unwrap())
            .unwrap();

        let at = cli::parse_instant("2025-04-20T12:00:00Z").unwrap();
        let report = report_now(&store, Some(at));

        assert_eq!(report.computed_at, at);
        assert_eq!(report.trend.usage_so_far, 150.0);
    }
}
