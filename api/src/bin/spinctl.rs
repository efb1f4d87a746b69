use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use lexicon::{flatten_records, PlayEvent, PlayRecord, ProviderResponse};
use spin_report_api::comparison::split_by_ranges;
use spin_report_api::period::parse_instant;
use spin_report_api::{
    init_tracing, PeriodReport, PeriodSelector, PlayProvider, RangeResponse, ReportConfig,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "spinctl")]
#[command(about = "radio spin and royalty reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current and previous date ranges for a period
    Range {
        /// today, yesterday, week, last-week, month, last-month, year, last-year or all
        #[arg(value_name = "PERIOD")]
        period: String,

        /// Reference instant (RFC 3339), defaults to now
        #[arg(long)]
        now: Option<String>,
    },

    /// Build a report from a provider dump on disk
    Report {
        #[arg(value_name = "PERIOD")]
        period: String,

        /// JSON file: a provider envelope or a bare array of plays
        #[arg(short, long)]
        input: PathBuf,

        /// Only artists whose name contains this text (case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        #[arg(long)]
        now: Option<String>,
    },

    /// Fetch plays from the provider and build a report
    Fetch {
        #[arg(value_name = "PERIOD")]
        period: String,

        #[arg(short, long)]
        filter: Option<String>,

        #[arg(long)]
        now: Option<String>,
    },

    /// Run the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Range { period, now } => handle_range(&load_config()?, &period, now.as_deref()),
        Commands::Report {
            period,
            input,
            filter,
            now,
        } => {
            let config = load_config()?;
            handle_report(&config, &period, &input, filter.as_deref(), now.as_deref()).await
        }
        Commands::Fetch { period, filter, now } => {
            let config = load_config()?;
            handle_fetch(&config, &period, filter.as_deref(), now.as_deref()).await
        }
        Commands::Serve => spin_report_api::run().await,
    }
}

/// `serve` sets up its own tracing, so only the one-shot commands come through here.
fn load_config() -> Result<ReportConfig> {
    init_tracing("spinctl=info,spin_report_api=info");
    ReportConfig::from_env().context("Failed to load configuration")
}

fn parse_period(period: &str, now: Option<&str>) -> Result<(PeriodSelector, DateTime<Utc>)> {
    let selector: PeriodSelector = period.parse()?;
    let now = match now {
        Some(raw) => parse_instant(raw)?,
        None => Utc::now(),
    };
    Ok((selector, now))
}

fn handle_range(config: &ReportConfig, period: &str, now: Option<&str>) -> Result<()> {
    let (selector, now) = parse_period(period, now)?;
    let (current, previous) = config.resolver().resolve(selector, now);

    let response = RangeResponse {
        period: selector,
        current,
        previous,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn handle_report(
    config: &ReportConfig,
    period: &str,
    input: &Path,
    filter: Option<&str>,
    now: Option<&str>,
) -> Result<()> {
    let (selector, now) = parse_period(period, now)?;
    let (current_range, previous_range) = config.resolver().resolve(selector, now);

    let events = load_events(input).await?;
    tracing::info!("loaded {} play events from {}", events.len(), input.display());

    let (current_events, previous_events) =
        split_by_ranges(events, &current_range, previous_range.as_ref());
    tracing::info!(
        "{} events in {}, {} in the previous range",
        current_events.len(),
        current_range,
        previous_events.len()
    );

    let report = PeriodReport::build(
        selector,
        current_range,
        previous_range,
        &current_events,
        &previous_events,
        filter,
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn handle_fetch(
    config: &ReportConfig,
    period: &str,
    filter: Option<&str>,
    now: Option<&str>,
) -> Result<()> {
    let (selector, now) = parse_period(period, now)?;
    let (current_range, previous_range) = config.resolver().resolve(selector, now);
    let provider = PlayProvider::new(&config.provider_url);

    let fetch_previous = async {
        match &previous_range {
            Some(range) => provider.fetch_plays(range).await,
            None => Ok(Vec::new()),
        }
    };
    let (current_events, previous_events) =
        tokio::try_join!(provider.fetch_plays(&current_range), fetch_previous)
            .context("Failed to fetch plays")?;

    let report = PeriodReport::build(
        selector,
        current_range,
        previous_range,
        &current_events,
        &previous_events,
        filter,
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn load_events(path: &Path) -> Result<Vec<PlayEvent>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_events(&raw).with_context(|| format!("Failed to load plays from {}", path.display()))
}

/// Accepts a provider envelope (`{"data": [...]}`) or a bare array of records.
fn parse_events(raw: &str) -> Result<Vec<PlayEvent>> {
    let value: serde_json::Value = serde_json::from_str(raw).context("not JSON")?;

    let records: Vec<PlayRecord> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        let envelope: ProviderResponse = serde_json::from_value(value)?;
        envelope
            .into_result()
            .map_err(|e| anyhow!("provider dump contains an error: {}", e))?
    };
    Ok(flatten_records(records))
}
