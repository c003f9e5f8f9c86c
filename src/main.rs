use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;

use gdelt_filter::collect::source::DEFAULT_BASE_URL;
use gdelt_filter::collect::{
    collect_events, CollectOptions, EventSource, GdeltHttpSource, HttpOptions, LocalExportSource,
};
use gdelt_filter::data::cameo::CameoCodes;
use gdelt_filter::data::schema::default_columns;
use gdelt_filter::filter::{default_rules, load_rules, EventFilter, RuleSet};

/// Collect GDELT 1.0 daily events, filter them and write them to Parquet
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// First day to collect (YYYY-MM-DD)
    start_date: NaiveDate,

    /// Last day to collect, inclusive (YYYY-MM-DD)
    end_date: NaiveDate,

    /// YAML or JSON rule file; the built-in rules are used when omitted
    #[arg(long, value_name = "FILE")]
    filters: Option<PathBuf>,

    /// Output Parquet file
    #[arg(long, default_value = "gdelt_events.parquet")]
    output: PathBuf,

    /// Days with data to hold before writing
    #[arg(long, default_value_t = 7)]
    batch_size: usize,

    /// Pause between days, in seconds
    #[arg(long, default_value_t = 0.5)]
    sleep_secs: f64,

    /// Comma-separated columns to keep (default: the standard 25)
    #[arg(long, value_delimiter = ',')]
    columns: Option<Vec<String>>,

    /// Read exports from this directory instead of downloading
    #[arg(long, value_name = "DIR")]
    source_dir: Option<PathBuf>,

    /// CAMEO code table; adds an EventDescription column rules can use
    #[arg(long, value_name = "FILE")]
    cameo: Option<PathBuf>,

    /// Base URL of the daily export archive
    #[arg(long, env = "GDELT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// HTTP request timeout, in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Download attempts per day
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,
}

fn load_rule_set(path: Option<&PathBuf>) -> Result<RuleSet> {
    match path {
        Some(path) => {
            let rules = load_rules(path)
                .with_context(|| format!("loading filter rules from {}", path.display()))?;
            log::info!("Loaded {} filter rules from {}", rules.len(), path.display());
            Ok(rules)
        }
        None => {
            log::info!("Using built-in filter rules");
            Ok(default_rules())
        }
    }
}

fn main() -> Result<()> {
    gdelt_filter::init_logging();
    let cli = Cli::parse();

    let rules = load_rule_set(cli.filters.as_ref())?;
    let filter = EventFilter::new(&rules);

    let sleep = Duration::try_from_secs_f64(cli.sleep_secs)
        .with_context(|| format!("invalid --sleep-secs {}", cli.sleep_secs))?;
    let cameo = cli.cameo.as_deref().map(CameoCodes::load).transpose()?;
    let options = CollectOptions {
        output: cli.output,
        batch_size: cli.batch_size,
        sleep,
        columns: cli.columns.unwrap_or_else(default_columns),
        cameo,
        ..CollectOptions::new(cli.start_date, cli.end_date)
    };

    let source: Box<dyn EventSource> = match cli.source_dir {
        Some(dir) => {
            log::info!("Reading exports from {}", dir.display());
            Box::new(LocalExportSource::new(dir))
        }
        None => Box::new(GdeltHttpSource::new(HttpOptions {
            base_url: cli.base_url,
            timeout: Duration::from_secs(cli.timeout_secs),
            max_attempts: cli.max_attempts,
            ..HttpOptions::default()
        })?),
    };

    let summary = collect_events(&source, &filter, &options)?;
    log::info!(
        "{} days processed, {} with data, {} failed, {} events written",
        summary.days_processed,
        summary.days_with_data,
        summary.days_failed,
        summary.events_written
    );
    Ok(())
}
