use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use gdelt_filter::data::cameo::CameoCodes;
use gdelt_filter::data::loader::load_file;
use gdelt_filter::data::store::{summarize, write_parquet};
use gdelt_filter::filter::apply::RuleStatus;
use gdelt_filter::filter::config::save_template;
use gdelt_filter::filter::{default_rules, load_rules, parse_rule, EventFilter, RuleSet};

/// Write, check and try out GDELT filter rule files
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write an annotated rule file (.json, .yaml or .yml)
    Template {
        path: PathBuf,
    },
    /// Parse every rule and report the ones that do not parse
    Check {
        /// Rule file; the built-in rules when omitted
        #[arg(long, value_name = "FILE")]
        filters: Option<PathBuf>,
    },
    /// Filter a data file and print what each rule did
    Apply {
        /// .parquet, .csv, .json, .export.CSV or .zip
        input: PathBuf,
        #[arg(long, value_name = "FILE")]
        filters: Option<PathBuf>,
        /// Write surviving rows here as Parquet
        #[arg(long)]
        output: Option<PathBuf>,
        /// Rows of the result to print
        #[arg(long, default_value_t = 10)]
        preview: usize,
        /// CAMEO code table; adds an EventDescription column before filtering
        #[arg(long, value_name = "FILE")]
        cameo: Option<PathBuf>,
    },
    /// Print row count, size and SQLDATE range of a Parquet output
    Inspect {
        path: PathBuf,
    },
}

fn rule_set(filters: Option<&Path>) -> Result<RuleSet> {
    match filters {
        Some(path) => {
            load_rules(path).with_context(|| format!("loading filter rules from {}", path.display()))
        }
        None => Ok(default_rules()),
    }
}

fn check(rules: &RuleSet) -> bool {
    let mut ok = true;
    for rule in rules {
        let state = if rule.enabled { "" } else { " (disabled)" };
        match parse_rule(&rule.rule) {
            Ok(parsed) => println!("  ok    {}{state}: {parsed}", rule.name),
            Err(err) => {
                ok = false;
                println!("  error {}{state}: {err}", rule.name);
            }
        }
    }
    ok
}

fn apply(
    input: &Path,
    rules: &RuleSet,
    cameo: Option<&CameoCodes>,
    output: Option<&Path>,
    preview: usize,
) -> Result<bool> {
    let mut batch = load_file(input)?;
    if let Some(codes) = cameo {
        batch = codes.add_descriptions(&batch)?;
    }
    let outcome = EventFilter::new(rules).apply(batch);

    for rule in &outcome.report.outcomes {
        let marker = match rule.status {
            RuleStatus::Applied { .. } => "applied",
            RuleStatus::Skipped(_) => "skipped",
            RuleStatus::Failed(_) => "failed ",
        };
        println!("  {marker} {rule}");
    }
    println!("{}", outcome.report.summary_line());

    let shown = outcome.batch.slice(0, preview.min(outcome.batch.num_rows()));
    if shown.num_rows() > 0 {
        println!("{}", pretty_format_batches(&[shown])?);
    }

    if let Some(path) = output {
        write_parquet(path, &outcome.batch)?;
        println!("Wrote {} rows to {}", outcome.batch.num_rows(), path.display());
    }
    Ok(outcome.report.failures().count() == 0)
}

fn sqldate(value: i64) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&value.to_string(), "%Y%m%d").ok()
}

fn inspect(path: &Path) -> Result<()> {
    let summary = summarize(path)?;
    println!("Total events: {}", summary.rows);
    println!("File size: {:.2} MB", summary.megabytes());
    match summary.sqldate_range {
        Some((lo, hi)) => {
            println!("Earliest date: {lo}");
            println!("Latest date: {hi}");
            if let (Some(lo), Some(hi)) = (sqldate(lo), sqldate(hi)) {
                println!("Total date span: {} days", (hi - lo).num_days());
            }
        }
        None => println!("No SQLDATE values"),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Template { path } => {
            save_template(&path)?;
            Ok(true)
        }
        Command::Check { filters } => {
            let rules = rule_set(filters.as_deref())?;
            println!("{} rules, {} enabled", rules.len(), rules.enabled_count());
            Ok(check(&rules))
        }
        Command::Apply {
            input,
            filters,
            output,
            preview,
            cameo,
        } => {
            let rules = rule_set(filters.as_deref())?;
            let cameo = cameo.as_deref().map(CameoCodes::load).transpose()?;
            apply(&input, &rules, cameo.as_ref(), output.as_deref(), preview)
        }
        Command::Inspect { path } => {
            inspect(&path)?;
            Ok(true)
        }
    }
}

fn main() -> Result<ExitCode> {
    gdelt_filter::init_logging();
    let ok = run(Cli::parse())?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
