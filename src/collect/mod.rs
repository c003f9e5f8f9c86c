/// Collection loop: one source fetch per day, filter, checkpoint to Parquet.
///
/// ```text
///   start ──► end (one date at a time)
///        │
///        ▼
///   ┌──────────────┐
///   │ EventSource   │  HTTP download or local export directory
///   └──────────────┘
///        │  select_columns → EventFilter::apply
///        ▼
///   ┌──────────────┐
///   │ pending queue │  flushed every `batch_size` days with data
///   └──────────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ ParquetStore  │  optimise dtypes → temp file → rename
///   └──────────────┘
/// ```

pub mod source;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use arrow::record_batch::RecordBatch;
use chrono::{Days, NaiveDate};

use crate::data::cameo::{CameoCodes, EVENT_DESCRIPTION};
use crate::data::model::select_columns;
use crate::data::schema::default_columns;
use crate::data::store::{concat_widened, summarize, ParquetStore, StoreSummary};
use crate::filter::EventFilter;

pub use source::{GdeltHttpSource, HttpOptions, LocalExportSource};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Something that can produce one day of raw events.
pub trait EventSource {
    /// `Ok(None)` when no export exists for `date`.
    fn fetch_day(&self, date: NaiveDate) -> Result<Option<RecordBatch>>;
}

impl<S: EventSource + ?Sized> EventSource for &S {
    fn fetch_day(&self, date: NaiveDate) -> Result<Option<RecordBatch>> {
        (**self).fetch_day(date)
    }
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn fetch_day(&self, date: NaiveDate) -> Result<Option<RecordBatch>> {
        (**self).fetch_day(date)
    }
}

// ---------------------------------------------------------------------------
// Options and summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub output: PathBuf,
    /// Days with data to hold in memory before writing.
    pub batch_size: usize,
    /// Pause between days.
    pub sleep: Duration,
    /// Columns kept from each export. Empty keeps all of them.
    pub columns: Vec<String>,
    /// When set, each day gains an `EventDescription` column before filtering.
    pub cameo: Option<CameoCodes>,
}

impl CollectOptions {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            output: PathBuf::from("gdelt_events.parquet"),
            batch_size: 7,
            sleep: Duration::from_millis(500),
            columns: default_columns(),
            cameo: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectSummary {
    pub days_processed: usize,
    pub days_with_data: usize,
    pub days_failed: usize,
    pub events_written: usize,
    /// `None` when nothing was written.
    pub output: Option<StoreSummary>,
}

/// Every date from `start` to `end`, both included.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
    if end < start {
        bail!("end date {end} is before start date {start}");
    }
    let mut dates = Vec::new();
    let mut day = start;
    while day <= end {
        dates.push(day);
        day = day
            .checked_add_days(Days::new(1))
            .context("date range overflows the calendar")?;
    }
    Ok(dates)
}

// ---------------------------------------------------------------------------
// Collection loop
// ---------------------------------------------------------------------------

/// Fetch, filter and store every day in `[options.start, options.end]`.
///
/// A day that fails to fetch, parse or filter is logged and counted; the run
/// carries on. A failed write to the output aborts the run.
pub fn collect_events<S: EventSource>(
    source: &S,
    filter: &EventFilter,
    options: &CollectOptions,
) -> Result<CollectSummary> {
    let dates = date_range(options.start, options.end)?;
    let batch_size = options.batch_size.max(1);
    let mut columns = options.columns.clone();
    if options.cameo.is_some()
        && !columns.is_empty()
        && !columns.iter().any(|c| c.eq_ignore_ascii_case(EVENT_DESCRIPTION))
    {
        columns.push(EVENT_DESCRIPTION.to_string());
    }

    log::info!(
        "Collecting GDELT events from {} to {} ({} days) into {}",
        options.start,
        options.end,
        dates.len(),
        options.output.display()
    );
    log::info!("Active filters: {}", filter.active_count());

    let mut store = ParquetStore::new(&options.output);
    let mut pending: Vec<RecordBatch> = Vec::new();
    let mut summary = CollectSummary::default();

    for (i, date) in dates.iter().enumerate() {
        let progress = format!("[{}/{}] {date}", i + 1, dates.len());
        summary.days_processed += 1;

        match process_day(source, filter, &columns, options.cameo.as_ref(), *date) {
            Ok(Some(batch)) => {
                log::info!("{progress}: {} events after filtering", batch.num_rows());
                summary.days_with_data += 1;
                pending.push(batch);
            }
            Ok(None) => log::info!("{progress}: nothing kept"),
            Err(err) => {
                log::error!("{progress}: {err:#}");
                summary.days_failed += 1;
            }
        }

        let last = i + 1 == dates.len();
        if !pending.is_empty() && (pending.len() >= batch_size || last) {
            summary.events_written += flush(&mut store, &mut pending)?;
        }

        if !last && !options.sleep.is_zero() {
            thread::sleep(options.sleep);
        }
    }

    if store.is_created() {
        let output = summarize(store.path())?;
        log::info!(
            "Collection complete: {} events, {:.2} MB",
            output.rows,
            output.megabytes()
        );
        if let Some((lo, hi)) = output.sqldate_range {
            log::info!("Date range: {lo} to {hi}");
        }
        summary.output = Some(output);
    } else {
        log::warn!("No events collected");
    }
    Ok(summary)
}

/// `Ok(None)` when the day has no export or nothing survives the filter.
fn process_day<S: EventSource>(
    source: &S,
    filter: &EventFilter,
    columns: &[String],
    cameo: Option<&CameoCodes>,
    date: NaiveDate,
) -> Result<Option<RecordBatch>> {
    let Some(raw) = source.fetch_day(date)? else {
        log::warn!("No data for {date}");
        return Ok(None);
    };
    let raw = match cameo {
        Some(codes) => codes.add_descriptions(&raw)?,
        None => raw,
    };
    let projected = select_columns(&raw, columns)?;
    let outcome = filter.apply(projected);
    if outcome.batch.num_rows() == 0 {
        log::info!("No events left after filtering for {date}");
        return Ok(None);
    }
    Ok(Some(outcome.batch))
}

fn flush(store: &mut ParquetStore, pending: &mut Vec<RecordBatch>) -> Result<usize> {
    log::info!("Writing batch of {} days", pending.len());
    let combined = concat_widened(pending).context("combining queued days")?;
    store
        .append(&combined)
        .with_context(|| format!("writing {}", store.path().display()))?;
    pending.clear();
    Ok(combined.num_rows())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn date_range_is_inclusive() {
        let dates = date_range(day("2024-02-27"), day("2024-03-01")).unwrap();
        assert_eq!(
            dates,
            vec![
                day("2024-02-27"),
                day("2024-02-28"),
                day("2024-02-29"),
                day("2024-03-01")
            ]
        );
        assert_eq!(date_range(day("2024-01-01"), day("2024-01-01")).unwrap().len(), 1);
    }

    #[test]
    fn reversed_range_is_an_error() {
        assert!(date_range(day("2024-01-02"), day("2024-01-01")).is_err());
    }
}
