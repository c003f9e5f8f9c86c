use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, Days, NaiveDate};
use clap::Parser;

use gdelt_filter::data::schema::{ColumnKind, DEFAULT_COLUMNS, EVENT_COLUMNS};
use gdelt_filter::data::store::write_parquet;

/// Write a deterministic, GDELT-shaped Parquet file for trying rules offline
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = "sample_events.parquet")]
    output: PathBuf,

    #[arg(long, default_value_t = 1000)]
    rows: usize,

    /// Events are spread evenly over this many days
    #[arg(long, default_value_t = 7)]
    days: u64,

    #[arg(long, default_value = "2024-01-01")]
    start_date: NaiveDate,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Integer in `lo..=hi`.
    fn range(&mut self, lo: i64, hi: i64) -> i64 {
        lo + (self.next_u64() % (hi - lo + 1) as u64) as i64
    }

    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

const ACTORS: &[&str] = &[
    "POLICE",
    "PROTESTER",
    "GOVERNMENT",
    "MILITARY",
    "UNITED NATIONS",
    "PRESIDENT",
    "STUDENT",
    "REBEL",
];
const COUNTRIES: &[&str] = &["US", "UK", "FR", "DE", "CN", "RS", "NI", "KE", "BR", "IN"];
const PLACES: &[(&str, &str, f64, f64)] = &[
    ("US", "Washington, District of Columbia, United States", 38.9, -77.0),
    ("UK", "London, London, City of, United Kingdom", 51.5, -0.1),
    ("FR", "Paris, Ile-de-France, France", 48.9, 2.35),
    ("DE", "Berlin, Berlin, Germany", 52.5, 13.4),
    ("CN", "Beijing, Beijing, China", 39.9, 116.4),
    ("RS", "Moscow, Moskva, Russia", 55.75, 37.6),
    ("NI", "Lagos, Lagos, Nigeria", 6.45, 3.4),
    ("KE", "Nairobi, Nairobi Area, Kenya", -1.3, 36.8),
];

/// One synthetic event; only the fields the default columns need.
struct Event {
    id: i64,
    date: NaiveDate,
    actor1: Option<&'static str>,
    actor2: Option<&'static str>,
    actor1_country: Option<&'static str>,
    actor2_country: Option<&'static str>,
    root_code: i64,
    code: i64,
    goldstein: f64,
    mentions: i64,
    sources: i64,
    articles: i64,
    tone: f64,
    place: Option<(&'static str, &'static str, f64, f64)>,
}

fn generate_event(id: i64, date: NaiveDate, rng: &mut SimpleRng) -> Event {
    let root_code = rng.range(1, 20);
    let sources = if rng.chance(0.4) { 1 } else { rng.range(2, 8) };
    let mentions = sources + rng.range(0, 25);
    let place =
        (!rng.chance(0.15)).then(|| PLACES[rng.range(0, PLACES.len() as i64 - 1) as usize]);
    Event {
        id,
        date,
        actor1: (!rng.chance(0.1)).then(|| rng.pick(ACTORS)),
        actor2: (!rng.chance(0.4)).then(|| rng.pick(ACTORS)),
        actor1_country: (!rng.chance(0.3)).then(|| rng.pick(COUNTRIES)),
        actor2_country: (!rng.chance(0.5)).then(|| rng.pick(COUNTRIES)),
        root_code,
        code: root_code * 10 + rng.range(0, 4),
        goldstein: (rng.uniform(-10.0, 10.0) * 10.0).round() / 10.0,
        mentions,
        sources,
        articles: mentions + rng.range(0, 5),
        tone: rng.uniform(-15.0, 10.0),
        place,
    }
}

fn int_cell(name: &str, e: &Event) -> Option<i64> {
    let sqldate = i64::from(e.date.year()) * 10000
        + i64::from(e.date.month()) * 100
        + i64::from(e.date.day());
    match name {
        "GLOBALEVENTID" => Some(e.id),
        "SQLDATE" => Some(sqldate),
        "DATEADDED" => Some(sqldate),
        "MonthYear" => Some(sqldate / 100),
        "Year" => Some(i64::from(e.date.year())),
        "EventCode" => Some(e.code),
        "EventBaseCode" => Some(e.code),
        "EventRootCode" => Some(e.root_code),
        "NumMentions" => Some(e.mentions),
        "NumSources" => Some(e.sources),
        "NumArticles" => Some(e.articles),
        _ => None,
    }
}

fn float_cell(name: &str, e: &Event) -> Option<f64> {
    match name {
        "FractionDate" => Some(f64::from(e.date.year()) + f64::from(e.date.ordinal0()) / 365.0),
        "GoldsteinScale" => Some(e.goldstein),
        "AvgTone" => Some(e.tone),
        "ActionGeo_Lat" => e.place.map(|p| p.2),
        "ActionGeo_Long" => e.place.map(|p| p.3),
        _ => None,
    }
}

fn text_cell(name: &str, e: &Event) -> Option<String> {
    match name {
        "Actor1Name" => e.actor1.map(str::to_string),
        "Actor2Name" => e.actor2.map(str::to_string),
        "Actor1CountryCode" => e.actor1_country.map(str::to_string),
        "Actor2CountryCode" => e.actor2_country.map(str::to_string),
        "Actor1Type1Code" => e.actor1.map(|a| a.chars().take(3).collect()),
        "ActionGeo_CountryCode" => e.place.map(|p| p.0.to_string()),
        "ActionGeo_ADM1Code" => e.place.map(|p| format!("{}00", p.0)),
        "ActionGeo_FullName" => e.place.map(|p| p.1.to_string()),
        "SOURCEURL" => Some(format!(
            "https://news.example.com/{}/{}",
            e.date.format("%Y/%m/%d"),
            e.id
        )),
        _ => None,
    }
}

fn build_batch(events: &[Event]) -> Result<RecordBatch> {
    let mut fields = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();

    for name in DEFAULT_COLUMNS {
        let kind = EVENT_COLUMNS
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, kind)| *kind)
            .with_context(|| format!("{name} is not an export column"))?;
        let array: ArrayRef = match kind {
            ColumnKind::Int => {
                let mut b = Int64Builder::with_capacity(events.len());
                events.iter().for_each(|e| b.append_option(int_cell(name, e)));
                Arc::new(b.finish())
            }
            ColumnKind::Float => {
                let mut b = Float64Builder::with_capacity(events.len());
                events.iter().for_each(|e| b.append_option(float_cell(name, e)));
                Arc::new(b.finish())
            }
            ColumnKind::Text => {
                let mut b = StringBuilder::new();
                events.iter().for_each(|e| b.append_option(text_cell(name, e)));
                Arc::new(b.finish())
            }
        };
        fields.push(Field::new(*name, kind.data_type(), true));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context("assembling sample batch")
}

fn main() -> Result<()> {
    gdelt_filter::init_logging();
    let cli = Cli::parse();
    let mut rng = SimpleRng::new(cli.seed);
    let days = cli.days.max(1);

    let mut events = Vec::with_capacity(cli.rows);
    for i in 0..cli.rows {
        let offset = i as u64 * days / cli.rows.max(1) as u64;
        let date = cli
            .start_date
            .checked_add_days(Days::new(offset))
            .context("sample dates overflow the calendar")?;
        events.push(generate_event(i as i64 + 1, date, &mut rng));
    }

    let batch = build_batch(&events)?;
    write_parquet(&cli.output, &batch)?;

    println!(
        "Wrote {} events over {days} days to {}",
        batch.num_rows(),
        cli.output.display()
    );
    Ok(())
}
