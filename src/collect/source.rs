use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use super::EventSource;
use crate::data::loader::{read_gdelt_export, read_gdelt_zip, read_gdelt_zip_bytes};

pub const DEFAULT_BASE_URL: &str = "http://data.gdeltproject.org/events/";

/// `20240115.export.CSV.zip`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("{}.export.CSV.zip", date.format("%Y%m%d"))
}

// ---------------------------------------------------------------------------
// HTTP source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Wait before retry `n` is `retry_delay * n`.
    pub retry_delay: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Downloads daily exports from the GDELT 1.0 events archive.
pub struct GdeltHttpSource {
    client: Client,
    options: HttpOptions,
}

impl GdeltHttpSource {
    pub fn new(options: HttpOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, options })
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        let base = self.options.base_url.trim_end_matches('/');
        format!("{base}/{}", export_file_name(date))
    }

    /// `Ok(None)` on 404. Other failures are retried up to `max_attempts`.
    fn download(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let attempts = self.options.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let wait = self.options.retry_delay * (attempt - 1);
                log::warn!("Retrying {url} in {wait:?} (attempt {attempt}/{attempts})");
                thread::sleep(wait);
            }

            let response = match self.client.get(url).send() {
                Ok(response) => response,
                Err(err) => {
                    log::debug!("GET {url} failed: {err}");
                    last_error = Some(anyhow!(err).context(format!("GET {url}")));
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                last_error = Some(anyhow!("GET {url}: HTTP {status}"));
                continue;
            }

            match response.bytes() {
                Ok(body) => return Ok(Some(body.to_vec())),
                Err(err) => {
                    last_error = Some(anyhow!(err).context(format!("reading body of {url}")));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("GET {url}: no attempts made")))
    }
}

impl EventSource for GdeltHttpSource {
    fn fetch_day(&self, date: NaiveDate) -> Result<Option<RecordBatch>> {
        let url = self.url_for(date);
        log::debug!("Downloading {url}");
        let Some(body) = self.download(&url)? else {
            return Ok(None);
        };
        let batch =
            read_gdelt_zip_bytes(&body).with_context(|| format!("parsing export for {date}"))?;
        log::info!("Downloaded {} events for {date}", batch.num_rows());
        Ok(Some(batch))
    }
}

// ---------------------------------------------------------------------------
// Local directory source
// ---------------------------------------------------------------------------

/// Reads exports already on disk, zipped or not.
#[derive(Debug, Clone)]
pub struct LocalExportSource {
    dir: PathBuf,
}

impl LocalExportSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl EventSource for LocalExportSource {
    fn fetch_day(&self, date: NaiveDate) -> Result<Option<RecordBatch>> {
        let zipped = self.dir.join(export_file_name(date));
        let plain = zipped.with_extension("");

        let batch = if plain.is_file() {
            let file =
                File::open(&plain).with_context(|| format!("opening {}", plain.display()))?;
            read_gdelt_export(BufReader::new(file))
        } else if zipped.is_file() {
            let file =
                File::open(&zipped).with_context(|| format!("opening {}", zipped.display()))?;
            read_gdelt_zip(BufReader::new(file))
        } else {
            return Ok(None);
        };

        batch
            .with_context(|| format!("parsing export for {date}"))
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn export_line(id: i64, sqldate: &str) -> String {
        let mut fields = vec![String::new(); 58];
        fields[0] = id.to_string();
        fields[1] = sqldate.to_string();
        fields[31] = "7".to_string();
        fields.join("\t")
    }

    #[test]
    fn urls_use_compact_dates() {
        let source = GdeltHttpSource::new(HttpOptions {
            base_url: "http://mirror.test/events".to_string(),
            ..HttpOptions::default()
        })
        .unwrap();
        assert_eq!(
            source.url_for(day("2024-01-05")),
            "http://mirror.test/events/20240105.export.CSV.zip"
        );
        assert_eq!(export_file_name(day("2023-12-31")), "20231231.export.CSV.zip");
    }

    #[test]
    fn local_source_reads_plain_and_zipped_exports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("20240101.export.CSV"),
            format!("{}\n{}\n", export_line(1, "20240101"), export_line(2, "20240101")),
        )
        .unwrap();

        let file = File::create(dir.path().join("20240102.export.CSV.zip")).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("20240102.export.CSV", SimpleFileOptions::default())
            .unwrap();
        writeln!(zip, "{}", export_line(3, "20240102")).unwrap();
        zip.finish().unwrap();

        let source = LocalExportSource::new(dir.path());
        assert_eq!(
            source.fetch_day(day("2024-01-01")).unwrap().unwrap().num_rows(),
            2
        );
        assert_eq!(
            source.fetch_day(day("2024-01-02")).unwrap().unwrap().num_rows(),
            1
        );
        assert!(source.fetch_day(day("2024-01-03")).unwrap().is_none());
    }

    #[test]
    fn corrupt_zip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("20240101.export.CSV.zip"), b"not a zip").unwrap();
        let source = LocalExportSource::new(dir.path());
        assert!(source.fetch_day(day("2024-01-01")).is_err());
    }
}
