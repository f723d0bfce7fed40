use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::extract::{Extractor, Field, FieldValue, Profile, RatingPolicy};
use crate::fetch::{Fetcher, RetryPolicy};
use crate::images::{image_file_name, ImageDownloader, ImageError};
use crate::pacing::Pacer;
use crate::sink::{CsvSink, WriteMode};
use crate::transport::Transport;
use crate::urls::read_urls;

#[derive(Debug, Clone)]
pub enum Input {
    /// Line-delimited URL list, read from `RunConfig::start_line` on.
    File(PathBuf),
    Url(String),
}

/// Everything one scrape run needs; nothing is read from globals.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: Input,
    pub output: PathBuf,
    pub start_line: usize,
    pub mode: WriteMode,
    pub retry: RetryPolicy,
    pub pacer: Pacer,
    /// `None` disables image downloads.
    pub image_dir: Option<PathBuf>,
    pub profile: Profile,
    pub rating: RatingPolicy,
    pub fields: Vec<Field>,
    pub show_progress: bool,
}

impl RunConfig {
    /// Column set for a profile, with Image Path appended when images are on.
    pub fn columns(profile: Profile, images: bool) -> Vec<Field> {
        let mut fields = profile.fields().to_vec();
        if images {
            fields.push(Field::ImagePath);
        }
        fields
    }

    fn urls(&self) -> Result<Vec<String>> {
        match &self.input {
            Input::File(path) => read_urls(path, self.start_line),
            Input::Url(url) => Ok(vec![url.clone()]),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub saved: usize,
    pub failed: usize,
    pub images: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} pages saved ({} failed, {} images)",
            self.saved, self.total, self.failed, self.images
        )
    }
}

/// Fetch, extract and persist every URL in order.
///
/// Per-URL failures (network, HTTP status, empty page, image fetch) are logged
/// and counted. I/O errors writing the CSV or image files abort the run.
pub async fn run(config: &RunConfig, transport: Arc<dyn Transport>) -> Result<RunSummary> {
    let urls = config.urls()?;
    let extractor = Extractor::new(config.profile, config.rating)?;
    let fetcher = Fetcher::new(Arc::clone(&transport), config.retry.clone());
    if let Some(dir) = &config.image_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create image directory {}", dir.display()))?;
    }
    let downloader = config
        .image_dir
        .as_ref()
        .map(|dir| (dir, ImageDownloader::new(Arc::clone(&transport))));
    let mut sink = CsvSink::open(&config.output, config.fields.clone(), config.mode)?;

    let pb = if config.show_progress {
        let pb = ProgressBar::new(urls.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} {pos}/{len} pages [{wide_bar}] eta {eta} {msg}")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut summary = RunSummary {
        total: urls.len(),
        ..Default::default()
    };

    for (i, url) in urls.iter().enumerate() {
        if i > 0 {
            config.pacer.pause().await;
        }
        pb.set_message(url.rsplit('/').next().unwrap_or_default().to_string());
        pb.inc(1);

        let extraction = match fetcher.fetch(url).await {
            Ok(doc) => extractor.extract(&doc),
            Err(e) => {
                warn!("Skipping {} due to failed web page retrieval: {}", url, e);
                summary.failed += 1;
                continue;
            }
        };

        let mut record = extraction.record;
        if record.is_empty() {
            warn!("Failed to extract information from {}", url);
            summary.failed += 1;
            continue;
        }

        if let (Some((dir, dl)), Some(img_url)) = (&downloader, extraction.image_url) {
            let name = image_file_name(record.title(), config.profile.replaces_spaces_in_image_names());
            match dl.download(&img_url, &dir.join(name)).await {
                Ok(path) => {
                    record.set(Field::ImagePath, FieldValue::Text(path.display().to_string()));
                    summary.images += 1;
                }
                Err(e @ ImageError::Io { .. }) => return Err(e.into()),
                Err(e) => warn!("Failed to download image for {}: {}", url, e),
            }
        }

        debug!("{}: {} fields", url, record.fields().count());
        sink.append_record(&record)?;
        summary.saved += 1;
        info!(
            "Information about {} saved.",
            record.title().unwrap_or("Unknown")
        );
    }

    pb.finish_and_clear();
    info!("Scraped {} pages into {}: {}", summary.total, sink.path().display(), summary);
    Ok(summary)
}

// ── Tests ──
