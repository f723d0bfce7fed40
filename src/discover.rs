use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use url::Url;

use crate::document::{css, Document};
use crate::fetch::{Fetcher, RetryPolicy};
use crate::pacing::Pacer;
use crate::transport::Transport;

const BRAND_LINKS: &str = r#"a[href*="/Perfumes/"]:not([href*="?current_page="])"#;
const PERFUME_LINKS: &str =
    r#"a[href^="https://www.parfumo.com/Perfumes/"]:not([href*="?current_page="])"#;

#[derive(Debug, Clone)]
pub struct DiscoverConfig {
    pub index_url: String,
    pub exclude: Vec<String>,
    pub output: PathBuf,
    pub retry: RetryPolicy,
    pub pacer: Pacer,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoverSummary {
    pub brands: usize,
    pub failed: usize,
    pub urls: usize,
}

/// Brand page links on the index, resolved against `base`, in page order.
pub fn brand_links(doc: &Document, base: &Url) -> Result<Vec<String>> {
    let sel = css(BRAND_LINKS)?;
    let mut seen = HashSet::new();
    Ok(doc
        .root()
        .find_all(&sel)
        .iter()
        .filter_map(|a| a.attr("href"))
        .filter(|href| !href.ends_with("/Perfumes"))
        .filter_map(|href| base.join(href).ok())
        .map(String::from)
        .filter(|url| seen.insert(url.clone()))
        .collect())
}

/// Perfume detail links on a brand page, minus the brand page itself and `exclude`.
pub fn perfume_links(doc: &Document, brand_url: &str, exclude: &[String]) -> Result<Vec<String>> {
    let sel = css(PERFUME_LINKS)?;
    let slug = brand_url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let mut seen = HashSet::new();
    Ok(doc
        .root()
        .find_all(&sel)
        .iter()
        .filter_map(|a| a.attr("href"))
        .filter(|href| slug.is_empty() || !href.ends_with(slug))
        .filter(|href| !exclude.iter().any(|e| e == href))
        .map(str::to_string)
        .filter(|url| seen.insert(url.clone()))
        .collect())
}

fn append_urls(path: &Path, urls: &[String]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    for url in urls {
        writeln!(file, "{}", url)?;
    }
    file.flush()?;
    Ok(())
}

/// Crawl the brand index and append every perfume URL found to `config.output`.
/// Each brand's URLs are written as soon as that brand page is done.
pub async fn discover(config: &DiscoverConfig, transport: Arc<dyn Transport>) -> Result<DiscoverSummary> {
    let fetcher = Fetcher::new(transport, config.retry.clone());
    let base = Url::parse(&config.index_url)
        .with_context(|| format!("Invalid index URL {}", config.index_url))?;

    info!("Fetching brand index: {}", config.index_url);
    let brands = {
        let doc = fetcher
            .fetch(&config.index_url)
            .await
            .context("Failed to fetch brand index")?;
        brand_links(&doc, &base)?
    };
    info!("Found {} brands", brands.len());

    let mut summary = DiscoverSummary {
        brands: brands.len(),
        ..Default::default()
    };

    for brand in &brands {
        config.pacer.pause().await;

        let urls = match fetcher.fetch(brand).await {
            Ok(doc) => perfume_links(&doc, brand, &config.exclude)?,
            Err(e) => {
                warn!("Failed to retrieve brand page {}: {}", brand, e);
                summary.failed += 1;
                continue;
            }
        };

        append_urls(&config.output, &urls)?;
        summary.urls += urls.len();
        info!("{}: {} perfume URLs", brand, urls.len());
    }

    Ok(summary)
}

// ── Tests ──
