use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::extract::{Profile, RatingPolicy};
use crate::fetch::RetryPolicy;
use crate::pacing::Pacer;

const DEFAULT_CONFIG: &str = "perfume_scraper";
const ENV_PREFIX: &str = "PERFUME";

/// Settings shared by every command.
///
/// Sources, later ones winning: built-in defaults, `perfume_scraper.toml`
/// in the working directory (or the file given with `--config`), then
/// `PERFUME_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_min_secs: f64,
    pub retry_max_secs: f64,
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    pub image_dir: PathBuf,
    pub profile: Profile,
    pub rating: Option<RatingPolicy>,
    pub discover_index_url: String,
    pub discover_exclude: Vec<String>,
    pub discover_delay_secs: f64,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = Config::builder()
            .set_default("user_agent", "Mozilla/5.0")?
            .set_default("timeout_secs", 30_i64)?
            .set_default("max_attempts", 3_i64)?
            .set_default("retry_min_secs", 1.0)?
            .set_default("retry_max_secs", 3.0)?
            .set_default("delay_min_secs", 1.0)?
            .set_default("delay_max_secs", 5.0)?
            .set_default("image_dir", "images")?
            .set_default("profile", "detailed")?
            .set_default("discover_index_url", "https://www.parfumo.com/Popular_Brands")?
            .set_default(
                "discover_exclude",
                vec!["https://www.parfumo.com/Perfumes/Dupes".to_string()],
            )?
            .set_default("discover_delay_secs", 2.0)?;

        let builder = match path {
            Some(p) => builder.add_source(File::from(p).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG).required(false)),
        };

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("discover_exclude"),
            )
            .build()
            .context("Failed to load settings")?;

        settings
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::baseline(
            self.max_attempts,
            secs(self.retry_min_secs),
            secs(self.retry_max_secs),
        )
    }

    pub fn pacer(&self) -> Pacer {
        Pacer::between(secs(self.delay_min_secs), secs(self.delay_max_secs))
    }

    pub fn discover_pacer(&self) -> Pacer {
        Pacer::between(secs(self.discover_delay_secs), secs(self.discover_delay_secs))
    }

    /// Configured rating policy, else the profile's own.
    pub fn rating_for(&self, profile: Profile) -> RatingPolicy {
        self.rating.unwrap_or_else(|| profile.default_rating())
    }
}

/// Non-negative seconds to a `Duration`; garbage becomes zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or_default()
}
