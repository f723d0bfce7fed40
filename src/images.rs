use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;
use tracing::info;

use crate::transport::{Transport, TransportError};

static PATH_UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[/\\]").unwrap());

const IMAGE_EXT: &str = "jpg";

/// `<title>.jpg` with path separators (and optionally spaces) replaced by `_`.
pub fn image_file_name(title: Option<&str>, replace_spaces: bool) -> String {
    let title = title.unwrap_or("Unknown");
    let mut name = PATH_UNSAFE_RE.replace_all(title, "_").into_owned();
    if replace_spaces {
        name = name.replace(' ', "_");
    }
    format!("{}.{}", name, IMAGE_EXT)
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP {status} for image {url}")]
    Status { url: String, status: u16 },
    #[error("image request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct ImageDownloader {
    transport: Arc<dyn Transport>,
}

impl ImageDownloader {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetch `url` and write it to `dest`, replacing any existing file.
    /// Nothing touches the disk until the whole body has arrived.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf, ImageError> {
        let resp = self
            .transport
            .get(url)
            .await
            .map_err(|source| ImageError::Transport {
                url: url.to_string(),
                source,
            })?;
        if !resp.is_success() {
            return Err(ImageError::Status {
                url: url.to_string(),
                status: resp.status,
            });
        }

        let io_err = |source| ImageError::Io {
            path: dest.to_path_buf(),
            source,
        };
        if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        std::fs::write(dest, &resp.body).map_err(io_err)?;

        info!("Downloaded image to {}", dest.display());
        Ok(dest.to_path_buf())
    }
}
