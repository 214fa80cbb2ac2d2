//! Download a paper, then rasterize it next to the saved file

use crate::error::Result;
use crate::pdf::{ConversionOutcome, Converter};
use crate::source::{Download, Fetcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of a download that succeeded; the conversion may still have failed
#[derive(Debug)]
pub struct CompositeOutcome {
    pub download: Download,
    pub output_dir: PathBuf,
    pub conversion: ConversionOutcome,
}

impl CompositeOutcome {
    /// Both steps succeeded
    pub fn is_complete(&self) -> bool {
        self.conversion.is_ok()
    }
}

/// Fetch-then-convert composition
#[derive(Clone)]
pub struct RetrieveAndConvert {
    fetcher: Arc<dyn Fetcher>,
    converter: Converter,
}

impl RetrieveAndConvert {
    pub fn new(fetcher: Arc<dyn Fetcher>, converter: Converter) -> Self {
        Self { fetcher, converter }
    }

    /// Download `url` to `destination` and convert it into the same directory.
    ///
    /// `Err` means the download failed and nothing was converted. A failed
    /// conversion is reported inside the [`CompositeOutcome`]; the downloaded
    /// file stays on disk either way.
    pub async fn run(
        &self,
        url: &str,
        destination: &Path,
        dpi: Option<u32>,
    ) -> Result<CompositeOutcome> {
        let download = self.fetcher.fetch(url, destination).await?;

        let output_dir = download
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let conversion = self
            .converter
            .convert(&download.path, &output_dir, dpi)
            .await;

        if let Err(ref e) = conversion {
            tracing::warn!(
                document = %download.path.display(),
                error = %e,
                "downloaded document could not be converted"
            );
        }

        Ok(CompositeOutcome {
            download,
            output_dir,
            conversion,
        })
    }
}
