//! Single-document and folder conversion built on a [`Rasterizer`]

use crate::error::{Error, Result};
use crate::pdf::raster::{ConversionOutcome, ConversionRequest, Rasterizer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Resolution used when the caller does not pass one
pub const DEFAULT_DPI: u32 = 1200;

/// Shared flag a caller sets to stop a batch between documents
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome for one document of a batch
#[derive(Debug)]
pub struct BatchEntry {
    pub document: PathBuf,
    pub outcome: ConversionOutcome,
}

/// Per-document outcomes of a folder conversion, in discovery order
#[derive(Debug)]
pub struct BatchResult {
    pub folder: PathBuf,
    pub dpi: u32,
    /// Number of documents discovered
    pub total_count: usize,
    pub entries: Vec<BatchEntry>,
    /// Set when the loop stopped early on a [`CancelFlag`]
    pub cancelled: bool,
}

impl BatchResult {
    pub fn succeeded_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.succeeded_count()
    }

    /// `"{succeeded}/{total}"`
    pub fn summary(&self) -> String {
        format!("{}/{}", self.succeeded_count(), self.total_count)
    }
}

/// Converts documents through one rasterizer.
/// Holds no per-request state; every call renders from scratch.
#[derive(Clone)]
pub struct Converter {
    rasterizer: Arc<dyn Rasterizer>,
    default_dpi: u32,
}

impl Converter {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self::with_default_dpi(rasterizer, DEFAULT_DPI)
    }

    pub fn with_default_dpi(rasterizer: Arc<dyn Rasterizer>, default_dpi: u32) -> Self {
        Self {
            rasterizer,
            default_dpi,
        }
    }

    pub fn default_dpi(&self) -> u32 {
        self.default_dpi
    }

    /// Convert one document, writing page images into `output_dir`
    pub async fn convert(
        &self,
        document: &Path,
        output_dir: &Path,
        dpi: Option<u32>,
    ) -> ConversionOutcome {
        if !tokio::fs::try_exists(document).await.unwrap_or(false) {
            return Err(Error::SourceNotFound {
                path: document.to_path_buf(),
            });
        }

        tokio::fs::create_dir_all(output_dir).await?;

        let request = ConversionRequest::new(document, output_dir, dpi.unwrap_or(self.default_dpi));
        tracing::info!(
            document = %request.document.display(),
            output_dir = %request.output_dir.display(),
            dpi = request.dpi,
            "converting"
        );

        self.rasterizer.rasterize(&request).await
    }

    /// Convert every PDF under `folder`, each into its own directory.
    /// A failing document is recorded and the loop moves on.
    pub async fn convert_batch(
        &self,
        folder: &Path,
        dpi: Option<u32>,
        recursive: bool,
        cancel: &CancelFlag,
    ) -> Result<BatchResult> {
        if !folder.exists() {
            return Err(Error::FolderNotFound {
                path: folder.to_path_buf(),
            });
        }
        if !folder.is_dir() {
            return Err(Error::NotADirectory {
                path: folder.to_path_buf(),
            });
        }

        let documents = discover_pdfs(folder, recursive)?;
        if documents.is_empty() {
            return Err(Error::NoDocumentsFound {
                path: folder.to_path_buf(),
            });
        }

        let dpi = dpi.unwrap_or(self.default_dpi);
        let mut result = BatchResult {
            folder: folder.to_path_buf(),
            dpi,
            total_count: documents.len(),
            entries: Vec::with_capacity(documents.len()),
            cancelled: false,
        };

        for document in documents {
            if cancel.is_cancelled() {
                tracing::info!(
                    processed = result.entries.len(),
                    total = result.total_count,
                    "batch cancelled"
                );
                result.cancelled = true;
                break;
            }

            let output_dir = document
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| folder.to_path_buf());

            let outcome = self.convert(&document, &output_dir, Some(dpi)).await;
            if let Err(ref e) = outcome {
                tracing::warn!(document = %document.display(), error = %e, "conversion failed");
            }
            result.entries.push(BatchEntry { document, outcome });
        }

        tracing::info!(folder = %folder.display(), summary = %result.summary(), "batch finished");
        Ok(result)
    }
}

/// List `*.pdf` files under `folder` in walk order.
/// The suffix match is exact and case-sensitive.
pub fn discover_pdfs(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let root = glob::Pattern::escape(&folder.to_string_lossy());
    let pattern = if recursive {
        format!("{}/**/*.pdf", root)
    } else {
        format!("{}/*.pdf", root)
    };

    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let entries = glob::glob_with(&pattern, options).map_err(|e| Error::InvalidArgument {
        reason: format!("Invalid folder pattern {}: {}", pattern, e),
    })?;

    Ok(entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|path| path.is_file())
        .collect())
}
