//! Rasterization contract and the two-tier backend selector

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One conversion job handed to a backend
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Source document
    pub document: PathBuf,
    /// Directory receiving the page images (already created)
    pub output_dir: PathBuf,
    /// Rendering resolution
    pub dpi: u32,
}

impl ConversionRequest {
    pub fn new(document: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            document: document.into(),
            output_dir: output_dir.into(),
            dpi,
        }
    }

    /// File name without extension, used as the naming root for artifacts
    pub fn stem(&self) -> String {
        document_stem(&self.document)
    }
}

/// File name of `path` without its extension
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// One rendered page image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Stem of the document this page came from
    pub parent_stem: String,
    /// Page number (1-indexed)
    pub page_index: u32,
    /// Location of the PNG file
    pub path: PathBuf,
}

impl Artifact {
    /// Artifact file name for the in-process backend: `{stem}-{page:03}.png`
    pub fn file_name(stem: &str, page_index: u32) -> String {
        format!("{}-{:03}.png", stem, page_index)
    }
}

/// Result of rasterizing one document
pub type ConversionOutcome = Result<Vec<Artifact>>;

/// A PDF rasterization strategy
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Render every page of `request.document` into `request.output_dir`.
    /// A successful result is non-empty and ordered by page.
    async fn rasterize(&self, request: &ConversionRequest) -> ConversionOutcome;
}

/// Tries `primary` once and falls back to `secondary` once on any error
pub struct FallbackRasterizer {
    primary: Arc<dyn Rasterizer>,
    secondary: Arc<dyn Rasterizer>,
}

impl FallbackRasterizer {
    pub fn new(primary: Arc<dyn Rasterizer>, secondary: Arc<dyn Rasterizer>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Rasterizer for FallbackRasterizer {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn rasterize(&self, request: &ConversionRequest) -> ConversionOutcome {
        match self.primary.rasterize(request).await {
            Ok(artifacts) => Ok(artifacts),
            Err(e) => {
                tracing::warn!(
                    primary = self.primary.name(),
                    secondary = self.secondary.name(),
                    document = %request.document.display(),
                    error = %e,
                    "primary rasterizer failed, falling back"
                );
                self.secondary.rasterize(request).await
            }
        }
    }
}
