//! In-process rasterization through PDFium

use crate::error::{Error, Result};
use crate::pdf::raster::{Artifact, ConversionOutcome, ConversionRequest, Rasterizer};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

/// PDF points per inch
const POINTS_PER_INCH: f32 = 72.0;

/// Primary backend: renders pages with the PDFium shared library
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    /// Directories searched for the PDFium library, in order
    library_dirs: Vec<PathBuf>,
    /// Fall back to the platform's library search path
    use_system_library: bool,
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new(
            vec![PathBuf::from("./"), PathBuf::from("/opt/pdfium/lib")],
            true,
        )
    }
}

impl PdfiumRasterizer {
    pub fn new(library_dirs: Vec<PathBuf>, use_system_library: bool) -> Self {
        Self {
            library_dirs,
            use_system_library,
        }
    }

    /// Bind a fresh PDFium instance (PDFium is not thread-safe, so one per job)
    fn create_pdfium(&self) -> Result<Pdfium> {
        let mut last_error = String::from("no library locations configured");

        for dir in &self.library_dirs {
            match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => last_error = format!("{}: {}", dir.display(), e),
            }
        }

        if self.use_system_library {
            match Pdfium::bind_to_system_library() {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => last_error = format!("system library: {}", e),
            }
        }

        Err(Error::BackendUnavailable {
            backend: "pdfium",
            reason: last_error,
        })
    }

    /// Render every page of the document in one pass
    fn render_all_pages(&self, document: &Path, dpi: u32) -> Result<Vec<DynamicImage>> {
        let pdfium = self.create_pdfium()?;

        let pdf = pdfium
            .load_pdf_from_file(document, None)
            .map_err(|e| Error::Pdfium {
                reason: format!("Failed to open {}: {}", document.display(), e),
            })?;

        let config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / POINTS_PER_INCH)
            .render_form_data(true)
            .render_annotations(true);

        let mut images = Vec::new();
        for (index, page) in pdf.pages().iter().enumerate() {
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| Error::Pdfium {
                    reason: format!("Failed to render page {}: {}", index + 1, e),
                })?;
            images.push(bitmap.as_image());
        }

        if images.is_empty() {
            return Err(Error::Pdfium {
                reason: format!("{} has no pages", document.display()),
            });
        }

        Ok(images)
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    async fn rasterize(&self, request: &ConversionRequest) -> ConversionOutcome {
        let this = self.clone();
        let document = request.document.clone();
        let dpi = request.dpi;

        let images =
            tokio::task::spawn_blocking(move || this.render_all_pages(&document, dpi)).await??;

        let stem = request.stem();
        let mut artifacts = Vec::with_capacity(images.len());

        for (index, image) in images.into_iter().enumerate() {
            let page_index = index as u32 + 1;
            let path = request
                .output_dir
                .join(Artifact::file_name(&stem, page_index));

            let target = path.clone();
            tokio::task::spawn_blocking(move || {
                image.save_with_format(&target, image::ImageFormat::Png)
            })
            .await??;

            tracing::info!(artifact = %path.display(), page = page_index, "generated");
            artifacts.push(Artifact {
                parent_stem: stem.clone(),
                page_index,
                path,
            });
        }

        Ok(artifacts)
    }
}
