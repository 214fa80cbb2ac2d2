//! PDF rasterization layer
//!
//! This module renders PDF pages to PNG files using PDFium in-process, with
//! poppler's `pdftoppm` as a subprocess fallback.

mod convert;
mod pdfium;
mod pdftoppm;
mod raster;

pub use convert::{discover_pdfs, BatchEntry, BatchResult, CancelFlag, Converter, DEFAULT_DPI};
pub use pdfium::PdfiumRasterizer;
pub use pdftoppm::PdftoppmRasterizer;
pub use raster::{
    document_stem, Artifact, ConversionOutcome, ConversionRequest, FallbackRasterizer, Rasterizer,
};
