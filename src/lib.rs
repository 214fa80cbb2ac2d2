//! PDF to PNG MCP Server Library
//!
//! This crate provides MCP tools for turning PDFs into page images:
//! - `convert_pdf_to_png`: Rasterize one PDF into numbered PNG files
//! - `download_paper`: Download a paper into a journal/title folder layout
//! - `download_and_convert`: Download a paper, then rasterize it in place
//! - `batch_convert_pdfs`: Rasterize every PDF in a folder
//! - `search_paper`: Search papers through Semantic Scholar
//!
//! Rendering uses PDFium when it can be loaded and falls back to poppler's
//! `pdftoppm` otherwise.

pub mod error;
pub mod pdf;
pub mod pipeline;
pub mod server;
pub mod source;

pub use error::{Error, Result};
pub use pipeline::{CompositeOutcome, RetrieveAndConvert};
pub use server::{
    run_server, run_server_with_config, BatchConvertParams, ConvertPdfParams,
    DownloadAndConvertParams, DownloadPaperParams, PdfServer, SearchPaperParams, ServerConfig,
};
