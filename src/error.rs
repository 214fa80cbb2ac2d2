//! Error types for the PDF to PNG MCP server

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the PDF to PNG MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// Install guidance attached to [`Error::BackendMissing`]
pub const PDFTOPPM_INSTALL_HINT: &str = "pdftoppm was not found. Install poppler-utils:
  - Windows: download poppler and add its bin directory to PATH
  - macOS: brew install poppler
  - Linux: sudo apt install poppler-utils";

/// Error types for the PDF to PNG MCP server
#[derive(Error, Debug)]
pub enum Error {
    /// Input document does not exist
    #[error("PDF not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Input file exists but does not carry a `.pdf` extension
    #[error("File is not a PDF: {path}")]
    NotAPdf { path: PathBuf },

    /// Batch folder does not exist
    #[error("Folder not found: {path}")]
    FolderNotFound { path: PathBuf },

    /// Batch folder path points at something other than a directory
    #[error("Path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Discovery found no PDF documents
    #[error("No PDF files found in {path}")]
    NoDocumentsFound { path: PathBuf },

    /// Tool arguments rejected before any side effect
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// In-process rasterizer could not be loaded
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// External rasterization tool is not installed
    #[error("{guidance}")]
    BackendMissing { guidance: String },

    /// External rasterization tool exited with an error
    #[error("pdftoppm conversion failed: {stderr}")]
    BackendExecution { stderr: String },

    /// Backend finished cleanly but wrote no images
    #[error("Conversion finished but no PNG files were found in {dir}")]
    NoOutputProduced { dir: PathBuf },

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// PNG encoding error
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    /// Server answered with an error status
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Request did not complete in time
    #[error("Request timed out after {secs}s: {url}")]
    Timeout { url: String, secs: u64 },

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Download too large
    #[error("Download too large: {size} bytes (max: {max_size} bytes)")]
    DownloadTooLarge { size: u64, max_size: u64 },

    /// Paper search API returned something unusable
    #[error("Search failed: {reason}")]
    Search { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blocking task panicked or was cancelled
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl Error {
    /// Return the message sent to tool callers.
    /// Library and transport internals are reduced to a category; backend
    /// diagnostics and install guidance are kept since the caller can act on them.
    pub fn client_message(&self) -> String {
        match self {
            Error::SourceNotFound { path } => format!("PDF not found: {}", path.display()),
            Error::NotAPdf { path } => format!("File is not a PDF: {}", path.display()),
            Error::FolderNotFound { path } => format!("Folder not found: {}", path.display()),
            Error::NotADirectory { path } => {
                format!("Path is not a directory: {}", path.display())
            }
            Error::NoDocumentsFound { path } => {
                format!("No PDF files found in {}", path.display())
            }
            Error::InvalidArgument { reason } => format!("Invalid argument: {}", reason),
            Error::BackendUnavailable { backend, .. } => {
                format!("{} backend unavailable", backend)
            }
            Error::BackendMissing { guidance } => guidance.clone(),
            Error::BackendExecution { stderr } => format!("pdftoppm conversion failed: {}", stderr),
            Error::NoOutputProduced { .. } => {
                "Conversion finished but no PNG files were produced".to_string()
            }
            Error::Pdfium { .. } => "PDF rendering error".to_string(),
            Error::Image(_) => "Image encoding error".to_string(),
            Error::HttpStatus { status, .. } => format!("HTTP {}", status),
            Error::Timeout { secs, .. } => format!("Request timed out after {}s", secs),
            Error::HttpRequest(_) => "HTTP request failed".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
            Error::Search { reason } => format!("Search failed: {}", reason),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::TaskJoin(_) => "Internal task error".to_string(),
        }
    }
}
