//! Remote sources: downloads, paper search and on-disk layout

pub mod download;
pub mod layout;
pub mod search;

pub use download::{Download, Fetcher, HttpFetcher};
pub use layout::{sanitize_filename, PaperLayout};
pub use search::{PaperSearch, PaperSummary, SemanticScholarClient};
