//! MCP Server implementation using rmcp

use crate::error::Error;
use crate::pdf::{
    BatchResult, CancelFlag, Converter, FallbackRasterizer, PdfiumRasterizer, PdftoppmRasterizer,
    Rasterizer, DEFAULT_DPI,
};
use crate::pipeline::{CompositeOutcome, RetrieveAndConvert};
use crate::source::download::{validate_url, DEFAULT_MAX_DOWNLOAD_BYTES, DEFAULT_TIMEOUT_SECS};
use crate::source::search::{
    clamp_max_results, DEFAULT_SEARCH_ENDPOINT, DEFAULT_SEARCH_TIMEOUT_SECS,
};
use crate::source::{
    Fetcher, HttpFetcher, PaperLayout, PaperSearch, PaperSummary, SemanticScholarClient,
};
use anyhow::Result;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, service::RequestContext, tool, tool_handler, tool_router, RoleServer,
    ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Accepted DPI range for every tool
pub const MIN_DPI: u32 = 72;
pub const MAX_DPI: u32 = 2400;

/// Runtime configuration shared by every tool
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// DPI used when a tool call omits it (default: 1200)
    pub default_dpi: u32,
    /// Directories searched for the PDFium library, in order
    pub pdfium_library_dirs: Vec<PathBuf>,
    /// Also try the platform library search path for PDFium (default: true)
    pub pdfium_use_system_library: bool,
    /// pdftoppm executable (default: `pdftoppm` on PATH)
    pub pdftoppm_program: PathBuf,
    /// Arguments placed before the pdftoppm flags
    pub pdftoppm_launcher_args: Vec<String>,
    /// Download connect and read timeout in seconds (default: 60)
    pub download_timeout_secs: u64,
    /// Maximum download size in bytes (default: 512MB)
    pub max_download_bytes: u64,
    /// Paper search endpoint (default: Semantic Scholar)
    pub search_endpoint: String,
    /// Search timeout in seconds (default: 30)
    pub search_timeout_secs: u64,
    /// Base directory for downloads when a call omits it (default: `.`)
    pub default_base_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_dpi: DEFAULT_DPI,
            pdfium_library_dirs: vec![PathBuf::from("./"), PathBuf::from("/opt/pdfium/lib")],
            pdfium_use_system_library: true,
            pdftoppm_program: PathBuf::from("pdftoppm"),
            pdftoppm_launcher_args: Vec::new(),
            download_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            search_timeout_secs: DEFAULT_SEARCH_TIMEOUT_SECS,
            default_base_dir: PathBuf::from("."),
        }
    }
}

fn parse_or_default<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %value, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}

impl ServerConfig {
    /// Defaults overlaid with `PDF_PNG_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let default_dpi = parse_or_default(
            "PDF_PNG_DEFAULT_DPI",
            lookup("PDF_PNG_DEFAULT_DPI"),
            defaults.default_dpi,
        );
        let default_dpi = if (MIN_DPI..=MAX_DPI).contains(&default_dpi) {
            default_dpi
        } else {
            tracing::warn!(default_dpi, "default DPI out of range, using {}", DEFAULT_DPI);
            DEFAULT_DPI
        };

        Self {
            default_dpi,
            pdfium_library_dirs: lookup("PDF_PNG_PDFIUM_DIRS")
                .map(|dirs| std::env::split_paths(&dirs).collect())
                .unwrap_or(defaults.pdfium_library_dirs),
            pdfium_use_system_library: parse_or_default(
                "PDF_PNG_PDFIUM_SYSTEM",
                lookup("PDF_PNG_PDFIUM_SYSTEM"),
                defaults.pdfium_use_system_library,
            ),
            pdftoppm_program: lookup("PDF_PNG_PDFTOPPM")
                .map(PathBuf::from)
                .unwrap_or(defaults.pdftoppm_program),
            pdftoppm_launcher_args: defaults.pdftoppm_launcher_args,
            download_timeout_secs: parse_or_default(
                "PDF_PNG_DOWNLOAD_TIMEOUT",
                lookup("PDF_PNG_DOWNLOAD_TIMEOUT"),
                defaults.download_timeout_secs,
            ),
            max_download_bytes: parse_or_default(
                "PDF_PNG_MAX_DOWNLOAD_BYTES",
                lookup("PDF_PNG_MAX_DOWNLOAD_BYTES"),
                defaults.max_download_bytes,
            ),
            search_endpoint: lookup("PDF_PNG_SEARCH_ENDPOINT")
                .unwrap_or(defaults.search_endpoint),
            search_timeout_secs: parse_or_default(
                "PDF_PNG_SEARCH_TIMEOUT",
                lookup("PDF_PNG_SEARCH_TIMEOUT"),
                defaults.search_timeout_secs,
            ),
            default_base_dir: lookup("PDF_PNG_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.default_base_dir),
        }
    }

    /// PDFium first, pdftoppm as the fallback
    pub fn rasterizer(&self) -> Arc<dyn Rasterizer> {
        Arc::new(FallbackRasterizer::new(
            Arc::new(PdfiumRasterizer::new(
                self.pdfium_library_dirs.clone(),
                self.pdfium_use_system_library,
            )),
            Arc::new(PdftoppmRasterizer::new(
                self.pdftoppm_program.clone(),
                self.pdftoppm_launcher_args.clone(),
            )),
        ))
    }
}

/// PDF to PNG MCP Server
#[derive(Clone)]
pub struct PdfServer {
    converter: Converter,
    composer: RetrieveAndConvert,
    fetcher: Arc<dyn Fetcher>,
    searcher: Arc<dyn PaperSearch>,
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConvertPdfParams {
    /// Full path to the PDF file
    pub pdf_path: String,
    /// Output resolution in DPI (72-2400, default: 1200)
    #[serde(default)]
    pub dpi: Option<u32>,
    /// Output directory (default: the PDF's directory)
    #[serde(default)]
    pub output_dir: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DownloadPaperParams {
    /// Download URL of the paper PDF
    pub url: String,
    /// Journal or collection name, used as the first folder level
    #[serde(alias = "collection_name")]
    pub journal: String,
    /// Paper title, used for the second folder level and the file name
    pub title: String,
    /// Base directory (default: current directory)
    #[serde(default)]
    pub base_dir: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DownloadAndConvertParams {
    /// Download URL of the paper PDF
    pub url: String,
    /// Journal or collection name, used as the first folder level
    #[serde(alias = "collection_name")]
    pub journal: String,
    /// Paper title, used for the second folder level and the file name
    pub title: String,
    /// Base directory (default: current directory)
    #[serde(default)]
    pub base_dir: Option<String>,
    /// Output resolution in DPI (72-2400, default: 1200)
    #[serde(default)]
    pub dpi: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchConvertParams {
    /// Folder containing PDF files
    pub folder_path: String,
    /// Output resolution in DPI (72-2400, default: 1200)
    #[serde(default)]
    pub dpi: Option<u32>,
    /// Search subfolders recursively (default: true)
    #[serde(default = "default_true")]
    pub recursive: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchPaperParams {
    /// Search keywords
    pub query: String,
    /// Maximum number of results (1-20, default: 5)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

fn validate_dpi(dpi: Option<u32>) -> crate::error::Result<Option<u32>> {
    match dpi {
        Some(value) if !(MIN_DPI..=MAX_DPI).contains(&value) => Err(Error::InvalidArgument {
            reason: format!("dpi must be between {} and {}, got {}", MIN_DPI, MAX_DPI, value),
        }),
        other => Ok(other),
    }
}

/// Parent directory of `path`, `.` for bare file names
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn failure_text(tool: &str, error: &Error) -> String {
    tracing::warn!(tool, error = %error, "tool call failed");
    format!("Error: {}", error.client_message())
}

fn download_failure_text(error: &Error) -> String {
    tracing::warn!(error = %error, "download failed");
    match error {
        Error::HttpStatus { status, .. } => {
            format!("Download failed (HTTP {}): {}", status, error.client_message())
        }
        _ => format!("Download failed: {}", error.client_message()),
    }
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl PdfServer {
    pub fn new() -> crate::error::Result<Self> {
        Self::with_config(ServerConfig::default())
    }

    /// Create a server with the real rasterizers, HTTP fetcher and search client
    pub fn with_config(config: ServerConfig) -> crate::error::Result<Self> {
        let rasterizer = config.rasterizer();
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(
            config.download_timeout_secs,
            config.max_download_bytes,
        )?);
        let searcher: Arc<dyn PaperSearch> = Arc::new(SemanticScholarClient::new(
            config.search_endpoint.clone(),
            config.search_timeout_secs,
        )?);
        Ok(Self::with_components(config, rasterizer, fetcher, searcher))
    }

    /// Create a server from explicit capabilities
    pub fn with_components(
        config: ServerConfig,
        rasterizer: Arc<dyn Rasterizer>,
        fetcher: Arc<dyn Fetcher>,
        searcher: Arc<dyn PaperSearch>,
    ) -> Self {
        let converter = Converter::with_default_dpi(rasterizer, config.default_dpi);
        Self {
            composer: RetrieveAndConvert::new(fetcher.clone(), converter.clone()),
            converter,
            fetcher,
            searcher,
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// Convert a PDF file to PNG images
    #[tool(
        description = "Convert a PDF file into high-resolution PNG images, one per page.

Options:
- dpi: Output resolution (72-2400, default: 1200)
- output_dir: Output directory (default: the PDF's directory)

Images are named {stem}-001.png, {stem}-002.png, ..."
    )]
    async fn convert_pdf_to_png(&self, Parameters(params): Parameters<ConvertPdfParams>) -> String {
        self.process_convert_pdf(&params)
            .await
            .unwrap_or_else(|e| failure_text("convert_pdf_to_png", &e))
    }

    /// Download a paper PDF into a journal/title folder structure
    #[tool(
        description = "Download an academic paper PDF. The file is saved as <base_dir>/<journal>/<title>/<title>.pdf with unsafe characters replaced."
    )]
    async fn download_paper(&self, Parameters(params): Parameters<DownloadPaperParams>) -> String {
        self.process_download_paper(&params)
            .await
            .unwrap_or_else(|e| failure_text("download_paper", &e))
    }

    /// Download a paper PDF and convert it to PNG images
    #[tool(
        description = "Download an academic paper PDF and convert it into PNG images. Both the PDF and the images are stored in <base_dir>/<journal>/<title>/.

If the download succeeds but the conversion fails, the PDF is kept and both results are reported."
    )]
    async fn download_and_convert(
        &self,
        Parameters(params): Parameters<DownloadAndConvertParams>,
    ) -> String {
        self.process_download_and_convert(&params)
            .await
            .unwrap_or_else(|e| failure_text("download_and_convert", &e))
    }

    /// Convert every PDF in a folder
    #[tool(
        description = "Convert every PDF file in a folder into PNG images, writing each document's images next to it. Subfolders are searched unless recursive is false. One failing file does not stop the batch."
    )]
    async fn batch_convert_pdfs(
        &self,
        Parameters(params): Parameters<BatchConvertParams>,
        context: RequestContext<RoleServer>,
    ) -> String {
        let cancel = CancelFlag::new();
        let watcher = {
            let cancel = cancel.clone();
            let ct = context.ct.clone();
            tokio::spawn(async move {
                ct.cancelled().await;
                cancel.cancel();
            })
        };

        let text = self
            .process_batch_convert(&params, &cancel)
            .await
            .unwrap_or_else(|e| failure_text("batch_convert_pdfs", &e));

        watcher.abort();
        text
    }

    /// Search for academic papers
    #[tool(
        description = "Search academic papers with the Semantic Scholar API. Returns title, authors, year, venue and open-access PDF link for each result.

Options:
- max_results: Number of results (1-20, default: 5)"
    )]
    async fn search_paper(&self, Parameters(params): Parameters<SearchPaperParams>) -> String {
        self.process_search_paper(&params)
            .await
            .unwrap_or_else(|e| failure_text("search_paper", &e))
    }
}

impl PdfServer {
    fn base_dir(&self, base_dir: &Option<String>) -> PathBuf {
        base_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.default_base_dir.clone())
    }

    pub async fn process_convert_pdf(
        &self,
        params: &ConvertPdfParams,
    ) -> crate::error::Result<String> {
        let dpi = validate_dpi(params.dpi)?;
        let pdf_path = PathBuf::from(&params.pdf_path);

        if !pdf_path.exists() {
            return Err(Error::SourceNotFound { path: pdf_path });
        }
        let is_pdf = pdf_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(Error::NotAPdf { path: pdf_path });
        }

        let output_dir = params
            .output_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| parent_dir(&pdf_path));
        let dpi = dpi.unwrap_or(self.converter.default_dpi());

        match self.converter.convert(&pdf_path, &output_dir, Some(dpi)).await {
            Ok(artifacts) => Ok(format!(
                "Converted {} to {} PNG files\nOutput directory: {}\nDPI: {}",
                file_label(&pdf_path),
                artifacts.len(),
                output_dir.display(),
                dpi
            )),
            Err(e) => {
                tracing::warn!(document = %pdf_path.display(), error = %e, "conversion failed");
                Ok(format!("Conversion failed: {}", e.client_message()))
            }
        }
    }

    pub async fn process_download_paper(
        &self,
        params: &DownloadPaperParams,
    ) -> crate::error::Result<String> {
        validate_url(&params.url)?;
        let layout = PaperLayout::new(&self.base_dir(&params.base_dir), &params.journal, &params.title);

        match self.fetcher.fetch(&params.url, &layout.pdf_path).await {
            Ok(download) => Ok(format!(
                "Downloaded paper\nTitle: {}\nJournal: {}\nSaved to: {}\nSize: {} bytes",
                layout.title,
                layout.journal,
                download.path.display(),
                download.bytes
            )),
            Err(e) => Ok(download_failure_text(&e)),
        }
    }

    pub async fn process_download_and_convert(
        &self,
        params: &DownloadAndConvertParams,
    ) -> crate::error::Result<String> {
        let dpi = validate_dpi(params.dpi)?.unwrap_or(self.converter.default_dpi());
        validate_url(&params.url)?;
        let layout = PaperLayout::new(&self.base_dir(&params.base_dir), &params.journal, &params.title);

        let outcome = match self.composer.run(&params.url, &layout.pdf_path, Some(dpi)).await {
            Ok(outcome) => outcome,
            Err(e) => return Ok(download_failure_text(&e)),
        };

        Ok(format_composite(&layout, dpi, &outcome))
    }

    pub async fn process_batch_convert(
        &self,
        params: &BatchConvertParams,
        cancel: &CancelFlag,
    ) -> crate::error::Result<String> {
        let dpi = validate_dpi(params.dpi)?;
        let folder = PathBuf::from(&params.folder_path);

        let result = self
            .converter
            .convert_batch(&folder, dpi, params.recursive, cancel)
            .await?;

        Ok(format_batch(&result))
    }

    pub async fn process_search_paper(
        &self,
        params: &SearchPaperParams,
    ) -> crate::error::Result<String> {
        let query = params.query.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument {
                reason: "query must not be empty".to_string(),
            });
        }
        let max_results = clamp_max_results(params.max_results);

        match self.searcher.search(query, max_results).await {
            Ok(results) if results.is_empty() => Ok(format!("No papers found for '{}'", query)),
            Ok(results) => Ok(format_search(query, &results)),
            Err(e) => {
                tracing::warn!(query, error = %e, "search failed");
                Ok(format!("Search failed: {}", e.client_message()))
            }
        }
    }
}

fn format_composite(layout: &PaperLayout, dpi: u32, outcome: &CompositeOutcome) -> String {
    let mut lines = vec![
        "Finished".to_string(),
        format!("Title: {}", layout.title),
        format!("Journal: {}", layout.journal),
        format!("Directory: {}", outcome.output_dir.display()),
        format!("DPI: {}", dpi),
        "Results:".to_string(),
        format!("✓ Downloaded: {}", outcome.download.path.display()),
    ];
    match &outcome.conversion {
        Ok(artifacts) => lines.push(format!("✓ Converted to {} PNG files", artifacts.len())),
        Err(e) => lines.push(format!("✗ Conversion failed: {}", e.client_message())),
    }
    lines.join("\n")
}

fn format_batch(result: &BatchResult) -> String {
    let mut lines = vec![
        "Batch conversion finished".to_string(),
        format!("Succeeded: {}", result.summary()),
        format!("DPI: {}", result.dpi),
    ];
    if result.cancelled {
        lines.push(format!(
            "Cancelled after {} of {} documents",
            result.entries.len(),
            result.total_count
        ));
    }
    lines.push("Details:".to_string());
    for entry in &result.entries {
        let name = file_label(&entry.document);
        match &entry.outcome {
            Ok(artifacts) => lines.push(format!("✓ {}: {} PNG", name, artifacts.len())),
            Err(e) => lines.push(format!("✗ {}: {}", name, e.client_message())),
        }
    }
    lines.join("\n")
}

fn format_search(query: &str, results: &[PaperSummary]) -> String {
    let mut lines = vec![format!("Results for '{}' ({} papers):", query, results.len()), String::new()];
    for (i, paper) in results.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, paper.title));
        lines.push(format!("   Authors: {}", paper.authors));
        if !paper.year.is_empty() {
            lines.push(format!("   Year: {}", paper.year));
        }
        if !paper.venue.is_empty() {
            lines.push(format!("   Venue: {}", paper.venue));
        }
        if !paper.pdf_url.is_empty() {
            lines.push(format!("   PDF: {}", paper.pdf_url));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

#[tool_handler]
impl ServerHandler for PdfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Converts PDF files to PNG images (PDFium, with pdftoppm as fallback), \
                 downloads and searches academic papers, and batch-converts folders."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with configuration taken from the environment
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::from_env()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    tracing::info!(
        default_dpi = config.default_dpi,
        pdftoppm = %config.pdftoppm_program.display(),
        "configuration loaded"
    );
    let server = PdfServer::with_config(config)?;

    tracing::info!("PDF to PNG MCP Server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
