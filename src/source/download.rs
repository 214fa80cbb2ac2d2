//! Fetching remote documents over HTTP

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Browser-like User-Agent; several publishers refuse unknown clients
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default connect and read timeout for downloads, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default maximum download size (512MB)
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 512 * 1024 * 1024;

const MAX_REDIRECTS: usize = 10;

/// A document saved to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub bytes: u64,
    /// Declared `Content-Type`, if any
    pub content_type: Option<String>,
}

/// Capability to fetch a URL into a local file
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<Download>;
}

/// [`Fetcher`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
    max_download_bytes: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64, max_download_bytes: u64) -> Result<Self> {
        // Per-phase limits; a slow but steady body is not cut off
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeout_secs))
            .read_timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::HttpRequest)?;

        Ok(Self {
            client,
            timeout_secs,
            max_download_bytes,
        })
    }

    fn map_error(&self, url: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            Error::HttpRequest(err)
        }
    }

    async fn write_body(
        &self,
        url: &str,
        response: reqwest::Response,
        destination: &Path,
    ) -> Result<u64> {
        if let Some(content_length) = response.content_length() {
            if content_length > self.max_download_bytes {
                return Err(Error::DownloadTooLarge {
                    size: content_length,
                    max_size: self.max_download_bytes,
                });
            }
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_error(url, e))?;
            written += chunk.len() as u64;
            if written > self.max_download_bytes {
                return Err(Error::DownloadTooLarge {
                    size: written,
                    max_size: self.max_download_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        Ok(written)
    }
}

/// Parse and check that `url` is an absolute http(s) URL
pub fn validate_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url).map_err(|e| Error::InvalidArgument {
        reason: format!("Invalid URL {:?}: {}", url, e),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::InvalidArgument {
            reason: format!("Unsupported URL scheme: {}", other),
        }),
    }
}

/// Whether the response looks like a PDF by header or by URL path.
/// Only used for a warning; the body is saved either way.
fn looks_like_pdf(url: &str, content_type: Option<&str>) -> bool {
    if content_type.is_some_and(|ct| ct.to_lowercase().contains("pdf")) {
        return true;
    }
    let path_is_pdf = url::Url::parse(url)
        .map(|u| u.path().to_lowercase().ends_with(".pdf"))
        .unwrap_or(false);
    path_is_pdf || url.to_lowercase().ends_with(".pdf")
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<Download> {
        validate_url(url)?;
        tracing::info!(url, destination = %destination.display(), "downloading");

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(url, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !looks_like_pdf(url, content_type.as_deref()) {
            tracing::warn!(
                url,
                content_type = content_type.as_deref().unwrap_or(""),
                "response does not look like a PDF, saving anyway"
            );
        }

        let bytes = match self.write_body(url, response, destination).await {
            Ok(bytes) => bytes,
            Err(e) => {
                // never leave a truncated document behind
                if let Err(remove_err) = tokio::fs::remove_file(destination).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %destination.display(),
                            error = %remove_err,
                            "could not remove partial download"
                        );
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(path = %destination.display(), bytes, "download complete");

        Ok(Download {
            path: destination.to_path_buf(),
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one connection: read the request head, wait `delay`, write `response`
    async fn serve_once(response: Vec<u8>, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                head.extend_from_slice(&buf[..n]);
            }
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.flush().await;
        });

        format!("http://{}", addr)
    }

    fn paper_destination(dir: &Path) -> PathBuf {
        dir.join("journal").join("title").join("title.pdf")
    }

    #[rstest]
    #[case("https://arxiv.org/pdf/1706.03762.pdf", None, true)]
    #[case("https://example.com/Paper.PDF", None, true)]
    #[case("https://example.com/get?id=7&name=x.pdf", None, true)]
    #[case("https://example.com/download/7.pdf?token=abc", None, true)]
    #[case("https://example.com/download/7", Some("application/pdf"), true)]
    #[case("https://example.com/download/7", Some("Application/PDF; charset=binary"), true)]
    #[case("https://example.com/download/7", Some("text/html"), false)]
    #[case("https://example.com/download/7", None, false)]
    fn test_looks_like_pdf(
        #[case] url: &str,
        #[case] content_type: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(looks_like_pdf(url, content_type), expected);
    }

    #[rstest]
    #[case("https://example.com/a.pdf", true)]
    #[case("http://example.com/a.pdf", true)]
    #[case("ftp://example.com/a.pdf", false)]
    #[case("file:///etc/passwd", false)]
    #[case("not a url", false)]
    #[case("", false)]
    fn test_validate_url(#[case] url: &str, #[case] ok: bool) {
        assert_eq!(validate_url(url).is_ok(), ok);
    }

    #[tokio::test]
    async fn test_invalid_url_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("journal").join("title").join("title.pdf");
        let fetcher = HttpFetcher::new(5, DEFAULT_MAX_DOWNLOAD_BYTES).unwrap();

        let result = fetcher.fetch("ftp://example.com/x.pdf", &destination).await;
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
        assert!(!destination.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_failed_request_still_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("journal").join("title").join("title.pdf");
        let fetcher = HttpFetcher::new(2, DEFAULT_MAX_DOWNLOAD_BYTES).unwrap();

        // Port 9 on localhost is closed on any sane test host
        let result = fetcher
            .fetch("http://127.0.0.1:9/not-found.pdf", &destination)
            .await;
        assert!(result.is_err());
        assert!(destination.parent().unwrap().is_dir());
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let base = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
            Duration::ZERO,
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let destination = paper_destination(dir.path());
        let fetcher = HttpFetcher::new(5, DEFAULT_MAX_DOWNLOAD_BYTES).unwrap();

        let result = fetcher
            .fetch(&format!("{}/missing.pdf", base), &destination)
            .await;

        assert!(matches!(result, Err(Error::HttpStatus { status: 404, .. })));
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\n%PDF".to_vec(),
            Duration::from_secs(3),
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let destination = paper_destination(dir.path());
        let fetcher = HttpFetcher::new(1, DEFAULT_MAX_DOWNLOAD_BYTES).unwrap();

        let result = fetcher
            .fetch(&format!("{}/slow.pdf", base), &destination)
            .await;

        assert!(matches!(result, Err(Error::Timeout { secs: 1, .. })));
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_steady_body_outlives_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\n")
                .await
                .unwrap();
            // 1.5s in total, each gap well under the 1s limit
            for chunk in [b"%PDF", b"-1.4", b" end"] {
                tokio::time::sleep(Duration::from_millis(500)).await;
                socket.write_all(chunk).await.unwrap();
                socket.flush().await.unwrap();
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let destination = paper_destination(dir.path());
        let fetcher = HttpFetcher::new(1, DEFAULT_MAX_DOWNLOAD_BYTES).unwrap();

        let download = fetcher
            .fetch(&format!("{}/steady.pdf", base), &destination)
            .await
            .unwrap();
        assert_eq!(download.bytes, 12);
        assert_eq!(std::fs::read(&destination).unwrap(), b"%PDF-1.4 end");
    }

    #[tokio::test]
    async fn test_non_pdf_response_is_saved() {
        let body = b"<html>landing page</html>";
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        let base = serve_once(response, Duration::ZERO).await;

        let dir = tempfile::tempdir().unwrap();
        let destination = paper_destination(dir.path());
        let fetcher = HttpFetcher::new(5, DEFAULT_MAX_DOWNLOAD_BYTES).unwrap();

        let download = fetcher
            .fetch(&format!("{}/article/landing", base), &destination)
            .await
            .unwrap();

        assert_eq!(download.bytes, body.len() as u64);
        assert_eq!(download.content_type.as_deref(), Some("text/html"));
        assert_eq!(std::fs::read(&destination).unwrap(), body);
    }

    #[tokio::test]
    async fn test_truncated_body_leaves_no_file() {
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 100000\r\n\r\n"
                .to_vec();
        response.extend_from_slice(b"%PDF-1.4 partial");
        let base = serve_once(response, Duration::ZERO).await;

        let dir = tempfile::tempdir().unwrap();
        let destination = paper_destination(dir.path());
        let fetcher = HttpFetcher::new(5, DEFAULT_MAX_DOWNLOAD_BYTES).unwrap();

        let result = fetcher
            .fetch(&format!("{}/paper.pdf", base), &destination)
            .await;

        assert!(result.is_err());
        assert!(!destination.exists());
        assert!(destination.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_oversized_body_leaves_no_file() {
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nConnection: close\r\n\r\n"
                .to_vec();
        response.extend_from_slice(&[b'x'; 4096]);
        let base = serve_once(response, Duration::ZERO).await;

        let dir = tempfile::tempdir().unwrap();
        let destination = paper_destination(dir.path());
        let fetcher = HttpFetcher::new(5, 1024).unwrap();

        let result = fetcher
            .fetch(&format!("{}/big.pdf", base), &destination)
            .await;

        assert!(matches!(result, Err(Error::DownloadTooLarge { max_size: 1024, .. })));
        assert!(!destination.exists());
    }
}
