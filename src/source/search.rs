//! Academic paper search through the Semantic Scholar Graph API

use crate::error::{Error, Result};
use crate::source::download::USER_AGENT;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;
pub const MIN_RESULTS: u32 = 1;
pub const MAX_RESULTS: u32 = 20;

const SEARCH_FIELDS: &str = "title,authors,year,venue,openAccessPdf";
const LISTED_AUTHORS: usize = 3;

/// One search hit, flattened for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperSummary {
    pub title: String,
    /// First three authors, `et al.` appended when there are more
    pub authors: String,
    pub year: String,
    pub venue: String,
    pub pdf_url: String,
}

/// Capability to search for papers
#[async_trait]
pub trait PaperSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<PaperSummary>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RawPaper>,
}

#[derive(Debug, Deserialize)]
struct RawPaper {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<RawAuthor>,
    year: Option<i64>,
    venue: Option<String>,
    #[serde(rename = "openAccessPdf")]
    open_access_pdf: Option<RawPdf>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPdf {
    url: Option<String>,
}

/// Clamp a requested result count into the API's accepted range
pub fn clamp_max_results(max_results: u32) -> u32 {
    max_results.clamp(MIN_RESULTS, MAX_RESULTS)
}

fn summarize(paper: RawPaper) -> PaperSummary {
    let names: Vec<String> = paper
        .authors
        .iter()
        .take(LISTED_AUTHORS)
        .map(|a| a.name.clone().unwrap_or_default())
        .collect();
    let mut authors = names.join(", ");
    if paper.authors.len() > LISTED_AUTHORS {
        authors.push_str(" et al.");
    }

    PaperSummary {
        title: paper.title.unwrap_or_else(|| "Unknown".to_string()),
        authors,
        year: paper.year.map(|y| y.to_string()).unwrap_or_default(),
        venue: paper.venue.unwrap_or_default(),
        pdf_url: paper
            .open_access_pdf
            .and_then(|pdf| pdf.url)
            .unwrap_or_default(),
    }
}

/// Map a raw API response body to summaries
pub fn parse_search_response(body: &str) -> Result<Vec<PaperSummary>> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response.data.into_iter().map(summarize).collect())
}

/// [`PaperSearch`] against the Semantic Scholar API
#[derive(Debug, Clone)]
pub struct SemanticScholarClient {
    client: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl SemanticScholarClient {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::HttpRequest)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl PaperSearch for SemanticScholarClient {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<PaperSummary>> {
        let limit = clamp_max_results(max_results);
        tracing::info!(query, limit, "searching papers");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("query", query.to_string()),
                ("limit", limit.to_string()),
                ("fields", SEARCH_FIELDS.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        url: self.endpoint.clone(),
                        secs: self.timeout_secs,
                    }
                } else {
                    Error::HttpRequest(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let body = response.text().await?;
        parse_search_response(&body).map_err(|e| Error::Search {
            reason: format!("unexpected response: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clamp_max_results() {
        assert_eq!(clamp_max_results(0), 1);
        assert_eq!(clamp_max_results(5), 5);
        assert_eq!(clamp_max_results(20), 20);
        assert_eq!(clamp_max_results(500), 20);
    }

    #[test]
    fn test_parse_full_entry() {
        let body = r#"{
            "total": 1,
            "data": [{
                "paperId": "abc",
                "title": "Attention Is All You Need",
                "authors": [
                    {"authorId": "1", "name": "Ashish Vaswani"},
                    {"authorId": "2", "name": "Noam Shazeer"},
                    {"authorId": "3", "name": "Niki Parmar"},
                    {"authorId": "4", "name": "Jakob Uszkoreit"}
                ],
                "year": 2017,
                "venue": "NeurIPS",
                "openAccessPdf": {"url": "https://arxiv.org/pdf/1706.03762.pdf", "status": "GREEN"}
            }]
        }"#;

        let results = parse_search_response(body).unwrap();
        assert_eq!(
            results,
            vec![PaperSummary {
                title: "Attention Is All You Need".to_string(),
                authors: "Ashish Vaswani, Noam Shazeer, Niki Parmar et al.".to_string(),
                year: "2017".to_string(),
                venue: "NeurIPS".to_string(),
                pdf_url: "https://arxiv.org/pdf/1706.03762.pdf".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_sparse_entry() {
        let body = r#"{"data": [{"title": null, "authors": [{"name": "Solo"}], "year": null, "venue": "", "openAccessPdf": null}]}"#;

        let results = parse_search_response(body).unwrap();
        assert_eq!(results[0].title, "Unknown");
        assert_eq!(results[0].authors, "Solo");
        assert_eq!(results[0].year, "");
        assert_eq!(results[0].venue, "");
        assert_eq!(results[0].pdf_url, "");
    }

    #[test]
    fn test_parse_no_data() {
        assert!(parse_search_response(r#"{"total": 0}"#).unwrap().is_empty());
        assert!(parse_search_response("not json").is_err());
    }
}
