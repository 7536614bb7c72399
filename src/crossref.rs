//! Crossref API client for DOI title lookup.
//!
//! Used to check which side of a DOI conflict is right: the registered
//! title of each DOI is fetched and compared with the titles the two
//! corpora carry for the entry.

use crate::error::{MergeError, Result};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Crossref API base URL
const CROSSREF_API_URL: &str = "https://api.crossref.org/works";

/// Polite pool email for Crossref API
const MAILTO: &str = "corpusmerge@example.com";

/// Pause before the single retry of a failed request
const RETRY_PAUSE: Duration = Duration::from_secs(2);

/// Outcome of a title lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleLookup {
    /// DOI is registered and has at least one title
    Found(String),
    /// DOI resolved but the record carries no usable title
    NoTitle,
    /// Non-success HTTP status, e.g. 404 for an unregistered DOI
    Status(u16),
    /// Request failed twice; the DOI's status is unknown
    Unavailable,
}

impl TitleLookup {
    pub fn title(&self) -> Option<&str> {
        match self {
            TitleLookup::Found(title) => Some(title),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, TitleLookup::Unavailable)
    }
}

/// Crossref API client with concurrency control
pub struct CrossrefClient {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    base_url: String,
}

impl CrossrefClient {
    /// Create a new CrossrefClient
    ///
    /// # Arguments
    ///
    /// * `max_workers` - Maximum concurrent requests
    pub fn new(max_workers: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("corpusmerge/{} (mailto:{})", env!("CARGO_PKG_VERSION"), MAILTO))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MergeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            base_url: CROSSREF_API_URL.to_string(),
        })
    }

    /// Point the client at another works endpoint (mirrors, local proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Look up the registered title of `doi`.
    ///
    /// A connection failure or timeout is retried once after a short pause.
    pub async fn title_for_doi(&self, doi: &str) -> TitleLookup {
        let doi = trim_doi(doi);
        if doi.is_empty() {
            return TitleLookup::NoTitle;
        }

        let Ok(_permit) = self.semaphore.acquire().await else {
            return TitleLookup::Unavailable;
        };

        for attempt in 0..2 {
            match self.do_lookup(doi).await {
                Ok(outcome) => return outcome,
                Err(MergeError::Network(e)) if attempt == 0 && (e.is_connect() || e.is_timeout()) => {
                    warn!(doi = doi, error = %e, "Crossref request failed, retrying");
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(e) => {
                    debug!(doi = doi, attempt = attempt + 1, error = %e, "Lookup failed");
                    return TitleLookup::Unavailable;
                }
            }
        }

        TitleLookup::Unavailable
    }

    /// Internal lookup implementation
    async fn do_lookup(&self, doi: &str) -> Result<TitleLookup> {
        let url = format!("{}/{}", self.base_url, doi);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            debug!(doi = doi, status = status.as_u16(), "Crossref returned error status");
            return Ok(TitleLookup::Status(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(parse_work_title(&body))
    }

    /// Look up several DOIs concurrently.
    ///
    /// Returns one outcome per input, in input order.
    pub async fn titles_for_dois(&self, dois: &[String]) -> Vec<TitleLookup> {
        info!(count = dois.len(), "Starting batch Crossref lookup");

        let futures: Vec<_> = dois.iter().map(|doi| self.title_for_doi(doi)).collect();
        let results = join_all(futures).await;

        let found = results.iter().filter(|r| r.title().is_some()).count();
        info!(total = dois.len(), found = found, "Batch lookup complete");

        results
    }
}

// === Crossref API Response Types ===

#[derive(Debug, Deserialize)]
struct WorkResponse {
    message: WorkMessage,
}

#[derive(Debug, Deserialize)]
struct WorkMessage {
    #[serde(default)]
    title: Vec<String>,
}

/// Title from a `/works/{doi}` response body; a body that does not parse
/// or carries an empty title list counts as untitled.
fn parse_work_title(body: &str) -> TitleLookup {
    match serde_json::from_str::<WorkResponse>(body) {
        Ok(work) => work
            .message
            .title
            .into_iter()
            .next()
            .map(TitleLookup::Found)
            .unwrap_or(TitleLookup::NoTitle),
        Err(_) => TitleLookup::NoTitle,
    }
}

/// Strip trailing punctuation picked up from surrounding text.
pub fn trim_doi(doi: &str) -> &str {
    doi.trim().trim_end_matches(|c: char| !c.is_alphanumeric())
}

/// Heuristic title equality.
///
/// Case-insensitive edit distance must stay below the length gap plus a
/// tenth of the shorter title. Very short titles with a large length gap
/// never match.
pub fn titles_similar(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let gap = len_a.abs_diff(len_b);
    if (len_a < 6 || len_b < 6) && gap > 6 {
        return false;
    }
    let distance = strsim::levenshtein(&a.to_lowercase(), &b.to_lowercase());
    (distance as f64) < gap as f64 + 0.1 * len_a.min(len_b) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_doi() {
        assert_eq!(trim_doi("10.1000/xyz123)."), "10.1000/xyz123");
        assert_eq!(trim_doi(" 10.1000/abc "), "10.1000/abc");
        assert_eq!(trim_doi("...."), "");
    }

    #[test]
    fn test_parse_work_title() {
        let body = r#"{"status":"ok","message":{"DOI":"10.1/a","title":["Deep Sea Vents","Alt"]}}"#;
        assert_eq!(parse_work_title(body), TitleLookup::Found("Deep Sea Vents".to_string()));

        let untitled = r#"{"status":"ok","message":{"DOI":"10.1/a","title":[]}}"#;
        assert_eq!(parse_work_title(untitled), TitleLookup::NoTitle);
        assert_eq!(parse_work_title("Resource not found."), TitleLookup::NoTitle);
    }

    #[test]
    fn test_titles_similar() {
        assert!(titles_similar(
            "Hydrothermal vents of the deep sea",
            "Hydrothermal Vents of the Deep Sea."
        ));
        assert!(!titles_similar(
            "Hydrothermal vents of the deep sea",
            "A survey of graph databases"
        ));
        assert!(!titles_similar("Note", "Notes on an unrelated topic entirely"));
        assert!(!titles_similar("", "Anything"));
    }

    /// Answer exactly one HTTP request with `response`, then close.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/works", addr)
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable_after_retry() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("free port");
        let client = CrossrefClient::new(1)
            .expect("client")
            .with_base_url(format!("http://{}/works/", addr));

        let started = std::time::Instant::now();
        assert_eq!(client.title_for_doi("10.1/a").await, TitleLookup::Unavailable);
        // the single retry waits once before giving up
        assert!(started.elapsed() >= RETRY_PAUSE);
    }

    #[tokio::test]
    async fn test_error_status_and_title_responses() {
        let not_found = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let client = CrossrefClient::new(1).expect("client").with_base_url(not_found);
        assert_eq!(client.title_for_doi("10.1/missing").await, TitleLookup::Status(404));

        let found = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 36\r\nConnection: close\r\n\r\n{\"message\":{\"title\":[\"Reef Study\"]}}",
        )
        .await;
        let client = CrossrefClient::new(1).expect("client").with_base_url(found);
        assert_eq!(
            client.title_for_doi("10.1/reef.").await,
            TitleLookup::Found("Reef Study".to_string())
        );
    }

    #[test]
    fn test_lookup_accessors() {
        assert_eq!(TitleLookup::Found("T".into()).title(), Some("T"));
        assert_eq!(TitleLookup::Status(404).title(), None);
        assert!(TitleLookup::Unavailable.is_unavailable());
    }
}
