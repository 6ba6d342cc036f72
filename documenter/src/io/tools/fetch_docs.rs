//! `fetchMermaidDocumentation`: pull a syntax page from the Mermaid docs site.

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::{Tool, ToolContext, ToolError, parse_args};
use crate::io::config::DocsConfig;

/// Bodies beyond this many bytes are truncated.
pub const MAX_DOC_BYTES: usize = 200 * 1024;

/// A fetched documentation page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDoc {
    pub content: String,
    pub truncated: bool,
}

/// HTTP GET boundary for documentation pages.
pub trait DocFetcher {
    /// Fetch `url`; non-2xx responses are errors.
    fn fetch(&self, url: &str) -> Result<FetchedDoc>;

    /// Site root that page paths are appended to.
    fn base_url(&self) -> &str;
}

/// Blocking reqwest fetcher.
#[derive(Debug, Clone)]
pub struct HttpDocFetcher {
    base_url: String,
    timeout: Duration,
}

impl HttpDocFetcher {
    pub fn new(config: &DocsConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl DocFetcher for HttpDocFetcher {
    #[instrument(skip(self))]
    fn fetch(&self, url: &str) -> Result<FetchedDoc> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("build http client")?;
        let response = client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} returned HTTP {}", status.as_u16()));
        }
        let mut body = Vec::new();
        response
            .take(MAX_DOC_BYTES as u64 + 1)
            .read_to_end(&mut body)
            .with_context(|| format!("read body of {url}"))?;
        let truncated = body.len() > MAX_DOC_BYTES;
        body.truncate(MAX_DOC_BYTES);
        debug!(bytes = body.len(), truncated, "fetched documentation");
        Ok(FetchedDoc {
            content: String::from_utf8_lossy(&body).into_owned(),
            truncated,
        })
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
struct Args {
    #[serde(default)]
    topic: Option<String>,
}

pub struct FetchMermaidDocumentation {
    fetcher: Box<dyn DocFetcher>,
}

impl FetchMermaidDocumentation {
    pub fn new(fetcher: Box<dyn DocFetcher>) -> Self {
        Self { fetcher }
    }
}

/// Page URL for `topic`, or the syntax index when no topic is given.
pub fn topic_url(base: &str, topic: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    match topic.map(str::trim).filter(|t| !t.is_empty()) {
        Some(topic) => format!(
            "{base}/config/diagrams-and-syntaxes/{}.html",
            topic.to_lowercase()
        ),
        None => index_url(base),
    }
}

fn index_url(base: &str) -> String {
    format!("{}/config/diagrams-and-syntaxes.html", base.trim_end_matches('/'))
}

impl Tool for FetchMermaidDocumentation {
    fn name(&self) -> &'static str {
        "fetchMermaidDocumentation"
    }

    fn description(&self) -> &'static str {
        "Fetch Mermaid syntax documentation for a diagram type (e.g. flowchart, sequenceDiagram, entityRelationshipDiagram)."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string", "description": "Diagram type page to fetch" },
                "version": { "type": "string", "description": "Mermaid version (informational)" }
            }
        })
    }

    fn invoke(&self, args: &Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let args: Args = parse_args(&self.schema(), args)?;
        let base = self.fetcher.base_url();
        let url = topic_url(base, args.topic.as_deref());

        let (url, doc) = match self.fetcher.fetch(&url) {
            Ok(doc) => (url, doc),
            Err(err) if args.topic.is_some() => {
                warn!(url = %url, error = %err, "topic page unavailable, falling back to index");
                let index = index_url(base);
                let doc = self
                    .fetcher
                    .fetch(&index)
                    .map_err(|err| ToolError::Http(format!("{err:#}")))?;
                (index, doc)
            }
            Err(err) => return Err(ToolError::Http(format!("{err:#}"))),
        };

        Ok(json!({
            "url": url,
            "content": doc.content,
            "truncated": doc.truncated,
        }))
    }
}
