//! Target sampling.
//!
//! `Scraper` is the seam the explorer samples through; `HttpScraper` is the
//! production implementation that fetches a target's exposition over
//! HTTP/1.1 and counts the series left after the job's metric relabeling.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Uri};
use http_body_util::{BodyExt, Empty};
use tracing::debug;

use scrapegrid_core::{CompiledRule, ConfigResult, ScrapegridConfig, Target, compile_rules};

use crate::error::ScrapeError;
use crate::exposition::count_series;

const USER_AGENT: &str = "scrapegrid-explorer/0.1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sample a target once and report how many series it exposes.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, target: &Target) -> Result<i64, ScrapeError>;

    /// Pick up per-job settings from a newly loaded config.
    fn apply_config(&self, _config: &ScrapegridConfig) -> ConfigResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct JobSettings {
    timeout: Duration,
    metric_relabel: Arc<Vec<CompiledRule>>,
}

/// HTTP implementation of [`Scraper`]. Plain `http://` targets only.
#[derive(Debug, Default)]
pub struct HttpScraper {
    jobs: RwLock<HashMap<String, JobSettings>>,
}

impl HttpScraper {
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self, job: &str) -> JobSettings {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(job).cloned().unwrap_or_else(|| JobSettings {
            timeout: DEFAULT_TIMEOUT,
            metric_relabel: Arc::new(Vec::new()),
        })
    }

    async fn fetch(uri: &Uri) -> Result<Bytes, ScrapeError> {
        match uri.scheme_str() {
            Some("http") | None => {}
            Some(other) => return Err(ScrapeError::Unsupported(format!("scheme {other}"))),
        }
        let host = uri
            .host()
            .ok_or_else(|| ScrapeError::Unsupported(format!("{uri} has no host")))?;
        let port = uri.port_u16().unwrap_or(80);
        let authority = format!("{host}:{port}");

        let stream = tokio::net::TcpStream::connect(&authority)
            .await
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "scrape connection closed with error");
            }
        });

        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/metrics");
        let req = Request::builder()
            .uri(path)
            .header("host", authority.as_str())
            .header("user-agent", USER_AGENT)
            .header("accept", "text/plain;version=0.0.4")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status.as_u16()));
        }
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ScrapeError::Transport(e.to_string()))?
            .to_bytes();
        Ok(body)
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, target: &Target) -> Result<i64, ScrapeError> {
        let uri: Uri = target
            .url
            .parse()
            .map_err(|_| ScrapeError::Unsupported(target.url.clone()))?;
        let settings = self.settings(&target.job);

        let body = tokio::time::timeout(settings.timeout, Self::fetch(&uri))
            .await
            .map_err(|_| ScrapeError::Timeout)??;
        let text = String::from_utf8_lossy(&body);
        count_series(&text, &settings.metric_relabel)
    }

    fn apply_config(&self, config: &ScrapegridConfig) -> ConfigResult<()> {
        let mut next = HashMap::with_capacity(config.jobs.len());
        for job in &config.jobs {
            next.insert(
                job.name.clone(),
                JobSettings {
                    timeout: config.job_scrape_timeout(&job.name),
                    metric_relabel: Arc::new(compile_rules(&job.metric_relabel)?),
                },
            );
        }
        *self.jobs.write().unwrap_or_else(|e| e.into_inner()) = next;
        Ok(())
    }
}
