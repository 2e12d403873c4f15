use crate::config::SinkConfig;
use crate::sink::traits::{BulkFailure, BulkOutcome, BulkSink, ClusterHealth, IndexStats, SinkError};
use crate::synth::Record;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, SinkError>;

/// Elasticsearch over HTTP.
#[derive(Debug, Clone)]
pub struct ElasticSink {
    base_url: String,
    index: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: usize,
    retry_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterInfo {
    pub cluster_name: String,
    pub version: VersionInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub number: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl ElasticSink {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let url = config.url.as_deref().map(str::trim).unwrap_or_default();
        if url.is_empty() {
            return Err(SinkError::Config(
                "no store URL configured; set sink.url or ELASTICSEARCH_URL".to_string(),
            ));
        }
        let base_url = if url.starts_with("http://") || url.starts_with("https://") {
            url.trim_end_matches('/').to_string()
        } else {
            decode_cloud_id(url)?
        };

        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                SinkError::Config(
                    "no API key configured; set sink.api_key or ELASTIC_API_KEY".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url,
            index: config.index.clone(),
            api_key: api_key.to_string(),
            client,
            max_retries: config.max_retries,
            retry_interval: config.retry_interval,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Cluster name and version. Used as the startup connectivity check.
    pub async fn info(&self) -> Result<ClusterInfo> {
        let response = self
            .with_retry(|| self.request(Method::GET, "/").send())
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("ApiKey {}", self.api_key))
    }

    fn bulk_body(&self, records: &[Record]) -> Result<String> {
        let action = serde_json::to_string(&serde_json::json!({ "index": { "_index": self.index } }))?;
        let mut body = String::with_capacity(records.len() * 320);
        for record in records {
            body.push_str(&action);
            body.push('\n');
            body.push_str(&record.to_json_line()?);
            body.push('\n');
        }
        Ok(body)
    }

    /// Retry timeouts and connection failures with exponential backoff, up to `max_retries`
    /// times after the first attempt. Anything else is returned straight away.
    async fn with_retry<F, Fut>(&self, mut operation: F) -> Result<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut backoff = self.retry_interval;

        loop {
            match operation().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    attempts += 1;
                    if attempts > self.max_retries {
                        tracing::error!(attempts, error = %e, "Max retries exceeded");
                        return Err(SinkError::MaxRetriesExceeded {
                            attempts,
                            last_error: e.to_string(),
                        });
                    }

                    tracing::warn!(
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );

                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, Duration::from_secs(60));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl BulkSink for ElasticSink {
    async fn submit(&self, records: &[Record]) -> Result<BulkOutcome> {
        if records.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let body = self.bulk_body(records)?;

        let response = self
            .with_retry(|| {
                self.request(Method::POST, "/_bulk")
                    .header("Content-Type", "application/x-ndjson")
                    .body(body.clone())
                    .send()
            })
            .await?;
        let response: BulkResponse = check_status(response).await?.json().await?;

        Ok(parse_bulk_items(records.len(), response))
    }

    async fn health(&self) -> Result<ClusterHealth> {
        let response = self
            .with_retry(|| self.request(Method::GET, "/_cluster/health?timeout=30s").send())
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .with_retry(|| self.request(Method::HEAD, &format!("/{name}")).send())
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(SinkError::Status {
                status: status.as_u16(),
                message: format!("HEAD /{name}"),
            }),
        }
    }

    async fn stats(&self, name: &str) -> Result<IndexStats> {
        let response = self
            .with_retry(|| self.request(Method::GET, &format!("/{name}/_stats")).send())
            .await?;
        let stats: Value = check_status(response).await?.json().await?;

        let primaries = &stats["_all"]["primaries"];
        Ok(IndexStats {
            doc_count: primaries["docs"]["count"].as_u64().unwrap_or(0),
            size_bytes: primaries["store"]["size_in_bytes"].as_u64().unwrap_or(0),
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(SinkError::Status {
        status: response.status().as_u16(),
        message: response.text().await.unwrap_or_default(),
    })
}

/// Turn `name:base64(host$es_uuid$kibana_uuid)` into the deployment's Elasticsearch URL.
fn decode_cloud_id(cloud_id: &str) -> Result<String> {
    let malformed = |detail: &str| SinkError::Config(format!("malformed Cloud ID: {detail}"));

    let encoded = cloud_id.split_once(':').map_or(cloud_id, |(_, rest)| rest);
    let decoded = BASE64
        .decode(encoded.trim())
        .map_err(|e| malformed(&e.to_string()))?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed("payload is not UTF-8"))?;

    let mut parts = decoded.trim_end_matches('$').split('$');
    let host = parts.next().unwrap_or_default();
    let es_uuid = parts.next().unwrap_or_default();
    if host.is_empty() || es_uuid.is_empty() {
        return Err(malformed("expected host$es_uuid"));
    }

    Ok(match host.split_once(':') {
        Some((host, port)) => format!("https://{es_uuid}.{host}:{port}"),
        None => format!("https://{es_uuid}.{host}"),
    })
}

/// Split a bulk response into successes and per-document failures.
fn parse_bulk_items(submitted: usize, response: BulkResponse) -> BulkOutcome {
    if !response.errors {
        return BulkOutcome::all_succeeded(submitted);
    }

    let mut failures = Vec::new();
    for (position, item) in response.items.iter().enumerate() {
        let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
            continue;
        };
        let status = result["status"].as_u64().unwrap_or(0) as u16;
        if let Some(error) = result.get("error") {
            let reason = match (error["type"].as_str(), error["reason"].as_str()) {
                (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
                _ => error.to_string(),
            };
            failures.push(BulkFailure {
                position,
                status,
                reason,
            });
        }
    }

    BulkOutcome {
        succeeded: submitted.saturating_sub(failures.len()),
        failures,
    }
}
