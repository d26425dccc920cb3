//! Upstream gateway client with mirror affinity and bounded retries.
//!
//! All upstream traffic is read-only HTTPS GETs against one of several
//! equivalent mirror base URLs, authenticated with a subscription-key
//! header. The client:
//!
//! - validates and de-duplicates the mirror list (URLs carrying credentials,
//!   a query string, or a fragment are rejected at construction),
//! - remembers one process-wide preferred mirror, set on first success and
//!   tried first on later calls,
//! - retries a network error or 5xx once on the same mirror before moving
//!   to the next one; 4xx responses never retry and short-circuit,
//! - parses `Cache-Control: max-age=N` into a TTL for the result cache.
//!
//! The HTTP layer sits behind the [`Transport`] trait so tests can drive the
//! retry and affinity logic with a scripted transport.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{SkillError, SkillResult};

/// How many characters of a malformed body to keep for diagnostics.
const BODY_PREVIEW_CHARS: usize = 200;

/// What a transport hands back before any interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub cache_control: Option<String>,
}

/// Minimal HTTP seam. Implementations return `Err` only for network-level
/// failures (DNS, connect, timeout); any received response is `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<RawResponse, String>;
}

/// reqwest-backed transport used outside tests.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<RawResponse, String> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let cache_control = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| e.to_string())?;

        Ok(RawResponse {
            status,
            body,
            cache_control,
        })
    }
}

/// A successfully fetched and parsed upstream response.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub json: Value,
    /// TTL from `Cache-Control: max-age`, when present and valid.
    pub cache_max_age: Option<u64>,
    /// The mirror that answered.
    pub base_url: String,
}

pub struct GatewayClient {
    transport: Arc<dyn Transport>,
    base_urls: Vec<String>,
    subscription_key: String,
    timeout: Duration,
    /// Process-wide mirror affinity. Atomic replace, last write wins;
    /// staleness costs at most one extra fallback pass.
    preferred: RwLock<Option<String>>,
}

impl GatewayClient {
    pub fn new(
        config: &GatewayConfig,
        subscription_key: String,
        transport: Arc<dyn Transport>,
    ) -> SkillResult<Self> {
        let base_urls = normalize_base_urls(&config.base_urls)?;
        Ok(Self {
            transport,
            base_urls,
            subscription_key,
            timeout: Duration::from_millis(config.timeout_ms),
            preferred: RwLock::new(None),
        })
    }

    /// Candidate mirrors: the preferred one first (when set), then the rest
    /// in configured order.
    fn candidate_order(&self) -> Vec<String> {
        let preferred = self
            .preferred
            .read()
            .ok()
            .and_then(|guard| guard.clone());

        match preferred {
            Some(first) => {
                let mut order = vec![first.clone()];
                order.extend(self.base_urls.iter().filter(|u| **u != first).cloned());
                order
            }
            None => self.base_urls.clone(),
        }
    }

    fn remember_preferred(&self, base_url: &str) {
        if let Ok(mut guard) = self.preferred.write() {
            *guard = Some(base_url.to_string());
        }
    }

    /// Issue an authenticated GET for `path` with `query`, walking the
    /// mirror list with per-mirror retry.
    pub async fn fetch_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SkillResult<GatewayResponse> {
        let headers = vec![(
            "Ocp-Apim-Subscription-Key".to_string(),
            self.subscription_key.clone(),
        )];

        let mut last_err: Option<SkillError> = None;

        for base_url in self.candidate_order() {
            let url = build_url(&base_url, path, query)?;

            for attempt in 1..=2u32 {
                debug!(mirror = %base_url, attempt, path, "gateway request");

                let raw = match self.transport.get(&url, &headers, self.timeout).await {
                    Ok(raw) => raw,
                    Err(network_err) => {
                        last_err = Some(SkillError::unreachable("Upstream unreachable").with_details(
                            json!({
                                "baseUrl": base_url,
                                "attempt": attempt,
                                "error": network_err,
                            }),
                        ));
                        continue; // retry the same mirror once
                    }
                };

                if (200..300).contains(&raw.status) {
                    match serde_json::from_str::<Value>(&raw.body) {
                        Ok(parsed) => {
                            self.remember_preferred(&base_url);
                            return Ok(GatewayResponse {
                                status: raw.status,
                                json: parsed,
                                cache_max_age: parse_max_age(raw.cache_control.as_deref()),
                                base_url,
                            });
                        }
                        Err(_) => {
                            // 2xx but unparseable: not retryable on this
                            // mirror, try the next one.
                            last_err = Some(
                                SkillError::invalid_response("Upstream returned a malformed body")
                                    .with_status(raw.status)
                                    .with_details(json!({
                                        "baseUrl": base_url,
                                        "attempt": attempt,
                                        "bodyPreview": preview(&raw.body),
                                    })),
                            );
                            break;
                        }
                    }
                }

                if raw.status >= 500 {
                    let err = if serde_json::from_str::<Value>(&raw.body).is_ok() {
                        SkillError::http_error(
                            format!("Upstream error (HTTP {})", raw.status),
                            raw.status,
                        )
                    } else {
                        SkillError::invalid_response("Upstream returned a malformed error body")
                            .with_status(raw.status)
                    };
                    last_err = Some(err.with_details(json!({
                        "baseUrl": base_url,
                        "attempt": attempt,
                        "bodyPreview": preview(&raw.body),
                    })));
                    continue; // retry the same mirror once, then fall through
                }

                // 4xx: caller-side problem, no retry anywhere.
                return Err(SkillError::http_error(
                    format!("Upstream rejected the request (HTTP {})", raw.status),
                    raw.status,
                )
                .with_details(json!({
                    "baseUrl": base_url,
                    "attempt": attempt,
                    "bodyPreview": preview(&raw.body),
                })));
            }
        }

        Err(last_err
            .unwrap_or_else(|| SkillError::unreachable("No upstream mirrors configured")))
    }
}

/// Validate, canonicalize, and de-duplicate mirror base URLs.
///
/// URLs with embedded credentials, a query string, or a fragment are
/// rejected: a misconfigured mirror must not be able to smuggle extra
/// request components into every call.
pub fn normalize_base_urls(urls: &[String]) -> SkillResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();

    for raw in urls {
        let parsed = Url::parse(raw.trim())
            .map_err(|e| SkillError::invalid_input(format!("Invalid base URL '{}': {}", raw, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SkillError::invalid_input(format!(
                "Base URL '{}' must use http or https",
                raw
            )));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(SkillError::invalid_input(format!(
                "Base URL '{}' must not contain credentials",
                raw
            )));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(SkillError::invalid_input(format!(
                "Base URL '{}' must not contain a query string or fragment",
                raw
            )));
        }

        let canonical = parsed.to_string().trim_end_matches('/').to_string();
        if !normalized.contains(&canonical) {
            normalized.push(canonical);
        }
    }

    if normalized.is_empty() {
        return Err(SkillError::invalid_input("No usable base URLs configured"));
    }

    Ok(normalized)
}

fn build_url(base_url: &str, path: &str, query: &[(&str, String)]) -> SkillResult<String> {
    let joined = format!("{}/{}", base_url, path.trim_start_matches('/'));
    let mut url = Url::parse(&joined)
        .map_err(|e| SkillError::invalid_input(format!("Invalid request path '{}': {}", path, e)))?;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url.to_string())
}

/// Extract the first `max-age` directive from a `Cache-Control` header.
/// Missing or invalid values mean "do not cache".
pub fn parse_max_age(cache_control: Option<&str>) -> Option<u64> {
    let header = cache_control?;
    for directive in header.split(',') {
        let directive = directive.trim().to_ascii_lowercase();
        if let Some(value) = directive.strip_prefix("max-age=") {
            return value.trim().parse::<u64>().ok();
        }
    }
    None
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
