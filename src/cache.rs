//! Short-lived in-memory result cache.
//!
//! Keys are canonical: the `{action, args}` pair serialized with every
//! object's keys sorted recursively, so two calls that differ only in JSON
//! key order share an entry. TTLs come from the upstream `Cache-Control`
//! max-age, clamped to a configured ceiling. Expiry is lazy — entries are
//! checked on read and evicted then, there is no background sweeper.

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tracing::debug;

use crate::error::{ErrorCode, SkillError, SkillResult};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at_ms: i64,
    ttl_seconds: u64,
}

/// A fetch result annotated with cache provenance.
#[derive(Debug, Clone)]
pub struct Cached {
    pub value: Value,
    /// True when the value was served from the cache.
    pub cached: bool,
    /// TTL under which the value was (or would be) stored; `None` when the
    /// upstream sent no max-age and the value was not cached.
    pub ttl_seconds: Option<u64>,
}

/// Process-wide result cache, shared across concurrent queries.
pub struct ResultCache {
    entries: Mutex<HashMap<String, Entry>>,
    max_ttl_seconds: u64,
}

impl ResultCache {
    pub fn new(max_ttl_seconds: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_ttl_seconds,
        }
    }

    /// Serve from cache, or run `fetch` and store the result. A fetch that
    /// fails with `upstream_unreachable` is retried once end to end before
    /// the error surfaces; all other failures surface immediately and are
    /// never cached.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        action: &str,
        args: &Map<String, Value>,
        fetch: F,
    ) -> SkillResult<Cached>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = SkillResult<(Value, Option<u64>)>>,
    {
        let key = cache_key(action, args);
        let now_ms = Utc::now().timestamp_millis();

        {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            match entries.get(&key) {
                Some(entry) if entry.expires_at_ms > now_ms => {
                    debug!(action = %action, "cache hit");
                    return Ok(Cached {
                        value: entry.value.clone(),
                        cached: true,
                        ttl_seconds: Some(entry.ttl_seconds),
                    });
                }
                Some(_) => {
                    entries.remove(&key);
                }
                None => {}
            }
        }

        let (value, max_age) = match fetch().await {
            Ok(result) => result,
            Err(err) if err.code == ErrorCode::UpstreamUnreachable => {
                debug!(action = %action, "fetch unreachable, retrying once");
                fetch().await?
            }
            Err(err) => return Err(err),
        };

        // No max-age from upstream means the response is not cacheable.
        let ttl_seconds = max_age.map(|age| age.min(self.max_ttl_seconds));

        if let Some(ttl) = ttl_seconds.filter(|ttl| *ttl > 0) {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.insert(
                key,
                Entry {
                    value: value.clone(),
                    expires_at_ms: now_ms + (ttl as i64) * 1000,
                    ttl_seconds: ttl,
                },
            );
        }

        Ok(Cached {
            value,
            cached: false,
            ttl_seconds,
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Canonical key: action plus args with all object keys sorted recursively.
pub fn cache_key(action: &str, args: &Map<String, Value>) -> String {
    let canonical = canonicalize(&Value::Object(args.clone()));
    format!("{}:{}", action, canonical)
}

fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonicalize(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_key_ignores_json_key_order() {
        let a = args(json!({"from": "ASD", "to": "UT", "nested": {"b": 1, "a": 2}}));
        let b = args(json!({"to": "UT", "nested": {"a": 2, "b": 1}, "from": "ASD"}));
        assert_eq!(cache_key("trips.search", &a), cache_key("trips.search", &b));
    }

    #[test]
    fn test_key_distinguishes_actions_and_values() {
        let a = args(json!({"station": "ASD"}));
        assert_ne!(
            cache_key("departures.list", &a),
            cache_key("arrivals.list", &a)
        );
        let b = args(json!({"station": "UT"}));
        assert_ne!(
            cache_key("departures.list", &a),
            cache_key("departures.list", &b)
        );
    }

    #[tokio::test]
    async fn test_second_identical_call_served_from_cache() {
        let cache = ResultCache::new(300);
        let calls = AtomicUsize::new(0);
        let request = args(json!({"station": "ASD"}));

        for expected_cached in [false, true] {
            let result = cache
                .get_or_fetch("departures.list", &request, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok((json!({"departures": []}), Some(60)))
                })
                .await
                .unwrap();
            assert_eq!(result.cached, expected_cached);
            assert_eq!(result.ttl_seconds, Some(60));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ttl_clamped_to_ceiling() {
        let cache = ResultCache::new(300);
        let request = args(json!({}));
        let result = cache
            .get_or_fetch("disruptions.list", &request, || async {
                Ok((json!([]), Some(86400)))
            })
            .await
            .unwrap();
        assert_eq!(result.ttl_seconds, Some(300));
    }

    #[tokio::test]
    async fn test_unreachable_retried_once_then_surfaces() {
        let cache = ResultCache::new(300);
        let calls = AtomicUsize::new(0);
        let request = args(json!({"station": "ASD"}));

        let err = cache
            .get_or_fetch("departures.list", &request, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(Value, Option<u64>), _>(SkillError::unreachable("no route")) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::UpstreamUnreachable);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_client_errors_not_retried_or_cached() {
        let cache = ResultCache::new(300);
        let calls = AtomicUsize::new(0);
        let request = args(json!({"id": "x"}));

        let err = cache
            .get_or_fetch("disruptions.detail", &request, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(Value, Option<u64>), _>(SkillError::http_error("not found", 404))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::UpstreamHttpError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_missing_max_age_not_cached() {
        let cache = ResultCache::new(300);
        let calls = AtomicUsize::new(0);
        let request = args(json!({"query": "utrecht"}));

        for _ in 0..2 {
            let result = cache
                .get_or_fetch("stations.search", &request, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok((json!({"stations": []}), None))
                })
                .await
                .unwrap();
            assert!(!result.cached);
            assert_eq!(result.ttl_seconds, None);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 0);
    }
}
