//! HTTP retrieval with retry, backoff and header rotation.
//!
//! # Retry Strategy
//!
//! Each call makes at most `max_retries` requests. Between attempts the task
//! sleeps for
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) * uniform(0.5, 1.5)
//! ```
//!
//! except after a 429 carrying `Retry-After`, where the server's value is used.
//!
//! | Outcome | Action |
//! |---------|--------|
//! | 200 | body text returned; decode failures are terminal |
//! | 403 | host cookies cleared, retried |
//! | 429 | `Retry-After` honoured, retried |
//! | >= 500 | retried |
//! | other status | terminal [`FetchError::HttpStatus`] |
//! | connect error / timeout | retried |
//!
//! Sleeps and in-flight requests are abandoned as soon as the shutdown token
//! fires.

use crate::config::{FetchConfig, HeaderProfile, RetryPolicy};
use crate::error::FetchError;
use crate::utils::truncate_for_log;
use rand::seq::IndexedRandom;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER, SET_COOKIE};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Per-host cookie jar that can be cleared one host at a time.
#[derive(Debug, Default)]
pub struct SessionStore {
    cookies: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl SessionStore {
    fn jar(&self) -> MutexGuard<'_, HashMap<String, BTreeMap<String, String>>> {
        self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store every `Set-Cookie` pair from a response to `host`.
    pub fn record(&self, host: &str, headers: &HeaderMap) {
        let mut jar = self.jar();
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else { continue };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let cookies = jar.entry(host.to_string()).or_default();
            if value.trim().is_empty() {
                cookies.remove(name);
            } else {
                cookies.insert(name.to_string(), value.trim().to_string());
            }
        }
    }

    /// `Cookie` header value for `host`, if any cookies are held.
    pub fn cookie_header(&self, host: &str) -> Option<String> {
        let jar = self.jar();
        let cookies = jar.get(host).filter(|c| !c.is_empty())?;
        Some(
            cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Drop all cookies for `host`; returns how many were removed.
    pub fn clear_domain(&self, host: &str) -> usize {
        self.jar().remove(host).map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear_all(&self) {
        self.jar().clear();
    }
}

enum Attempt {
    Success(String),
    Retry {
        error: FetchError,
        wait: Option<Duration>,
    },
    Fail(FetchError),
}

/// Shared HTTP client for all fetch tasks.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    profiles: Vec<HeaderProfile>,
    site_headers: HashMap<String, BTreeMap<String, String>>,
    skip_domains: HashSet<String>,
    retry: RetryPolicy,
    sessions: SessionStore,
    shutdown: CancellationToken,
}

impl Fetcher {
    /// Build the client. Failure here is fatal for the whole run.
    pub fn new(config: &FetchConfig, shutdown: CancellationToken) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self {
            client,
            profiles: config.header_profiles.clone(),
            site_headers: config.site_headers.clone(),
            skip_domains: config.skip_domains.iter().cloned().collect(),
            retry: config.retry_policy(),
            sessions: SessionStore::default(),
            shutdown,
        })
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Fetch `url` and return the body text.
    ///
    /// Each attempt picks a random header profile, applies per-host
    /// overrides and replays the host's session cookies. Retryable outcomes
    /// (transport errors, 403, 429, 5xx) back off and try again until
    /// `max_retries` requests have been made.
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute `http(s)` URL of the page
    ///
    /// # Returns
    ///
    /// The decoded body on a 200, or a [`FetchError`]: `Skipped` for hosts on
    /// the skip list, `HttpStatus` for non-retryable statuses, `Decode` when
    /// a 200 body cannot be read, `ExhaustedRetries` once the attempt budget
    /// is spent, and `Cancelled` after shutdown.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();

        if self.skip_domains.contains(&host) {
            warn!(%url, domain = %host, "Skipping domain on skip list");
            return Err(FetchError::Skipped {
                url: url.to_string(),
                domain: host,
            });
        }

        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            if self.shutdown.is_cancelled() {
                return Err(FetchError::Cancelled {
                    url: url.to_string(),
                });
            }

            match self.attempt(url, &parsed, &host).await {
                Attempt::Success(body) => {
                    info!(
                        %url,
                        attempt = attempt + 1,
                        bytes = body.len(),
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        "Fetched page"
                    );
                    debug!(preview = %truncate_for_log(&body, 200), "Body preview");
                    return Ok(body);
                }
                Attempt::Fail(err) => {
                    warn!(%url, status = ?err.status(), error = %err, "Fetch failed");
                    return Err(err);
                }
                Attempt::Retry { error: err, wait } => {
                    attempt += 1;
                    if attempt >= self.retry.max_retries {
                        error!(
                            %url,
                            attempt,
                            max = self.retry.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis(),
                            error = %err,
                            "Fetch exhausted retries"
                        );
                        return Err(FetchError::ExhaustedRetries {
                            url: url.to_string(),
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }

                    let delay = wait.unwrap_or_else(|| self.retry.jittered(attempt - 1));
                    warn!(
                        %url,
                        attempt,
                        max = self.retry.max_retries,
                        status = ?err.status(),
                        ?delay,
                        error = %err,
                        "Fetch attempt failed; backing off"
                    );
                    self.pause(url, delay).await?;
                }
            }
        }
    }

    /// Sleep for `delay` unless shutdown is requested first.
    pub async fn pause(&self, url: &str, delay: Duration) -> Result<(), FetchError> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(FetchError::Cancelled { url: url.to_string() }),
            _ = sleep(delay) => Ok(()),
        }
    }

    async fn attempt(&self, url: &str, parsed: &Url, host: &str) -> Attempt {
        let mut request = self.client.get(parsed.clone()).headers(self.headers_for(host));
        if let Some(cookie) = self.sessions.cookie_header(host) {
            request = request.header(COOKIE, cookie);
        }

        let sent = tokio::select! {
            _ = self.shutdown.cancelled() => {
                return Attempt::Fail(FetchError::Cancelled { url: url.to_string() });
            }
            sent = request.send() => sent,
        };
        let response = match sent {
            Ok(response) => response,
            Err(source) => {
                return Attempt::Retry {
                    error: FetchError::Transport {
                        url: url.to_string(),
                        source,
                    },
                    wait: None,
                };
            }
        };

        self.sessions.record(host, response.headers());
        let status = response.status().as_u16();
        let http_error = || FetchError::HttpStatus {
            url: url.to_string(),
            status,
        };

        match status {
            200 => {
                let text = tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        return Attempt::Fail(FetchError::Cancelled { url: url.to_string() });
                    }
                    text = response.text() => text,
                };
                match text {
                    Ok(body) => Attempt::Success(body),
                    Err(source) if source.is_timeout() => Attempt::Retry {
                        error: FetchError::Transport {
                            url: url.to_string(),
                            source,
                        },
                        wait: None,
                    },
                    Err(source) => Attempt::Fail(FetchError::Decode {
                        url: url.to_string(),
                        source,
                    }),
                }
            }
            403 => {
                let cleared = self.sessions.clear_domain(host);
                warn!(%url, domain = %host, cleared, "Access forbidden; cleared session cookies");
                Attempt::Retry {
                    error: http_error(),
                    wait: None,
                }
            }
            429 => {
                let wait = retry_after(response.headers());
                warn!(%url, ?wait, "Rate limited");
                Attempt::Retry {
                    error: http_error(),
                    wait,
                }
            }
            s if s >= 500 => Attempt::Retry {
                error: http_error(),
                wait: None,
            },
            _ => Attempt::Fail(http_error()),
        }
    }

    /// A random profile with any per-host overrides merged on top. Header
    /// names are compared case-insensitively.
    fn headers_for(&self, host: &str) -> HeaderMap {
        let lowered = |headers: &BTreeMap<String, String>| {
            headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect::<Vec<_>>()
        };
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        if let Some(profile) = self.profiles.choose(&mut rand::rng()) {
            debug!(profile = %profile.name, "Selected header profile");
            merged.extend(lowered(&profile.headers));
        }
        if let Some(overrides) = self.site_headers.get(host) {
            merged.extend(lowered(overrides));
        }
        to_header_map(&merged)
    }

    /// Release pooled session state before exit.
    pub fn close(&self) {
        self.sessions.clear_all();
        info!("Fetcher closed; sessions cleared");
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "Ignoring invalid header in profile"),
        }
    }
    map
}

/// Whole-second `Retry-After` value, if present and numeric.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> FetchConfig {
        FetchConfig {
            max_retries: 3,
            base_retry_delay_secs: 0.001,
            max_retry_delay_secs: 0.005,
            request_timeout_secs: 5.0,
            skip_domains: vec!["blocked.example".to_string()],
            ..FetchConfig::default()
        }
    }

    fn fetcher(config: &FetchConfig) -> Fetcher {
        Fetcher::new(config, CancellationToken::new()).unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>halo</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetcher(&test_config())
            .fetch(&format!("{}/ok", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<html>halo</html>");
    }

    #[tokio::test]
    async fn test_not_found_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher(&test_config())
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher(&test_config())
            .fetch(&format!("{}/down", server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::ExhaustedRetries { attempts, ref last, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.status(), Some(503));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = fetcher(&test_config())
            .fetch(&format!("{}/flaky", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_rate_limit_honours_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .mount(&server)
            .await;

        let mut config = test_config();
        // A computed backoff this long would time the test out.
        config.base_retry_delay_secs = 30.0;
        config.max_retry_delay_secs = 30.0;
        let started = Instant::now();
        let body = fetcher(&config)
            .fetch(&format!("{}/busy", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "done");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_forbidden_clears_cookies_then_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc; Path=/"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/echo"))
            .and(header("cookie", "sid=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("with cookie"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/guarded"))
            .respond_with(ResponseTemplate::new(403))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/guarded"))
            .respond_with(ResponseTemplate::new(200).set_body_string("let in"))
            .mount(&server)
            .await;

        let f = fetcher(&test_config());
        f.fetch(&format!("{}/login", server.uri())).await.unwrap();
        assert_eq!(f.sessions.cookie_header("127.0.0.1").as_deref(), Some("sid=abc"));
        assert_eq!(
            f.fetch(&format!("{}/echo", server.uri())).await.unwrap(),
            "with cookie"
        );

        let body = f.fetch(&format!("{}/guarded", server.uri())).await.unwrap();
        assert_eq!(body, "let in");
        assert_eq!(f.sessions.cookie_header("127.0.0.1"), None);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let mut config = test_config();
        config.request_timeout_secs = 0.05;
        config.max_retries = 2;
        let err = fetcher(&config)
            .fetch(&format!("{}/slow", server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::ExhaustedRetries { attempts, last, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, FetchError::Transport { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_skip_list_makes_no_request() {
        let err = fetcher(&test_config())
            .fetch("https://blocked.example/news")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Skipped { ref domain, .. } if domain == "blocked.example"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        let f = Fetcher::new(&test_config(), token.clone()).unwrap();
        token.cancel();
        let err = f.fetch(&format!("{}/any", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = fetcher(&test_config()).fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_site_headers_override_profile() {
        let mut config = test_config();
        config.site_headers.insert(
            "www.example.co.id".to_string(),
            BTreeMap::from([("User-Agent".to_string(), "override-agent".to_string())]),
        );
        let f = fetcher(&config);
        let headers = f.headers_for("www.example.co.id");
        assert_eq!(headers.get("user-agent").unwrap(), "override-agent");
        assert!(headers.contains_key("accept-language"));

        let plain = f.headers_for("www.kompas.com");
        assert!(plain.get("user-agent").unwrap().to_str().unwrap().starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_site_headers_override_ignores_name_case() {
        let mut config = test_config();
        config.header_profiles = vec![HeaderProfile {
            name: "desktop".to_string(),
            headers: BTreeMap::from([
                ("User-Agent".to_string(), "profile-agent".to_string()),
                ("Accept-Language".to_string(), "id-ID".to_string()),
            ]),
        }];
        config.site_headers.insert(
            "www.tribunnews.com".to_string(),
            BTreeMap::from([("user-agent".to_string(), "site-agent".to_string())]),
        );
        let f = fetcher(&config);
        for _ in 0..5 {
            let headers = f.headers_for("www.tribunnews.com");
            let agents: Vec<_> = headers.get_all("user-agent").iter().collect();
            assert_eq!(agents, vec!["site-agent"]);
            assert_eq!(headers.get("accept-language").unwrap(), "id-ID");
        }
    }

    #[tokio::test]
    async fn test_undecodable_body_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_string("this is not gzip"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher(&test_config())
            .fetch(&format!("{}/broken", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }), "unexpected error: {err}");
    }

    #[test]
    fn test_session_store_record_and_clear() {
        let store = SessionStore::default();
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2; HttpOnly"));
        store.record("www.detik.com", &headers);
        store.record("www.kompas.com", &headers);

        assert_eq!(store.cookie_header("www.detik.com").as_deref(), Some("a=1; b=2"));
        assert_eq!(store.clear_domain("www.detik.com"), 2);
        assert_eq!(store.cookie_header("www.detik.com"), None);
        assert!(store.cookie_header("www.kompas.com").is_some());

        store.clear_all();
        assert_eq!(store.cookie_header("www.kompas.com"), None);
    }
}
