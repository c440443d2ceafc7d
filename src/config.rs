//! Runtime configuration.
//!
//! A [`ScraperConfig`] is read once at startup from an optional YAML file
//! (see [`ScraperConfig::load`]) and handed to each component by reference.
//! Every field has a default, so a config file only needs the keys it
//! overrides:
//!
//! ```yaml
//! cache_capacity: 500
//! fetch:
//!   max_retries: 5
//!   skip_domains: ["www.indopos.co.id"]
//! news:
//!   keywords: ["ekonomi", "politik"]
//!   sources:
//!     - category: Media Berita Umum
//!       urls: ["https://www.kompas.com/"]
//! ```

use crate::error::ConfigError;
use crate::models::{CompanySource, CompanySourceKind, Source};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{info, instrument};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Maximum number of fingerprints held by the deduplication cache.
    pub cache_capacity: usize,
    pub fetch: FetchConfig,
    pub news: NewsConfig,
    pub companies: CompanyConfig,
}

/// A named set of request headers; one is picked at random per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeaderProfile {
    pub name: String,
    pub headers: BTreeMap<String, String>,
}

/// HTTP retrieval settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    pub header_profiles: Vec<HeaderProfile>,
    /// Host -> headers merged over the chosen profile.
    pub site_headers: HashMap<String, BTreeMap<String, String>>,
    /// Hosts that are never requested.
    pub skip_domains: Vec<String>,
    pub max_retries: u32,
    pub base_retry_delay_secs: f64,
    pub max_retry_delay_secs: f64,
    pub request_timeout_secs: f64,
    /// Several directory hosts serve broken certificate chains.
    pub accept_invalid_certs: bool,
}

/// Article pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NewsConfig {
    pub sources: Vec<Source>,
    /// An article is kept only if its title or description mentions one of these.
    pub keywords: Vec<String>,
    /// Pause after each listing fetch.
    pub rate_limit_delay_secs: f64,
}

/// Company pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompanyConfig {
    pub sources: Vec<CompanySource>,
    /// Region label written into the batch metadata.
    pub location: String,
    /// Lower-case locality token used to spot address lines.
    pub address_hint: String,
    pub default_address: String,
    pub rate_limit_delay_secs: f64,
}

/// Exponential backoff with multiplicative jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Un-jittered delay after the given zero-based failed attempt:
    /// `min(base * 2^attempt, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// [`backoff`](Self::backoff) scaled by a random factor in `[0.5, 1.5]`.
    pub fn jittered(&self, attempt: u32) -> Duration {
        let factor: f64 = rand::rng().random_range(0.5..=1.5);
        self.backoff(attempt).mul_f64(factor)
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs_f64(self.base_retry_delay_secs),
            max_delay: Duration::from_secs_f64(self.max_retry_delay_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }
}

impl NewsConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_delay_secs)
    }
}

impl CompanyConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_delay_secs)
    }
}

impl ScraperConfig {
    /// Load from a YAML file, or fall back to the built-in defaults when no
    /// path is given. The result is validated before it is returned.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_string(),
                    source,
                })?;
                let config: ScraperConfig =
                    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                        path: path.to_string(),
                        source,
                    })?;
                info!(path, "Loaded configuration file");
                config
            }
            None => {
                info!("No config file given; using built-in defaults");
                ScraperConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fetch = &self.fetch;
        if fetch.max_retries == 0 {
            return Err(ConfigError::Invalid("fetch.max_retries must be at least 1".into()));
        }
        for (name, value) in [
            ("fetch.base_retry_delay_secs", fetch.base_retry_delay_secs),
            ("fetch.max_retry_delay_secs", fetch.max_retry_delay_secs),
            ("news.rate_limit_delay_secs", self.news.rate_limit_delay_secs),
            ("companies.rate_limit_delay_secs", self.companies.rate_limit_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be a non-negative number")));
            }
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::Invalid(format!("{name} is too large")));
            }
        }
        // Jitter can stretch the capped delay by half again.
        if Duration::try_from_secs_f64(fetch.max_retry_delay_secs * 1.5).is_err() {
            return Err(ConfigError::Invalid("fetch.max_retry_delay_secs is too large".into()));
        }
        if fetch.base_retry_delay_secs > fetch.max_retry_delay_secs {
            return Err(ConfigError::Invalid(
                "fetch.base_retry_delay_secs exceeds fetch.max_retry_delay_secs".into(),
            ));
        }
        if !fetch.request_timeout_secs.is_finite() || fetch.request_timeout_secs <= 0.0 {
            return Err(ConfigError::Invalid("fetch.request_timeout_secs must be positive".into()));
        }
        if Duration::try_from_secs_f64(fetch.request_timeout_secs).is_err() {
            return Err(ConfigError::Invalid("fetch.request_timeout_secs is too large".into()));
        }
        Ok(())
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            fetch: FetchConfig::default(),
            news: NewsConfig::default(),
            companies: CompanyConfig::default(),
        }
    }
}

fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for FetchConfig {
    fn default() -> Self {
        let desktop = headers(&[
            (
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
            ("Accept-Language", "id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Cache-Control", "max-age=0"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
        ]);
        let mobile = headers(&[
            (
                "User-Agent",
                "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
            ),
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
            ("Accept-Language", "id-ID,id;q=0.9,en-US;q=0.8"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
        ]);
        let tribun = headers(&[
            (
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
            ),
            ("Accept-Language", "en-US,en;q=0.9,id;q=0.8"),
            ("DNT", "1"),
            (
                "Sec-Ch-Ua",
                "\"Not A(Brand\";v=\"99\", \"Google Chrome\";v=\"121\", \"Chromium\";v=\"121\"",
            ),
            ("Sec-Ch-Ua-Mobile", "?0"),
            ("Sec-Ch-Ua-Platform", "\"Windows\""),
            ("Referer", "https://www.google.com/"),
            ("Origin", "https://www.google.com"),
        ]);

        Self {
            header_profiles: vec![
                HeaderProfile {
                    name: "desktop".to_string(),
                    headers: desktop,
                },
                HeaderProfile {
                    name: "mobile".to_string(),
                    headers: mobile,
                },
            ],
            site_headers: HashMap::from([("www.tribunnews.com".to_string(), tribun)]),
            skip_domains: strings(&["www.indopos.co.id", "www.pontianakpost.com"]),
            max_retries: 3,
            base_retry_delay_secs: 10.0,
            max_retry_delay_secs: 60.0,
            request_timeout_secs: 30.0,
            accept_invalid_certs: true,
        }
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        let sources = vec![
            Source {
                category: "Media Berita Umum".to_string(),
                urls: strings(&[
                    "https://www.jpnn.com/",
                    "https://www.detik.com/",
                    "https://www.kompas.com/",
                    "https://www.tribunnews.com/",
                    "https://www.tempo.co/",
                    "https://www.liputan6.com/",
                    "https://www.viva.co.id/",
                    "https://www.republika.co.id/",
                    "https://www.merdeka.com/",
                    "https://www.suara.com/",
                    "https://www.thejakartapost.com/",
                    "https://www.sindonews.com/",
                    "https://www.indopos.co.id/",
                    "https://www.kumparan.com/",
                    "https://news.detik.com/",
                    "https://www.bantennews.co.id/",
                    "https://www.medcom.id/",
                    "https://www.pikiran-rakyat.com/",
                    "https://www.suaramerdeka.com/",
                    "https://www.riau24.com/",
                    "https://www.pontianakpost.com/",
                ]),
            },
            Source {
                category: "Media Olahraga".to_string(),
                urls: strings(&[
                    "https://www.bola.com/",
                    "https://sport.tempo.co/",
                    "https://www.indosport.com/",
                    "https://olahraga.kompas.com/",
                    "https://www.goal.com/id",
                    "https://www.liputan6.com/bola",
                    "https://www.viva.co.id/bola",
                    "https://www.bolanet.com/",
                    "https://www.skor.id/",
                    "https://sport.detik.com/",
                    "https://www.bolasport.com/",
                    "https://www.ligaolahraga.com/",
                ]),
            },
            Source {
                category: "Media Bisnis dan Keuangan".to_string(),
                urls: strings(&[
                    "https://www.bisnis.com/",
                    "https://www.kontan.co.id/",
                    "https://finansial.bisnis.com/",
                    "https://investor.id/",
                    "https://money.id/",
                    "https://ekonomi.kompas.com/",
                    "https://bisnis.tempo.co/",
                    "https://www.swa.co.id/",
                    "https://www.marketeers.com/",
                    "https://www.cermati.com/",
                    "https://www.global.co.id/",
                ]),
            },
        ];

        Self {
            sources,
            keywords: strings(&[
                "politik",
                "ekonomi",
                "bisnis",
                "teknologi",
                "pendidikan",
                "kesehatan",
                "olahraga",
                "kriminal",
                "korupsi",
                "pemilu",
                "bencana",
            ]),
            rate_limit_delay_secs: 15.0,
        }
    }
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                CompanySource {
                    name: "YellowPages".to_string(),
                    kind: CompanySourceKind::Directory,
                    urls: strings(&["https://www.yellowpages.co.id/search/bekasi/"]),
                },
                CompanySource {
                    name: "Job Sites".to_string(),
                    kind: CompanySourceKind::JobBoard,
                    urls: strings(&[
                        "https://www.indeed.co.id/jobs?q=&l=Bekasi%2C+Jawa+Barat",
                        "https://www.jobstreet.co.id/jobs/in-bekasi",
                        "https://www.karir.com/lowongan-kerja/bekasi",
                        "https://www.jobs.id/lowongan-kerja/bekasi",
                        "https://glints.com/id/lowongan-kerja/bekasi",
                    ]),
                },
            ],
            location: "Kabupaten Bekasi, Jawa Barat".to_string(),
            address_hint: "bekasi".to_string(),
            default_address: "Bekasi, Jawa Barat".to_string(),
            rate_limit_delay_secs: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base: u64, max: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(base),
            max_delay: Duration::from_secs(max),
        }
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let p = policy(10, 60);
        let delays: Vec<u64> = (0..5).map(|a| p.backoff(a).as_secs()).collect();
        assert_eq!(delays, vec![10, 20, 40, 60, 60]);
    }

    #[test]
    fn test_backoff_saturates_on_large_attempts() {
        let p = policy(10, 60);
        assert_eq!(p.backoff(200), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_half_and_one_and_a_half() {
        let p = policy(10, 60);
        for attempt in 0..4 {
            let base = p.backoff(attempt);
            for _ in 0..50 {
                let d = p.jittered(attempt);
                assert!(d >= base.mul_f64(0.5) && d <= base.mul_f64(1.5), "{d:?} vs {base:?}");
            }
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ScraperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.retry_policy().base_delay, Duration::from_secs(10));
        assert_eq!(config.news.sources.len(), 3);
        assert!(config.news.keywords.contains(&"ekonomi".to_string()));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
cache_capacity: 5
fetch:
  max_retries: 4
news:
  keywords: ["banjir"]
"#;
        let config: ScraperConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cache_capacity, 5);
        assert_eq!(config.fetch.max_retries, 4);
        assert_eq!(config.fetch.request_timeout_secs, 30.0);
        assert_eq!(config.news.keywords, vec!["banjir".to_string()]);
        assert!(!config.news.sources.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = ScraperConfig::default();
        config.fetch.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut config = ScraperConfig::default();
        config.fetch.base_retry_delay_secs = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_durations() {
        let mut config = ScraperConfig::default();
        config.fetch.request_timeout_secs = 1e20;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ScraperConfig::default();
        config.fetch.max_retry_delay_secs = u64::MAX as f64;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ScraperConfig::default();
        config.news.rate_limit_delay_secs = 1e30;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_accepts_large_but_bounded_delays() {
        let mut config = ScraperConfig::default();
        config.fetch.max_retry_delay_secs = 86_400.0;
        config.fetch.request_timeout_secs = 3_600.0;
        assert!(config.validate().is_ok());
        let delay = config.fetch.retry_policy().jittered(20);
        assert!(delay <= Duration::from_secs(129_600));
    }

    #[test]
    fn test_load_missing_file_reports_read_error() {
        let err = ScraperConfig::load(Some("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
