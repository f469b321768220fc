use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Red
    pub bind_addr: String,
    pub http_timeout_secs: u64,
    pub invidious_instances: Vec<String>,

    // Paths
    pub data_dir: PathBuf,

    // Caché
    pub request_cache_size: usize,
    pub comment_cache_size: usize,
    pub comment_page_size: usize,

    // Historial y recomendaciones
    pub tag_cooldown_secs: u64,
    pub recommendation_terms: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Red
            bind_addr: std::env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8000".to_string()),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,
            invidious_instances: std::env::var("INVIDIOUS_INSTANCES")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().trim_end_matches('/').to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| default_instances()),

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),

            // Caché
            request_cache_size: std::env::var("REQUEST_CACHE_SIZE")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()?,
            comment_cache_size: std::env::var("COMMENT_CACHE_SIZE")
                .unwrap_or_else(|_| "256".to_string())
                .parse()?,
            comment_page_size: std::env::var("COMMENT_PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            // Historial (1 hora de enfriamiento por defecto)
            tag_cooldown_secs: std::env::var("TAG_COOLDOWN_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,
            recommendation_terms: std::env::var("RECOMMENDATION_TERMS")
                .unwrap_or_else(|_| "9".to_string())
                .parse()?,
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// Catches zero-sized caches and empty instance lists early, before the
    /// server starts taking requests with a configuration that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.request_cache_size == 0 {
            anyhow::bail!("Request cache size must be greater than 0");
        }

        if self.comment_cache_size == 0 {
            anyhow::bail!("Comment cache size must be greater than 0");
        }

        if self.comment_page_size == 0 {
            anyhow::bail!("Comment page size must be greater than 0");
        }

        if self.recommendation_terms == 0 {
            anyhow::bail!("Recommendation term count must be greater than 0");
        }

        if self.invidious_instances.is_empty() {
            anyhow::bail!("At least one Invidious instance is required");
        }

        for instance in &self.invidious_instances {
            let parsed = url::Url::parse(instance)
                .map_err(|_| anyhow::anyhow!("Malformed Invidious instance URL: {instance}"))?;

            if parsed.host_str().is_none() {
                anyhow::bail!("Invidious instance URL has no host: {instance}");
            }
        }

        if self.http_timeout_secs == 0 {
            anyhow::bail!("HTTP timeout must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Server: {} ({} Invidious instances)\n  \
            Data: {}\n  \
            Cache: {} requests, {} comment pages of {}\n  \
            History: {}s tag cooldown, {} recommendation terms",
            self.bind_addr,
            self.invidious_instances.len(),
            self.data_dir.display(),
            self.request_cache_size,
            self.comment_cache_size,
            self.comment_page_size,
            self.tag_cooldown_secs,
            self.recommendation_terms,
        )
    }
}

/// Instancias públicas de Invidious usadas si no se configuran otras
fn default_instances() -> Vec<String> {
    vec![
        "https://yewtu.be".to_string(),
        "https://inv.nadeko.net".to_string(),
        "https://invidious.nerdvpn.de".to_string(),
        "https://invidious.protokolla.fi".to_string(),
        "https://invidious.privacydev.net".to_string(),
        "https://vid.puffyan.us".to_string(),
    ]
}

/// Default configuration values, used as fallbacks in tests.
impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            http_timeout_secs: 15,
            invidious_instances: default_instances(),
            data_dir: "./data".into(),
            request_cache_size: 1024,
            comment_cache_size: 256,
            comment_page_size: 20,
            tag_cooldown_secs: 3600,
            recommendation_terms: 9,
        }
    }
}
