// src/config/mod.rs
//! Service configuration: TOML file (optional) + environment overrides.
//!
//! Resolution order for the file:
//! 1) $CATALOG_CONFIG_PATH (must exist)
//! 2) config/catalog.toml
//! 3) built-in defaults
//!
//! Environment variables are applied on top of whichever of these was used.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "CATALOG_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/catalog.toml";

const DEFAULT_TTL_SECS: u64 = 6 * 3600;
const DEFAULT_MAP_REFRESH_DELAY_SECS: u64 = 15;
const DEFAULT_MAP_REFRESH_EVERY_SECS: u64 = 600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

pub const PRIMER_URL: &str =
    "https://raw.githubusercontent.com/donnemartin/system-design-primer/master/README.md";
pub const SECRET_KNOWLEDGE_URL: &str =
    "https://raw.githubusercontent.com/trimstray/the-book-of-secret-knowledge/master/README.md";
pub const DEVTO_BASE_URL: &str = "https://dev.to";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    pub primer_url: String,
    pub secret_knowledge_url: String,
    pub devto_base_url: String,
    pub devto_tags: Vec<String>,
    pub devto_per_page: u32,
    pub devto_top_days: u32,
    /// Pause after each tag listing; the API rate-limits aggressively.
    pub devto_pause_ms: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            primer_url: PRIMER_URL.to_string(),
            secret_knowledge_url: SECRET_KNOWLEDGE_URL.to_string(),
            devto_base_url: DEVTO_BASE_URL.to_string(),
            devto_tags: vec![
                "architecture".to_string(),
                "systemdesign".to_string(),
                "designpatterns".to_string(),
            ],
            devto_per_page: 10,
            devto_top_days: 7,
            devto_pause_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub lessons_file: PathBuf,
    pub secret_lessons_file: PathBuf,
    pub cache_ttl_secs: u64,
    /// Defaults to the cache TTL when absent.
    pub background_refresh_secs: Option<u64>,
    pub catalog_refresh_delay_secs: u64,
    pub catalog_refresh_every_secs: u64,
    pub http_timeout_secs: u64,
    pub bind_addr: String,
    /// Gate triggered refreshes so at most one runs at a time.
    pub single_flight: bool,
    pub sources: SourcesConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            lessons_file: PathBuf::from("data/lessons.json"),
            secret_lessons_file: PathBuf::from("data/secret_knowledge_lessons.json"),
            cache_ttl_secs: DEFAULT_TTL_SECS,
            background_refresh_secs: None,
            catalog_refresh_delay_secs: DEFAULT_MAP_REFRESH_DELAY_SECS,
            catalog_refresh_every_secs: DEFAULT_MAP_REFRESH_EVERY_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            bind_addr: "0.0.0.0:8081".to_string(),
            single_flight: false,
            sources: SourcesConfig::default(),
        }
    }
}

impl CatalogConfig {
    /// Env path, then default path, then defaults; env overrides applied last.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from_file(&default)?
            } else {
                Self::default()
            }
        };

        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: CatalogConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config toml {}", path.display()))?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_nonempty("LESSONS_FILE") {
            self.lessons_file = PathBuf::from(v);
        }
        if let Some(v) = env_nonempty("SECRET_LESSONS_FILE") {
            self.secret_lessons_file = PathBuf::from(v);
        }
        if let Some(v) = env_u64("LESSON_FETCH_TTL_SECS") {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = env_u64("LESSON_MAP_REFRESH_DELAY_SECS") {
            self.catalog_refresh_delay_secs = v;
        }
        if let Some(v) = env_u64("LESSON_MAP_REFRESH_EVERY_SECS") {
            self.catalog_refresh_every_secs = v;
        }
        if let Some(v) = env_u64("HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = v;
        }
        if let Some(v) = env_nonempty("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = env_nonempty("LESSON_REFRESH_SINGLE_FLIGHT") {
            self.single_flight = v == "1" || v.eq_ignore_ascii_case("true");
        }
    }

    /// Zero durations would spin the schedulers; fall back to defaults.
    fn sanitize(&mut self) {
        if self.cache_ttl_secs == 0 {
            self.cache_ttl_secs = DEFAULT_TTL_SECS;
        }
        if self.background_refresh_secs == Some(0) {
            self.background_refresh_secs = None;
        }
        if self.catalog_refresh_every_secs == 0 {
            self.catalog_refresh_every_secs = DEFAULT_MAP_REFRESH_EVERY_SECS;
        }
        if self.http_timeout_secs == 0 {
            self.http_timeout_secs = DEFAULT_HTTP_TIMEOUT_SECS;
        }
        self.sources.devto_tags.retain(|t| !t.trim().is_empty());
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_refresh_secs.unwrap_or(self.cache_ttl_secs))
    }

    pub fn catalog_refresh_delay(&self) -> Duration {
        Duration::from_secs(self.catalog_refresh_delay_secs)
    }

    pub fn catalog_refresh_every(&self) -> Duration {
        Duration::from_secs(self.catalog_refresh_every_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_nonempty(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: CatalogConfig = toml::from_str(
            r#"
cache_ttl_secs = 60
[sources]
devto_tags = ["rust"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.background_interval(), Duration::from_secs(60));
        assert_eq!(cfg.sources.devto_tags, vec!["rust".to_string()]);
        assert_eq!(cfg.sources.devto_per_page, 10);
        assert_eq!(cfg.sources.primer_url, PRIMER_URL);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8081");
    }

    #[test]
    fn sanitize_replaces_zero_durations() {
        let mut cfg = CatalogConfig {
            cache_ttl_secs: 0,
            background_refresh_secs: Some(0),
            catalog_refresh_every_secs: 0,
            http_timeout_secs: 0,
            ..Default::default()
        };
        cfg.sources.devto_tags = vec![" ".into(), "go".into()];
        cfg.sanitize();
        assert_eq!(cfg.cache_ttl_secs, DEFAULT_TTL_SECS);
        assert_eq!(cfg.background_refresh_secs, None);
        assert_eq!(cfg.catalog_refresh_every_secs, DEFAULT_MAP_REFRESH_EVERY_SECS);
        assert_eq!(cfg.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
        assert_eq!(cfg.sources.devto_tags, vec!["go".to_string()]);
    }
}
