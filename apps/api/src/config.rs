use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    /// Stage cache is disabled when unset.
    pub redis_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub pdf_renderer_bin: String,
    pub report_stylesheet: PathBuf,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            redis_url: optional_env("REDIS_URL"),
            cache_ttl_secs: match optional_env("CACHE_TTL_SECS") {
                Some(v) => v
                    .parse::<u64>()
                    .context("CACHE_TTL_SECS must be a number of seconds")?,
                None => DEFAULT_CACHE_TTL_SECS,
            },
            pdf_renderer_bin: optional_env("PDF_RENDERER_BIN")
                .unwrap_or_else(|| "weasyprint".to_string()),
            report_stylesheet: optional_env("REPORT_STYLESHEET")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("assets/styles.css")),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Treats empty values the same as unset ones.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
