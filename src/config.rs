use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::fetcher::FetchConstraints;
use crate::validator::UrlValidationPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub ollama_base_url: String,
    pub coder_model: String,
    pub page_model: String,
    pub fetch_timeout: Duration,
    pub fetch_max_bytes: u64,
    /// Accept `localhost` / `127.0.0.1` targets on `/url`. Meant for local development.
    pub allow_localhost: bool,
    /// Send only the condensed `<body>` of a fetched page to the model.
    pub prompt_body_only: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, applying defaults for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("PORT").unwrap_or_else(|| "8081".to_string());
        let port = port
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::Config(format!("Invalid host address: {}", e)))?;

        let ollama_base_url = lookup("OLLAMA_BASE_URL")
            .unwrap_or_else(|| "http://localhost:11434".to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&ollama_base_url)
            .map_err(|e| AppError::Config(format!("Invalid OLLAMA_BASE_URL: {}", e)))?;

        let fetch_timeout_ms = parse_or(&lookup, "FETCH_TIMEOUT_MS", 10_000u64)?;
        let fetch_max_bytes = parse_or(&lookup, "FETCH_MAX_BYTES", 15 * 1024 * 1024u64)?;

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            ollama_base_url,
            coder_model: lookup("CODER_MODEL").unwrap_or_else(|| "deepseek-coder".to_string()),
            page_model: lookup("PAGE_MODEL").unwrap_or_else(|| "llama3:latest".to_string()),
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            fetch_max_bytes,
            allow_localhost: parse_flag(&lookup, "ALLOW_LOCALHOST")?,
            prompt_body_only: parse_flag(&lookup, "PROMPT_BODY_ONLY")?,
        })
    }

    pub fn url_policy(&self) -> UrlValidationPolicy {
        UrlValidationPolicy {
            allow_localhost: self.allow_localhost,
            ..UrlValidationPolicy::default()
        }
    }

    pub fn fetch_constraints(&self) -> FetchConstraints {
        FetchConstraints {
            timeout: self.fetch_timeout,
            max_bytes: self.fetch_max_bytes,
            url_policy: self.url_policy(),
            ..FetchConstraints::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => Err(AppError::Config(format!("Invalid {}: {}", key, v))),
    }
}
