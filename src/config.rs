//! Relay configuration. Built-in defaults, an optional TOML file and
//! `ECG_RELAY_*` environment variables are layered with the `config` crate;
//! the upstream API key is read separately and handed to the client at
//! construction time.

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// The inference endpoint requests are forwarded to
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/responses";

/// Vision-capable model used for interpretation
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Output-size cap sent with every upstream request
pub const MAX_OUTPUT_TOKENS: u32 = 700;

/// Inbound body limit. Base64 images blow past actix's 256 KiB default
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Environment variable holding the upstream bearer token
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Prefix for environment overrides, e.g. `ECG_RELAY_PORT`
pub const ENV_PREFIX: &str = "ECG_RELAY";

/// Default `tracing` filter when `RUST_LOG` is not set
pub const DEFAULT_LOG: &str = "info,actix_web=info";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    /// Upstream URL
    pub endpoint: String,
    pub model: String,
    pub max_output_tokens: u32,

    /// Deadline for the whole upstream call. Unset means wait for as long as
    /// the upstream takes
    pub upstream_timeout_secs: Option<u64>,

    pub max_body_bytes: usize,

    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "0.0.0.0".to_string(),
            port: 8080,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: MAX_OUTPUT_TOKENS,
            upstream_timeout_secs: None,
            max_body_bytes: MAX_BODY_BYTES,
            log: DEFAULT_LOG.to_string(),
        }
    }
}

impl Settings {
    /// Load settings, reading `file` (if given) before the environment
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_secs.map(Duration::from_secs)
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

/// The bearer token for the upstream, if one is configured. An empty value
/// counts as missing.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_VAR).ok().filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_upstream_contract() {
        let settings = Settings::default();
        assert_eq!(settings.endpoint, "https://api.openai.com/v1/responses");
        assert_eq!(settings.model, "gpt-4o-mini");
        assert_eq!(settings.max_output_tokens, 700);
        assert_eq!(settings.upstream_timeout(), None);
        assert_eq!(settings.log, DEFAULT_LOG);
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("ecg-relay-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "port = 9999\nmodel = \"gpt-4o\"\nupstream_timeout_secs = 30").unwrap();

        let settings = Settings::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.port, 9999);
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.upstream_timeout(), Some(Duration::from_secs(30)));
        // untouched keys keep their defaults
        assert_eq!(settings.max_output_tokens, MAX_OUTPUT_TOKENS);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Settings::load(Some("/nonexistent/ecg-relay.toml")).is_err());
    }
}
