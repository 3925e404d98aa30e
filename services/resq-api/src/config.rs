//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys are never stored in the TOML: they come from `GROQ_API_KEY`,
//! the numbered `GROQ_API_KEY1..=N` fallbacks, and an optional keys file.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var holding the primary completion API key.
pub const PRIMARY_KEY_VAR: &str = "GROQ_API_KEY";

/// Env var holding the optional caption endpoint token.
pub const CAPTION_TOKEN_VAR: &str = "HF_API_TOKEN";

const DEFAULT_CONFIG_FILE: &str = "resq-api.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub completion: CompletionConfig,
    pub caption: CaptionConfig,
    /// Resolved by `resolve_secrets`, never read from TOML
    #[serde(skip)]
    pub api_keys: Vec<Secret<String>>,
    #[serde(skip)]
    pub caption_token: Option<Secret<String>>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

/// Completion API settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Upper bound on numbered fallback keys probed from the environment
    pub max_fallback_keys: usize,
    /// File with one API key per line, appended after the env keys
    pub api_keys_file: Option<PathBuf>,
}

/// Image captioning endpoint settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub endpoint: String,
    pub max_new_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_connections: 1000,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: completion::client::DEFAULT_BASE_URL.into(),
            model: completion::client::DEFAULT_MODEL.into(),
            temperature: 0.3,
            timeout_secs: 60,
            max_fallback_keys: 32,
            api_keys_file: None,
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::caption::DEFAULT_ENDPOINT.into(),
            max_new_tokens: 30,
            timeout_secs: 60,
        }
    }
}

impl CompletionConfig {
    pub fn settings(&self) -> completion::CompletionSettings {
        completion::CompletionSettings {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl CaptionConfig {
    pub fn settings(&self) -> crate::caption::CaptionSettings {
        crate::caption::CaptionSettings {
            endpoint: self.endpoint.clone(),
            max_new_tokens: self.max_new_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    ///
    /// Secrets are resolved separately by `resolve_secrets`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load `path` if it exists; fall back to defaults only when the path
    /// was not chosen explicitly.
    pub fn load_or_default(path: &Path, explicit: bool) -> common::Result<Self> {
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml(contents: &str) -> common::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        for (field, url) in [
            ("completion.base_url", &self.completion.base_url),
            ("caption.endpoint", &self.caption.endpoint),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{field} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.completion.timeout_secs == 0 || self.caption.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.caption.max_new_tokens == 0 {
            return Err(common::Error::Config(
                "max_new_tokens must be greater than 0".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(common::Error::Config(format!(
                "temperature must be between 0 and 2, got: {}",
                self.completion.temperature
            )));
        }

        Ok(())
    }

    /// Fill in API keys and the caption token from the process environment.
    pub fn resolve_secrets(&mut self) -> common::Result<()> {
        self.resolve_secrets_with(|name| std::env::var(name).ok())
    }

    /// Same as `resolve_secrets` with an injectable env lookup.
    pub fn resolve_secrets_with<F>(&mut self, lookup: F) -> common::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut keys = env_keys(&lookup, self.completion.max_fallback_keys);
        if let Some(path) = &self.completion.api_keys_file {
            keys.extend(file_keys(path)?);
        }
        self.api_keys = keys;
        self.caption_token = lookup(CAPTION_TOKEN_VAR).and_then(|t| Secret::from_trimmed(&t));
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag says whether the path was chosen explicitly.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }
}

/// `GROQ_API_KEY`, then `GROQ_API_KEY1..=max`, stopping at the first gap.
fn env_keys<F>(lookup: &F, max_fallback: usize) -> Vec<Secret<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut keys = Vec::new();
    if let Some(key) = lookup(PRIMARY_KEY_VAR).and_then(|k| Secret::from_trimmed(&k)) {
        tracing::info!(var = PRIMARY_KEY_VAR, "loaded API key");
        keys.push(key);
    }
    for i in 1..=max_fallback {
        let var = format!("{PRIMARY_KEY_VAR}{i}");
        match lookup(&var).and_then(|k| Secret::from_trimmed(&k)) {
            Some(key) => {
                tracing::info!(var = %var, "loaded API key");
                keys.push(key);
            }
            None => break,
        }
    }
    keys
}

/// One key per line; blank lines and `#` comments are skipped.
fn file_keys(path: &Path) -> common::Result<Vec<Secret<String>>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!(
            "failed to read api_keys_file {}: {e}",
            path.display()
        ))
    })?;
    Ok(contents
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(Secret::from_trimmed)
        .collect())
}
