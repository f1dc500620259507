use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::tracker::RepoRef;

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// A required value is missing or empty.
    Missing(&'static str),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Missing(key) => write!(f, "{key} is required"),
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Missing(_) | Self::Validation(_) => None,
        }
    }
}

/// How the bot turns a request into an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// The model calls `create_issue` / `add_comment` tools directly.
    #[default]
    Tools,
    /// The model only classifies into create/refuse; the bot creates the issue.
    Classify,
}

impl Policy {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tools" => Ok(Policy::Tools),
            "classify" => Ok(Policy::Classify),
            other => Err(ConfigError::Validation(format!(
                "policy must be 'tools' or 'classify', got '{other}'"
            ))),
        }
    }
}

/// Raw values, either from a JSON file or the environment. Everything is
/// optional here; `Config::validate` decides what is required.
#[derive(Deserialize, Default)]
struct ConfigFile {
    discord_token: Option<String>,
    github_token: Option<String>,
    /// Repository as "owner/name"
    github_repo: Option<String>,
    openai_api_key: Option<String>,
    openai_model: Option<String>,
    openai_api_base: Option<String>,
    github_api_base: Option<String>,
    /// "tools" or "classify"
    policy: Option<String>,
    /// Directory for the file log. No file log when unset.
    log_dir: Option<String>,
}

impl ConfigFile {
    /// Override file values with environment variables that are set.
    fn overlay_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |current: Option<String>, key: &str| lookup(key).or(current);
        self.discord_token = pick(self.discord_token, "DISCORD_TOKEN");
        self.github_token = pick(self.github_token, "GITHUB_TOKEN");
        self.github_repo = pick(self.github_repo, "GITHUB_REPO");
        self.openai_api_key = pick(self.openai_api_key, "OPENAI_API_KEY");
        self.openai_model = pick(self.openai_model, "OPENAI_MODEL");
        self.openai_api_base = pick(self.openai_api_base, "OPENAI_API_BASE");
        self.github_api_base = pick(self.github_api_base, "GITHUB_API_BASE");
        self.policy = pick(self.policy, "ISSUEBOT_POLICY");
        self.log_dir = pick(self.log_dir, "ISSUEBOT_LOG_DIR");
        self
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub github_token: String,
    pub repo: RepoRef,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_api_base: String,
    pub github_api_base: String,
    pub policy: Policy,
    /// Directory for the file log.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load a JSON config file, then let environment variables override it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with<P, F>(path: P, lookup: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;
        Self::validate(file.overlay_env(lookup))
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::validate(ConfigFile::default().overlay_env(lookup))
    }

    fn validate(file: ConfigFile) -> Result<Self, ConfigError> {
        let discord_token = required(file.discord_token, "discord_token")?;
        let github_token = required(file.github_token, "github_token")?;
        let github_repo = required(file.github_repo, "github_repo")?;
        let openai_api_key = required(file.openai_api_key, "openai_api_key")?;

        let repo_pattern = Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("static regex");
        if !repo_pattern.is_match(&github_repo) {
            return Err(ConfigError::Validation(format!(
                "github_repo '{github_repo}' is invalid (expected format: owner/name)"
            )));
        }
        let repo = RepoRef::parse(&github_repo)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        let policy = match file.policy.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Policy::parse(raw)?,
            _ => Policy::default(),
        };

        Ok(Self {
            discord_token,
            github_token,
            repo,
            openai_api_key,
            openai_model: non_empty(file.openai_model)
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_api_base: non_empty(file.openai_api_base)
                .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
            github_api_base: non_empty(file.github_api_base)
                .unwrap_or_else(|| DEFAULT_GITHUB_API_BASE.to_string()),
            policy,
            log_dir: non_empty(file.log_dir).map(PathBuf::from),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::Missing(key))
}
