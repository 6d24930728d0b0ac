use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::metrics::MetricsWindow;
use crate::heuristics::HeuristicSettings;
use crate::recommendations::GenerationSettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
    pub playbooks: PlaybooksConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    /// When false, recommendations keep their rule-rendered explanations and heuristic
    /// descriptions use the built-in templates.
    pub enabled: bool,
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationConfig {
    pub windows: Vec<MetricsWindow>,
    pub min_score: f64,
    pub dedup_window_days: i64,
    pub expiry_days: i64,
    pub heuristic_dedup_hours: i64,
    pub history_days: u32,
}

impl GenerationConfig {
    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            min_score: self.min_score,
            dedup_window_days: self.dedup_window_days,
            expiry_days: self.expiry_days,
        }
    }

    pub fn heuristic_settings(&self) -> HeuristicSettings {
        HeuristicSettings {
            history_days: self.history_days,
            dedup_hours: self.heuristic_dedup_hours,
            expiry_days: self.expiry_days,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybooksConfig {
    /// JSON array of playbooks merged over the built-in catalog.
    pub path: Option<PathBuf>,
    pub include_builtin: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub llm_enabled: Option<bool>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub playbooks_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://adpilot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                enabled: false,
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            generation: GenerationConfig {
                windows: MetricsWindow::DEFAULTS.to_vec(),
                min_score: 10.0,
                dedup_window_days: 7,
                expiry_days: 30,
                heuristic_dedup_hours: 24,
                history_days: 31,
            },
            playbooks: PlaybooksConfig { path: None, include_builtin: true },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("adpilot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(enabled) = llm.enabled {
                self.llm.enabled = enabled;
            }
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(generation) = patch.generation {
            if let Some(windows) = generation.windows {
                self.generation.windows = windows;
            }
            if let Some(min_score) = generation.min_score {
                self.generation.min_score = min_score;
            }
            if let Some(dedup_window_days) = generation.dedup_window_days {
                self.generation.dedup_window_days = dedup_window_days;
            }
            if let Some(expiry_days) = generation.expiry_days {
                self.generation.expiry_days = expiry_days;
            }
            if let Some(heuristic_dedup_hours) = generation.heuristic_dedup_hours {
                self.generation.heuristic_dedup_hours = heuristic_dedup_hours;
            }
            if let Some(history_days) = generation.history_days {
                self.generation.history_days = history_days;
            }
        }

        if let Some(playbooks) = patch.playbooks {
            if let Some(path) = playbooks.path {
                self.playbooks.path = Some(path);
            }
            if let Some(include_builtin) = playbooks.include_builtin {
                self.playbooks.include_builtin = include_builtin;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ADPILOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ADPILOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ADPILOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ADPILOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ADPILOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ADPILOT_LLM_ENABLED") {
            self.llm.enabled = parse_bool("ADPILOT_LLM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ADPILOT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("ADPILOT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ADPILOT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("ADPILOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("ADPILOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("ADPILOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ADPILOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("ADPILOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("ADPILOT_GENERATION_WINDOWS") {
            self.generation.windows = parse_windows("ADPILOT_GENERATION_WINDOWS", &value)?;
        }
        if let Some(value) = read_env("ADPILOT_GENERATION_MIN_SCORE") {
            self.generation.min_score = parse_f64("ADPILOT_GENERATION_MIN_SCORE", &value)?;
        }
        if let Some(value) = read_env("ADPILOT_GENERATION_DEDUP_WINDOW_DAYS") {
            self.generation.dedup_window_days = parse_i64("ADPILOT_GENERATION_DEDUP_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("ADPILOT_GENERATION_EXPIRY_DAYS") {
            self.generation.expiry_days = parse_i64("ADPILOT_GENERATION_EXPIRY_DAYS", &value)?;
        }
        if let Some(value) = read_env("ADPILOT_GENERATION_HEURISTIC_DEDUP_HOURS") {
            self.generation.heuristic_dedup_hours =
                parse_i64("ADPILOT_GENERATION_HEURISTIC_DEDUP_HOURS", &value)?;
        }
        if let Some(value) = read_env("ADPILOT_GENERATION_HISTORY_DAYS") {
            self.generation.history_days = parse_u32("ADPILOT_GENERATION_HISTORY_DAYS", &value)?;
        }

        if let Some(value) = read_env("ADPILOT_PLAYBOOKS_PATH") {
            self.playbooks.path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("ADPILOT_PLAYBOOKS_INCLUDE_BUILTIN") {
            self.playbooks.include_builtin = parse_bool("ADPILOT_PLAYBOOKS_INCLUDE_BUILTIN", &value)?;
        }

        let log_level = read_env("ADPILOT_LOGGING_LEVEL").or_else(|| read_env("ADPILOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ADPILOT_LOGGING_FORMAT").or_else(|| read_env("ADPILOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(llm_enabled) = overrides.llm_enabled {
            self.llm.enabled = llm_enabled;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(playbooks_path) = overrides.playbooks_path {
            self.playbooks.path = Some(playbooks_path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_generation(&self.generation)?;
        validate_playbooks(&self.playbooks)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("adpilot.toml"), PathBuf::from("config/adpilot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if !llm.enabled {
        return Ok(());
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_generation(generation: &GenerationConfig) -> Result<(), ConfigError> {
    if generation.windows.is_empty() {
        return Err(ConfigError::Validation(
            "generation.windows must name at least one window (7d|14d|30d)".to_string(),
        ));
    }

    if !(0.0..=100.0).contains(&generation.min_score) {
        return Err(ConfigError::Validation(
            "generation.min_score must be in range 0..=100".to_string(),
        ));
    }

    if generation.dedup_window_days <= 0 || generation.expiry_days <= 0 {
        return Err(ConfigError::Validation(
            "generation.dedup_window_days and generation.expiry_days must be positive".to_string(),
        ));
    }

    if generation.heuristic_dedup_hours <= 0 {
        return Err(ConfigError::Validation(
            "generation.heuristic_dedup_hours must be positive".to_string(),
        ));
    }

    if generation.history_days < 2 {
        return Err(ConfigError::Validation(
            "generation.history_days must be at least 2 (current day plus history)".to_string(),
        ));
    }

    Ok(())
}

fn validate_playbooks(playbooks: &PlaybooksConfig) -> Result<(), ConfigError> {
    if !playbooks.include_builtin && playbooks.path.is_none() {
        return Err(ConfigError::Validation(
            "playbooks.path is required when playbooks.include_builtin is false".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid(key, value))
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| invalid(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| invalid(key, value))
}

fn parse_windows(key: &str, value: &str) -> Result<Vec<MetricsWindow>, ConfigError> {
    value
        .split(',')
        .map(|part| MetricsWindow::parse(part).ok_or_else(|| invalid(key, value)))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    generation: Option<GenerationPatch>,
    playbooks: Option<PlaybooksPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    enabled: Option<bool>,
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationPatch {
    windows: Option<Vec<MetricsWindow>>,
    min_score: Option<f64>,
    dedup_window_days: Option<i64>,
    expiry_days: Option<i64>,
    heuristic_dedup_hours: Option<i64>,
    history_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaybooksPatch {
    path: Option<PathBuf>,
    include_builtin: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
    use crate::domain::metrics::MetricsWindow;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.llm.enabled, "llm should be disabled by default")?;
        ensure(config.generation.min_score == 10.0, "min score should default to 10")?;
        ensure(config.generation.dedup_window_days == 7, "dedup window should default to 7 days")?;
        ensure(config.generation.windows == MetricsWindow::DEFAULTS.to_vec(), "all windows by default")?;
        ensure(config.playbooks.include_builtin, "built-in playbooks should be included")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ADPILOT_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("adpilot.toml");
            fs::write(
                &path,
                r#"
[llm]
enabled = true
provider = "openai"
api_key = "${TEST_ADPILOT_LLM_KEY}"
model = "gpt-4o-mini"

[generation]
windows = ["7d", "14d"]
min_score = 25.0
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env").unwrap_or(false),
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.generation.windows == vec![MetricsWindow::Last7Days, MetricsWindow::Last14Days],
                "windows should come from file",
            )?;
            ensure(config.generation.settings().min_score == 25.0, "min score should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_ADPILOT_LLM_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ADPILOT_LOG_LEVEL", "warn");
        env::set_var("ADPILOT_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["ADPILOT_LOG_LEVEL", "ADPILOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ADPILOT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ADPILOT_GENERATION_WINDOWS", "30d");
        env::set_var("ADPILOT_GENERATION_EXPIRY_DAYS", "14");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("adpilot.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[generation]
expiry_days = 60
dedup_window_days = 3

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.generation.expiry_days == 14, "env expiry should win over file")?;
            ensure(config.generation.dedup_window_days == 3, "file dedup window should win over default")?;
            ensure(
                config.generation.windows == vec![MetricsWindow::Last30Days],
                "env windows should win over default",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "ADPILOT_DATABASE_URL",
            "ADPILOT_GENERATION_WINDOWS",
            "ADPILOT_GENERATION_EXPIRY_DAYS",
        ]);
        result
    }

    #[test]
    fn enabled_llm_without_key_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ADPILOT_LLM_ENABLED", "true");
        env::set_var("ADPILOT_LLM_PROVIDER", "anthropic");

        let result = (|| -> Result<(), String> {
            match AppConfig::load(LoadOptions::default()) {
                Ok(_) => Err("expected validation failure but config load succeeded".to_string()),
                Err(ConfigError::Validation(message)) => {
                    ensure(message.contains("llm.api_key"), "error should name the missing key")
                }
                Err(other) => Err(format!("unexpected error: {other}")),
            }
        })();

        clear_vars(&["ADPILOT_LLM_ENABLED", "ADPILOT_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn invalid_env_values_are_reported_with_their_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ADPILOT_GENERATION_WINDOWS", "7d,90d");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "ADPILOT_GENERATION_WINDOWS", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid env override".to_string()),
        };

        clear_vars(&["ADPILOT_GENERATION_WINDOWS"]);
        result
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;

        let error = AppConfig::load(LoadOptions {
            config_path: Some(dir.path().join("missing.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(matches!(error, Err(ConfigError::MissingConfigFile(_))), "missing file should error")
    }
}
