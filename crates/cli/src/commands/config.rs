use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use adpilot_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let windows =
        config.generation.windows.iter().map(|window| window.as_str()).collect::<Vec<_>>().join(",");
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let playbooks_path = config
        .playbooks
        .path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());

    let fields = vec![
        field("database.url", config.database.url.clone(), &["ADPILOT_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["ADPILOT_DATABASE_MAX_CONNECTIONS"],
        ),
        field("database.timeout_secs", config.database.timeout_secs.to_string(), &["ADPILOT_DATABASE_TIMEOUT_SECS"]),
        field("llm.enabled", config.llm.enabled.to_string(), &["ADPILOT_LLM_ENABLED"]),
        field("llm.provider", config.llm.provider.as_str().to_string(), &["ADPILOT_LLM_PROVIDER"]),
        field("llm.model", config.llm.model.clone(), &["ADPILOT_LLM_MODEL"]),
        field(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["ADPILOT_LLM_BASE_URL"],
        ),
        field("llm.api_key", api_key.to_string(), &["ADPILOT_LLM_API_KEY"]),
        field("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["ADPILOT_LLM_TIMEOUT_SECS"]),
        field("llm.max_retries", config.llm.max_retries.to_string(), &["ADPILOT_LLM_MAX_RETRIES"]),
        field("generation.windows", windows, &["ADPILOT_GENERATION_WINDOWS"]),
        field("generation.min_score", config.generation.min_score.to_string(), &["ADPILOT_GENERATION_MIN_SCORE"]),
        field(
            "generation.dedup_window_days",
            config.generation.dedup_window_days.to_string(),
            &["ADPILOT_GENERATION_DEDUP_WINDOW_DAYS"],
        ),
        field("generation.expiry_days", config.generation.expiry_days.to_string(), &["ADPILOT_GENERATION_EXPIRY_DAYS"]),
        field(
            "generation.heuristic_dedup_hours",
            config.generation.heuristic_dedup_hours.to_string(),
            &["ADPILOT_GENERATION_HEURISTIC_DEDUP_HOURS"],
        ),
        field("generation.history_days", config.generation.history_days.to_string(), &["ADPILOT_GENERATION_HISTORY_DAYS"]),
        field("playbooks.path", playbooks_path, &["ADPILOT_PLAYBOOKS_PATH"]),
        field(
            "playbooks.include_builtin",
            config.playbooks.include_builtin.to_string(),
            &["ADPILOT_PLAYBOOKS_INCLUDE_BUILTIN"],
        ),
        field("logging.level", config.logging.level.clone(), &["ADPILOT_LOGGING_LEVEL", "ADPILOT_LOG_LEVEL"]),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["ADPILOT_LOGGING_FORMAT", "ADPILOT_LOG_FORMAT"],
        ),
    ];

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }
    lines.join("\n")
}

fn field(
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
) -> (&'static str, String, &'static [&'static str]) {
    (key, value, env_keys)
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("adpilot.toml"), PathBuf::from("config/adpilot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
