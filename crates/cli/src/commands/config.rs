use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use barkline_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "BARKLINE_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "BARKLINE_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "BARKLINE_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", "BARKLINE_LLM_PROVIDER"),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "BARKLINE_LLM_MODEL")));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", "BARKLINE_LLM_BASE_URL"),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line("llm.api_key", llm_api_key, source("llm.api_key", "BARKLINE_LLM_API_KEY")));

    lines.push(render_line(
        "delivery.base_url",
        &config.delivery.base_url,
        source("delivery.base_url", "BARKLINE_DELIVERY_BASE_URL"),
    ));
    let session_token =
        if config.delivery.session_token.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "delivery.session_token",
        session_token,
        source("delivery.session_token", "BARKLINE_DELIVERY_SESSION_TOKEN"),
    ));

    lines.push(render_line(
        "pipeline.owner_phones",
        &format!("{} configured", config.pipeline.owner_phones.len()),
        source("pipeline.owner_phones", "BARKLINE_PIPELINE_OWNER_PHONES"),
    ));
    lines.push(render_line(
        "pipeline.poll_interval_secs",
        &config.pipeline.poll_interval_secs.to_string(),
        source("pipeline.poll_interval_secs", "BARKLINE_PIPELINE_POLL_INTERVAL_SECS"),
    ));
    lines.push(render_line(
        "pipeline.batch_size",
        &config.pipeline.batch_size.to_string(),
        source("pipeline.batch_size", "BARKLINE_PIPELINE_BATCH_SIZE"),
    ));
    lines.push(render_line(
        "pipeline.knowledge_path",
        &config.pipeline.knowledge_path.display().to_string(),
        source("pipeline.knowledge_path", "BARKLINE_PIPELINE_KNOWLEDGE_PATH"),
    ));
    lines.push(render_line(
        "pipeline.scheduling_doc_path",
        &config.pipeline.scheduling_doc_path.display().to_string(),
        source("pipeline.scheduling_doc_path", "BARKLINE_PIPELINE_SCHEDULING_DOC_PATH"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "BARKLINE_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.api_port",
        &config.server.api_port.to_string(),
        source("server.api_port", "BARKLINE_SERVER_API_PORT"),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", "BARKLINE_SERVER_HEALTH_CHECK_PORT"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "BARKLINE_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "BARKLINE_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("barkline.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/barkline.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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
