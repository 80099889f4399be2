use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::contact::normalize_phone;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub delivery: DeliveryConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
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
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

/// Outbound SMS delivery goes through the salon's point-of-sale web app,
/// authenticated with a session token.
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    pub base_url: String,
    pub session_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Phone numbers that identify the salon owner; inbound texts from these
    /// numbers are treated as answers to escalations, not client messages.
    pub owner_phones: Vec<String>,
    /// Destination for escalation drafts.
    pub owner_primary_phone: String,
    pub poll_interval_secs: u64,
    pub batch_size: u32,
    pub knowledge_path: PathBuf,
    pub scheduling_doc_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub api_port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub delivery_session_token: Option<String>,
    pub poll_interval_secs: Option<u64>,
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
                url: "sqlite://barkline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            delivery: DeliveryConfig {
                base_url: "http://localhost:9090".to_string(),
                session_token: None,
                timeout_secs: 15,
            },
            pipeline: PipelineConfig {
                owner_phones: Vec::new(),
                owner_primary_phone: String::new(),
                poll_interval_secs: 30,
                batch_size: 20,
                knowledge_path: PathBuf::from("staff/knowledge_base.md"),
                scheduling_doc_path: PathBuf::from("staff/scheduling_reference.md"),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                api_port: 8000,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("barkline.toml"));
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
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
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
        }

        if let Some(delivery) = patch.delivery {
            if let Some(base_url) = delivery.base_url {
                self.delivery.base_url = base_url;
            }
            if let Some(session_token_value) = delivery.session_token {
                self.delivery.session_token = Some(secret_value(session_token_value));
            }
            if let Some(timeout_secs) = delivery.timeout_secs {
                self.delivery.timeout_secs = timeout_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(owner_phones) = pipeline.owner_phones {
                self.pipeline.owner_phones = owner_phones;
            }
            if let Some(owner_primary_phone) = pipeline.owner_primary_phone {
                self.pipeline.owner_primary_phone = owner_primary_phone;
            }
            if let Some(poll_interval_secs) = pipeline.poll_interval_secs {
                self.pipeline.poll_interval_secs = poll_interval_secs;
            }
            if let Some(batch_size) = pipeline.batch_size {
                self.pipeline.batch_size = batch_size;
            }
            if let Some(knowledge_path) = pipeline.knowledge_path {
                self.pipeline.knowledge_path = knowledge_path;
            }
            if let Some(scheduling_doc_path) = pipeline.scheduling_doc_path {
                self.pipeline.scheduling_doc_path = scheduling_doc_path;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(api_port) = server.api_port {
                self.server.api_port = api_port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("BARKLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BARKLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("BARKLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BARKLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BARKLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BARKLINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("BARKLINE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("BARKLINE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("BARKLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("BARKLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("BARKLINE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BARKLINE_DELIVERY_BASE_URL") {
            self.delivery.base_url = value;
        }
        if let Some(value) = read_env("BARKLINE_DELIVERY_SESSION_TOKEN") {
            self.delivery.session_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("BARKLINE_DELIVERY_TIMEOUT_SECS") {
            self.delivery.timeout_secs = parse_u64("BARKLINE_DELIVERY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BARKLINE_PIPELINE_OWNER_PHONES") {
            self.pipeline.owner_phones =
                value.split(',').map(|phone| phone.trim().to_string()).collect();
        }
        if let Some(value) = read_env("BARKLINE_PIPELINE_OWNER_PRIMARY_PHONE") {
            self.pipeline.owner_primary_phone = value;
        }
        if let Some(value) = read_env("BARKLINE_PIPELINE_POLL_INTERVAL_SECS") {
            self.pipeline.poll_interval_secs =
                parse_u64("BARKLINE_PIPELINE_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("BARKLINE_PIPELINE_BATCH_SIZE") {
            self.pipeline.batch_size = parse_u32("BARKLINE_PIPELINE_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("BARKLINE_PIPELINE_KNOWLEDGE_PATH") {
            self.pipeline.knowledge_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("BARKLINE_PIPELINE_SCHEDULING_DOC_PATH") {
            self.pipeline.scheduling_doc_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("BARKLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BARKLINE_SERVER_API_PORT") {
            self.server.api_port = parse_u16("BARKLINE_SERVER_API_PORT", &value)?;
        }
        if let Some(value) = read_env("BARKLINE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("BARKLINE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("BARKLINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BARKLINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("BARKLINE_LOGGING_LEVEL").or_else(|| read_env("BARKLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BARKLINE_LOGGING_FORMAT").or_else(|| read_env("BARKLINE_LOG_FORMAT"));
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
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(delivery_session_token) = overrides.delivery_session_token {
            self.delivery.session_token = Some(secret_value(delivery_session_token));
        }
        if let Some(poll_interval_secs) = overrides.poll_interval_secs {
            self.pipeline.poll_interval_secs = poll_interval_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_delivery(&self.delivery)?;
        validate_pipeline(&self.pipeline)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("barkline.toml"), PathBuf::from("config/barkline.toml")]
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
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
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

fn validate_delivery(delivery: &DeliveryConfig) -> Result<(), ConfigError> {
    let base_url = delivery.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "delivery.base_url must start with http:// or https://".to_string(),
        ));
    }

    if delivery.timeout_secs == 0 || delivery.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "delivery.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.poll_interval_secs < 5 || pipeline.poll_interval_secs > 3600 {
        return Err(ConfigError::Validation(
            "pipeline.poll_interval_secs must be in range 5..=3600".to_string(),
        ));
    }

    if pipeline.batch_size == 0 || pipeline.batch_size > 200 {
        return Err(ConfigError::Validation(
            "pipeline.batch_size must be in range 1..=200".to_string(),
        ));
    }

    for phone in &pipeline.owner_phones {
        if normalize_phone(phone).len() != 10 {
            return Err(ConfigError::Validation(format!(
                "pipeline.owner_phones entry `{phone}` does not normalize to a 10-digit number"
            )));
        }
    }

    if !pipeline.owner_phones.is_empty()
        && normalize_phone(&pipeline.owner_primary_phone).len() != 10
    {
        return Err(ConfigError::Validation(
            "pipeline.owner_primary_phone must normalize to a 10-digit number when owner_phones is set"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.api_port == 0 {
        return Err(ConfigError::Validation(
            "server.api_port must be greater than zero".to_string(),
        ));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.api_port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.api_port and server.health_check_port must differ".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    delivery: Option<DeliveryPatch>,
    pipeline: Option<PipelinePatch>,
    server: Option<ServerPatch>,
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
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DeliveryPatch {
    base_url: Option<String>,
    session_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    owner_phones: Option<Vec<String>>,
    owner_primary_phone: Option<String>,
    poll_interval_secs: Option<u64>,
    batch_size: Option<u32>,
    knowledge_path: Option<PathBuf>,
    scheduling_doc_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    api_port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
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

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

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
    fn defaults_validate() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("default load failed: {err}"))?;
        ensure(config.pipeline.poll_interval_secs == 30, "default poll interval should be 30s")?;
        ensure(config.pipeline.batch_size == 20, "default batch size should be 20")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DELIVERY_TOKEN", "session-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("barkline.toml");
            fs::write(
                &path,
                r#"
[delivery]
base_url = "https://pos.example.com"
session_token = "${TEST_DELIVERY_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config
                .delivery
                .session_token
                .as_ref()
                .map(|secret| secret.expose_secret().to_string())
                .unwrap_or_default();
            ensure(token == "session-from-env", "session token should come from environment")?;
            ensure(
                config.delivery.base_url == "https://pos.example.com",
                "base url should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_DELIVERY_TOKEN"]);
        result
    }

    #[test]
    fn env_overrides_win_over_file_values() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BARKLINE_PIPELINE_POLL_INTERVAL_SECS", "45");
        env::set_var("BARKLINE_PIPELINE_OWNER_PHONES", "(615) 555-0101, 16155550102");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("barkline.toml");
            fs::write(
                &path,
                r#"
[pipeline]
poll_interval_secs = 120
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.pipeline.poll_interval_secs == 45,
                "environment should win over the config file",
            )?;
            ensure(
                config.pipeline.owner_phones.len() == 2,
                "owner phone list should be split on commas",
            )?;
            Ok(())
        })();

        clear_vars(&["BARKLINE_PIPELINE_POLL_INTERVAL_SECS", "BARKLINE_PIPELINE_OWNER_PHONES"]);
        result
    }

    #[test]
    fn explicit_overrides_win_over_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BARKLINE_LOG_LEVEL", "debug");

        let result = (|| -> Result<(), String> {
            let overrides =
                ConfigOverrides { log_level: Some("warn".to_string()), ..Default::default() };
            let config = AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.logging.level == "warn", "explicit override should win over env")?;
            Ok(())
        })();

        clear_vars(&["BARKLINE_LOG_LEVEL"]);
        result
    }

    #[test]
    fn rejects_out_of_range_poll_interval() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let overrides = ConfigOverrides { poll_interval_secs: Some(2), ..Default::default() };
        let error = AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() })
            .err()
            .ok_or("expected validation failure for 2s poll interval")?;
        ensure(
            matches!(error, ConfigError::Validation(_)),
            "error should be a validation failure",
        )?;
        Ok(())
    }

    #[test]
    fn rejects_non_normalizable_owner_phone() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BARKLINE_PIPELINE_OWNER_PHONES", "not-a-phone");
        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or("expected validation failure for malformed owner phone")?;
            ensure(
                matches!(error, ConfigError::Validation(_)),
                "error should be a validation failure",
            )?;
            Ok(())
        })();

        clear_vars(&["BARKLINE_PIPELINE_OWNER_PHONES"]);
        result
    }

    #[test]
    fn log_format_parses_from_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BARKLINE_LOGGING_FORMAT", "json");
        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.logging.format == LogFormat::Json, "format should parse as json")?;
            Ok(())
        })();

        clear_vars(&["BARKLINE_LOGGING_FORMAT"]);
        result
    }
}
