use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error_log::DEFAULT_CAPACITY;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
    pub admin: AdminConfig,
    pub session: SessionConfig,
    pub error_log: ErrorLogConfig,
    pub app: RuntimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub url: String,
    pub anon_key: SecretString,
    /// Absent means requests wait for the backend indefinitely.
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub receipts_bucket: String,
    pub flight_tickets_bucket: String,
}

#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub access_code: SecretString,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ErrorLogConfig {
    pub path: PathBuf,
    pub capacity: usize,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Surfaces captured runtime errors to the operator instead of only logging them.
    pub debug: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub gateway_url: Option<String>,
    pub gateway_anon_key: Option<String>,
    pub admin_access_code: Option<String>,
    pub session_path: Option<PathBuf>,
    pub error_log_path: Option<PathBuf>,
    pub debug: Option<bool>,
    pub log_level: Option<String>,
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
    #[error("config file references `${{{var}}}` but it is not set and has no fallback")]
    MissingEnvInterpolation { var: String },
    #[error("config file has a `${{` without a closing `}}`")]
    UnterminatedInterpolation,
    #[error("environment variable `{key}` has an invalid value `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                url: String::new(),
                anon_key: String::new().into(),
                timeout_secs: None,
            },
            storage: StorageConfig {
                receipts_bucket: "receipt-files".to_string(),
                flight_tickets_bucket: "flight-tickets".to_string(),
            },
            admin: AdminConfig { access_code: String::new().into() },
            session: SessionConfig { path: PathBuf::from(".sejong/current_student.json") },
            error_log: ErrorLogConfig {
                path: PathBuf::from(".sejong/error_log.json"),
                capacity: DEFAULT_CAPACITY,
            },
            app: RuntimeConfig { debug: false },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("sejong.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// `{url}/rest/v1`, without a trailing slash on the configured URL.
    pub fn rest_base_url(&self) -> String {
        format!("{}/rest/v1", self.gateway.url.trim_end_matches('/'))
    }

    pub fn storage_base_url(&self) -> String {
        format!("{}/storage/v1", self.gateway.url.trim_end_matches('/'))
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(gateway) = patch.gateway {
            if let Some(url) = gateway.url {
                self.gateway.url = url;
            }
            if let Some(anon_key_value) = gateway.anon_key {
                self.gateway.anon_key = secret_value(anon_key_value);
            }
            if let Some(timeout_secs) = gateway.timeout_secs {
                self.gateway.timeout_secs = Some(timeout_secs);
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(receipts_bucket) = storage.receipts_bucket {
                self.storage.receipts_bucket = receipts_bucket;
            }
            if let Some(flight_tickets_bucket) = storage.flight_tickets_bucket {
                self.storage.flight_tickets_bucket = flight_tickets_bucket;
            }
        }

        if let Some(admin) = patch.admin {
            if let Some(access_code_value) = admin.access_code {
                self.admin.access_code = secret_value(access_code_value);
            }
        }

        if let Some(session) = patch.session {
            if let Some(path) = session.path {
                self.session.path = path;
            }
        }

        if let Some(error_log) = patch.error_log {
            if let Some(path) = error_log.path {
                self.error_log.path = path;
            }
            if let Some(capacity) = error_log.capacity {
                self.error_log.capacity = capacity;
            }
        }

        if let Some(app) = patch.app {
            if let Some(debug) = app.debug {
                self.app.debug = debug;
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
        if let Some(value) = read_env("SEJONG_GATEWAY_URL") {
            self.gateway.url = value;
        }
        if let Some(value) = read_env("SEJONG_GATEWAY_ANON_KEY") {
            self.gateway.anon_key = secret_value(value);
        }
        if let Some(value) = read_env("SEJONG_GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = Some(parse_env("SEJONG_GATEWAY_TIMEOUT_SECS", &value)?);
        }

        if let Some(value) = read_env("SEJONG_STORAGE_RECEIPTS_BUCKET") {
            self.storage.receipts_bucket = value;
        }
        if let Some(value) = read_env("SEJONG_STORAGE_FLIGHT_TICKETS_BUCKET") {
            self.storage.flight_tickets_bucket = value;
        }

        if let Some(value) = read_env("SEJONG_ADMIN_ACCESS_CODE") {
            self.admin.access_code = secret_value(value);
        }

        if let Some(value) = read_env("SEJONG_SESSION_PATH") {
            self.session.path = PathBuf::from(value);
        }
        if let Some(value) = read_env("SEJONG_ERROR_LOG_PATH") {
            self.error_log.path = PathBuf::from(value);
        }
        if let Some(value) = read_env("SEJONG_ERROR_LOG_CAPACITY") {
            self.error_log.capacity = parse_env("SEJONG_ERROR_LOG_CAPACITY", &value)?;
        }

        if let Some(value) = read_env("SEJONG_DEBUG") {
            self.app.debug = parse_env("SEJONG_DEBUG", &value)?;
        }

        let log_level = read_env("SEJONG_LOGGING_LEVEL").or_else(|| read_env("SEJONG_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SEJONG_LOGGING_FORMAT").or_else(|| read_env("SEJONG_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(gateway_url) = overrides.gateway_url {
            self.gateway.url = gateway_url;
        }
        if let Some(gateway_anon_key) = overrides.gateway_anon_key {
            self.gateway.anon_key = secret_value(gateway_anon_key);
        }
        if let Some(admin_access_code) = overrides.admin_access_code {
            self.admin.access_code = secret_value(admin_access_code);
        }
        if let Some(session_path) = overrides.session_path {
            self.session.path = session_path;
        }
        if let Some(error_log_path) = overrides.error_log_path {
            self.error_log.path = error_log_path;
        }
        if let Some(debug) = overrides.debug {
            self.app.debug = debug;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gateway(&self.gateway)?;
        validate_storage(&self.storage)?;
        validate_error_log(&self.error_log)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("sejong.toml"), PathBuf::from("config/sejong.toml")]
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

/// Expands `${VAR}` and `${VAR:-fallback}` before the file is parsed. An unset
/// or empty variable takes the fallback when one is given.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let expression_start = &rest[start + 2..];
        let end = expression_start.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let expression = &expression_start[..end];

        let (var, fallback) = match expression.split_once(":-") {
            Some((var, fallback)) => (var.trim(), Some(fallback)),
            None => (expression.trim(), None),
        };
        match (env::var(var).ok().filter(|value| !value.is_empty()), fallback) {
            (Some(value), _) => output.push_str(&value),
            (None, Some(fallback)) => output.push_str(fallback),
            (None, None) => {
                return Err(ConfigError::MissingEnvInterpolation { var: var.to_string() })
            }
        }
        rest = &expression_start[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    let url = gateway.url.trim();
    if url.is_empty() {
        return Err(ConfigError::Validation(
            "gateway.url is required (the project URL, e.g. `https://<project>.supabase.co`)"
                .to_string(),
        ));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(ConfigError::Validation(
            "gateway.url must start with http:// or https://".to_string(),
        ));
    }

    if gateway.anon_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.anon_key is required (the project's public anon key)".to_string(),
        ));
    }

    if let Some(timeout_secs) = gateway.timeout_secs {
        if timeout_secs == 0 || timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "gateway.timeout_secs must be in range 1..=300 when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    for (name, bucket) in [
        ("storage.receipts_bucket", &storage.receipts_bucket),
        ("storage.flight_tickets_bucket", &storage.flight_tickets_bucket),
    ] {
        if bucket.trim().is_empty() || bucket.contains('/') {
            return Err(ConfigError::Validation(format!(
                "{name} must be a non-empty bucket name without `/`"
            )));
        }
    }
    Ok(())
}

fn validate_error_log(error_log: &ErrorLogConfig) -> Result<(), ConfigError> {
    if error_log.capacity == 0 || error_log.capacity > 1000 {
        return Err(ConfigError::Validation(
            "error_log.capacity must be in range 1..=1000".to_string(),
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

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    gateway: Option<GatewayPatch>,
    storage: Option<StoragePatch>,
    admin: Option<AdminPatch>,
    session: Option<SessionPatch>,
    error_log: Option<ErrorLogPatch>,
    app: Option<RuntimePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    url: Option<String>,
    anon_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    receipts_bucket: Option<String>,
    flight_tickets_bucket: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AdminPatch {
    access_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorLogPatch {
    path: Option<PathBuf>,
    capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimePatch {
    debug: Option<bool>,
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
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SEJONG_ANON_KEY", "anon-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("sejong.toml");
            fs::write(
                &path,
                r#"
[gateway]
url = "https://project.supabase.co"
anon_key = "${TEST_SEJONG_ANON_KEY}"

[storage]
receipts_bucket = "receipts"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.anon_key.expose_secret() == "anon-from-env",
                "anon key should be interpolated from environment",
            )?;
            ensure(config.storage.receipts_bucket == "receipts", "bucket should come from file")?;
            ensure(
                config.rest_base_url() == "https://project.supabase.co/rest/v1",
                "rest base url should be derived from gateway url",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SEJONG_ANON_KEY"]);
        result
    }

    #[test]
    fn interpolation_falls_back_and_reports_missing_vars() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TEST_SEJONG_UNSET_KEY", "TEST_SEJONG_UNSET_URL"]);

        let expanded = super::interpolate_env_vars("key = \"${TEST_SEJONG_UNSET_KEY:-anon-fallback}\"")
            .map_err(|err| err.to_string())?;
        ensure(expanded == "key = \"anon-fallback\"", "fallback should replace an unset var")?;

        let missing = super::interpolate_env_vars("url = \"${TEST_SEJONG_UNSET_URL}\"");
        ensure(
            matches!(missing, Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "TEST_SEJONG_UNSET_URL"),
            "an unset var without fallback should be reported by name",
        )?;

        let unterminated = super::interpolate_env_vars("url = \"${TEST_SEJONG_UNSET_URL\"");
        ensure(
            matches!(unterminated, Err(ConfigError::UnterminatedInterpolation)),
            "a missing closing brace should be reported",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SEJONG_GATEWAY_URL", "https://project.supabase.co");
        env::set_var("SEJONG_GATEWAY_ANON_KEY", "anon-test");
        env::set_var("SEJONG_LOG_LEVEL", "warn");
        env::set_var("SEJONG_LOG_FORMAT", "json");

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

        clear_vars(&[
            "SEJONG_GATEWAY_URL",
            "SEJONG_GATEWAY_ANON_KEY",
            "SEJONG_LOG_LEVEL",
            "SEJONG_LOG_FORMAT",
        ]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SEJONG_GATEWAY_URL", "https://from-env.supabase.co");
        env::set_var("SEJONG_GATEWAY_ANON_KEY", "anon-from-env");
        env::set_var("SEJONG_DEBUG", "true");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("sejong.toml");
            fs::write(
                &path,
                r#"
[gateway]
url = "https://from-file.supabase.co"
anon_key = "anon-from-file"
timeout_secs = 20

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    gateway_url: Some("https://from-override.supabase.co".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.url == "https://from-override.supabase.co",
                "override gateway url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.gateway.anon_key.expose_secret() == "anon-from-env",
                "env anon key should win over file and defaults",
            )?;
            ensure(config.gateway.timeout_secs == Some(20), "file timeout should be kept")?;
            ensure(config.app.debug, "env debug flag should be applied")?;
            Ok(())
        })();

        clear_vars(&["SEJONG_GATEWAY_URL", "SEJONG_GATEWAY_ANON_KEY", "SEJONG_DEBUG"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SEJONG_GATEWAY_URL", "project.supabase.co");
        env::set_var("SEJONG_GATEWAY_ANON_KEY", "anon-test");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("gateway.url")
            );
            ensure(has_message, "validation failure should mention gateway.url")
        })();

        clear_vars(&["SEJONG_GATEWAY_URL", "SEJONG_GATEWAY_ANON_KEY"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SEJONG_GATEWAY_URL", "https://project.supabase.co");
        env::set_var("SEJONG_GATEWAY_ANON_KEY", "anon-secret-value");
        env::set_var("SEJONG_ADMIN_ACCESS_CODE", "admin-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("anon-secret-value"), "debug output should not contain anon key")?;
            ensure(
                !debug.contains("admin-secret-value"),
                "debug output should not contain admin code",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.error_log.capacity == 50, "default error log capacity should be 50")?;
            ensure(config.gateway.timeout_secs.is_none(), "no client timeout by default")?;
            Ok(())
        })();

        clear_vars(&["SEJONG_GATEWAY_URL", "SEJONG_GATEWAY_ANON_KEY", "SEJONG_ADMIN_ACCESS_CODE"]);
        result
    }
}
