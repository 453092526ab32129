use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use sejong_core::config::{AppConfig, LoadOptions};
use toml::Value;

use super::{config_failure, CommandResult, EXIT_OK};

struct Field<'a> {
    key: &'a str,
    env_keys: &'a [&'a str],
    value: String,
}

pub fn run(options: LoadOptions) -> CommandResult {
    let explicit_path = options.config_path.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return config_failure("config", &error),
    };

    let config_file_path = detect_config_path(explicit_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = [
        Field { key: "gateway.url", env_keys: &["SEJONG_GATEWAY_URL"], value: config.gateway.url.clone() },
        Field {
            key: "gateway.anon_key",
            env_keys: &["SEJONG_GATEWAY_ANON_KEY"],
            value: redact_secret(config.gateway.anon_key.expose_secret()),
        },
        Field {
            key: "gateway.timeout_secs",
            env_keys: &["SEJONG_GATEWAY_TIMEOUT_SECS"],
            value: config
                .gateway
                .timeout_secs
                .map(|secs| secs.to_string())
                .unwrap_or_else(|| "<none>".to_string()),
        },
        Field {
            key: "storage.receipts_bucket",
            env_keys: &["SEJONG_STORAGE_RECEIPTS_BUCKET"],
            value: config.storage.receipts_bucket.clone(),
        },
        Field {
            key: "storage.flight_tickets_bucket",
            env_keys: &["SEJONG_STORAGE_FLIGHT_TICKETS_BUCKET"],
            value: config.storage.flight_tickets_bucket.clone(),
        },
        Field {
            key: "admin.access_code",
            env_keys: &["SEJONG_ADMIN_ACCESS_CODE"],
            value: redact_secret(config.admin.access_code.expose_secret()),
        },
        Field {
            key: "session.path",
            env_keys: &["SEJONG_SESSION_PATH"],
            value: config.session.path.display().to_string(),
        },
        Field {
            key: "error_log.path",
            env_keys: &["SEJONG_ERROR_LOG_PATH"],
            value: config.error_log.path.display().to_string(),
        },
        Field {
            key: "error_log.capacity",
            env_keys: &["SEJONG_ERROR_LOG_CAPACITY"],
            value: config.error_log.capacity.to_string(),
        },
        Field { key: "app.debug", env_keys: &["SEJONG_DEBUG"], value: config.app.debug.to_string() },
        Field {
            key: "logging.level",
            env_keys: &["SEJONG_LOGGING_LEVEL", "SEJONG_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["SEJONG_LOGGING_FORMAT", "SEJONG_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in &fields {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult { exit_code: EXIT_OK, output: lines.join("\n") }
}

fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("sejong.toml"), PathBuf::from("config/sejong.toml")]
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

/// Keeps the first four characters so operators can tell keys apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }
    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}
