pub mod auth;
pub mod budget;
pub mod config;
pub mod doctor;
pub mod purchase;
pub mod records;
pub mod review;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use sejong_core::config::{AppConfig, ConfigError, LoadOptions};
use sejong_core::error_log::{ErrorEntry, ErrorLog};
use sejong_core::errors::{ApplicationError, InterfaceError, Presentation};
use sejong_db::GatewaySlot;
use sejong_service::{bootstrap, ActionContext, BootstrapError, ServiceContext, Session, SessionStore};

pub const EXIT_OK: u8 = 0;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_VALIDATION: u8 = 3;
pub const EXIT_BACKEND: u8 = 4;
pub const EXIT_ALREADY_PROCESSED: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    presentation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            presentation: None,
            correlation_id: None,
            detail: None,
            data,
        };
        Self { exit_code: EXIT_OK, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            presentation: None,
            correlation_id: None,
            detail: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// The operator sees the Korean user message; the underlying error is
    /// only included when `debug` is on.
    pub fn from_interface(command: &str, error: &InterfaceError, debug: bool) -> Self {
        let (error_class, exit_code) = classify(error);
        let presentation = match error.presentation() {
            Presentation::Toast { .. } => "toast",
            Presentation::Alert { .. } => "alert",
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: error.user_message().to_string(),
            presentation: Some(presentation),
            correlation_id: Some(error.correlation_id().to_string()),
            detail: debug.then(|| error.to_string()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn classify(error: &InterfaceError) -> (&'static str, u8) {
    match error {
        InterfaceError::BadRequest { .. } => ("bad_request", EXIT_VALIDATION),
        InterfaceError::SessionExpired { .. } => ("session_expired", EXIT_VALIDATION),
        InterfaceError::AlreadyProcessed { .. } => ("already_processed", EXIT_ALREADY_PROCESSED),
        InterfaceError::Conflict { .. } => ("conflict", EXIT_BACKEND),
        InterfaceError::ServiceUnavailable { .. } => ("service_unavailable", EXIT_BACKEND),
        InterfaceError::Internal { .. } => ("internal", EXIT_CONFIG),
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub fn config_failure(command: &str, error: &ConfigError) -> CommandResult {
    CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
}

pub fn bootstrap_failure(command: &str, error: &BootstrapError) -> CommandResult {
    match error {
        BootstrapError::Config(error) => config_failure(command, error),
        BootstrapError::Gateway(error) => {
            CommandResult::failure(command, "gateway_init", error.to_string(), EXIT_CONFIG)
        }
    }
}

/// Everything a command needs once configuration has loaded.
pub struct CliRuntime {
    pub config: AppConfig,
    pub context: ServiceContext,
    pub sessions: SessionStore,
}

impl CliRuntime {
    pub fn new(config: AppConfig, context: ServiceContext) -> Self {
        let sessions = SessionStore::new(config.session.path.clone());
        Self { config, context, sessions }
    }

    pub async fn connect(options: LoadOptions, slot: &GatewaySlot) -> Result<Self, BootstrapError> {
        let application = bootstrap(options, slot).await?;
        Ok(Self::new(application.config, application.context))
    }

    pub fn session(&self) -> Result<Session, ApplicationError> {
        self.sessions
            .load()
            .ok_or_else(|| ApplicationError::Unauthorized("not signed in".to_string()))
    }

    pub fn require_admin(&self) -> Result<Session, ApplicationError> {
        let session = self.session()?;
        if !session.is_admin() {
            return Err(ApplicationError::Unauthorized(
                "this action needs an administrator session".to_string(),
            ));
        }
        Ok(session)
    }

    /// Fresh correlation id, attributed to whoever is signed in.
    pub fn command_context(&self) -> ActionContext {
        let actor =
            self.sessions.load().map(|session| session.actor()).unwrap_or_else(|| "anonymous".to_string());
        ActionContext::new(actor)
    }

    /// Turns a failed command body into a logged, mapped outcome.
    pub fn finish(
        &self,
        command: &str,
        ctx: &ActionContext,
        result: Result<CommandResult, ApplicationError>,
    ) -> CommandResult {
        result.unwrap_or_else(|error| self.fail(command, error, &ctx.correlation_id))
    }

    /// Maps the error for the operator and appends it to the persisted error log.
    pub fn fail(&self, command: &str, error: ApplicationError, correlation_id: &str) -> CommandResult {
        let detail = error.to_string();
        let mut log = ErrorLog::load(&self.config.error_log.path, self.config.error_log.capacity);
        log.push(ErrorEntry::new(command, detail).with_correlation_id(correlation_id));
        if let Err(save_error) = log.save(&self.config.error_log.path) {
            warn!(
                event_name = "cli.error_log.save_failed",
                correlation_id,
                error = %save_error,
                "could not persist error log"
            );
        }

        let interface = error.into_interface(correlation_id);
        CommandResult::from_interface(command, &interface, self.config.app.debug)
    }
}
