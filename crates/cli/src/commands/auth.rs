use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

use sejong_core::errors::ApplicationError;
use sejong_service::{AuthService, Session, SessionStore};

use super::{CliRuntime, CommandResult, EXIT_CONFIG};

fn auth_service(rt: &CliRuntime) -> AuthService {
    AuthService::new(rt.context.profiles.clone(), rt.config.admin.access_code.clone())
}

fn persist(rt: &CliRuntime, session: &Session) -> Result<(), ApplicationError> {
    rt.sessions.save(session).map_err(|error| ApplicationError::Configuration(error.to_string()))
}

pub async fn login(
    rt: &CliRuntime,
    name: String,
    birth_date: NaiveDate,
    password: Option<String>,
) -> CommandResult {
    let ctx = rt.command_context();
    let result = student_login(rt, &name, birth_date, password.as_deref()).await;
    rt.finish("login", &ctx, result)
}

async fn student_login(
    rt: &CliRuntime,
    name: &str,
    birth_date: NaiveDate,
    password: Option<&str>,
) -> Result<CommandResult, ApplicationError> {
    let session = auth_service(rt).student_login(name, birth_date, password).await?;
    persist(rt, &session)?;
    let (message, data) = match &session {
        Session::Student { profile, .. } => (
            format!("signed in as {}", profile.name),
            json!({
                "user_id": profile.id,
                "name": profile.name,
                "field": profile.field_label(),
                "sejong_institute": profile.sejong_institute,
            }),
        ),
        Session::Admin { .. } => ("signed in as administrator".to_string(), json!({})),
    };
    Ok(CommandResult::success_with("login", message, Some(data)))
}

pub fn admin_login(rt: &CliRuntime, code: String) -> CommandResult {
    let ctx = rt.command_context();
    let result = auth_service(rt)
        .admin_login(&code)
        .and_then(|session| persist(rt, &session))
        .map(|()| CommandResult::success("admin-login", "signed in as administrator"));
    rt.finish("admin-login", &ctx, result)
}

/// Needs no backend, so it works even when configuration does not load.
pub fn logout(store: &SessionStore) -> CommandResult {
    match store.clear() {
        Ok(true) => {
            info!(event_name = "session.logout.completed", "session cleared");
            CommandResult::success("logout", "signed out")
        }
        Ok(false) => CommandResult::success("logout", "no active session"),
        Err(error) => {
            CommandResult::failure("logout", "session_io", error.to_string(), EXIT_CONFIG)
        }
    }
}
