use sejong_core::domain::student::UserId;
use sejong_core::errors::{ApplicationError, DomainError};
use sejong_service::{BudgetService, Session};

use super::{CliRuntime, CommandResult};

/// A budget lookup never fails on backend trouble: it degrades to an empty
/// budget with the field shown as unset.
pub async fn run(rt: &CliRuntime, user: Option<String>) -> CommandResult {
    let ctx = rt.command_context();
    let result = summary(rt, user).await;
    rt.finish("budget", &ctx, result)
}

async fn summary(rt: &CliRuntime, user: Option<String>) -> Result<CommandResult, ApplicationError> {
    let user_id = match (rt.session()?, user) {
        (Session::Student { profile, .. }, None) => profile.id,
        (Session::Student { profile, .. }, Some(user)) if profile.id.0 == user => profile.id,
        (Session::Student { .. }, Some(_)) => {
            return Err(ApplicationError::Unauthorized(
                "students can only view their own budget".to_string(),
            ))
        }
        (Session::Admin { .. }, Some(user)) => UserId(user),
        (Session::Admin { .. }, None) => {
            return Err(DomainError::MissingFields(vec!["user".to_string()]).into())
        }
    };

    let summary = BudgetService::new(&rt.context).summary(&user_id).await;
    let message = format!(
        "{}: {} allocated, {} used, {} remaining",
        summary.field_label(),
        summary.allocated,
        summary.used,
        summary.remaining
    );
    Ok(CommandResult::success_with("budget", message, serde_json::to_value(&summary).ok()))
}
