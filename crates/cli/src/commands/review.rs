use serde_json::json;

use sejong_core::domain::flight::FlightRequestId;
use sejong_core::domain::student::UserId;
use sejong_core::errors::{ApplicationError, DomainError};
use sejong_core::status::RecordKind;
use sejong_db::repositories::CatalogKind;
use sejong_service::{
    ActionContext, Confirmation, LifecycleHandler, Session, TransitionOutcome, TransitionReceipt,
};

use super::{CliRuntime, CommandResult};

fn record_kind(raw: &str) -> Result<RecordKind, ApplicationError> {
    RecordKind::parse(raw).ok_or_else(|| {
        DomainError::InvariantViolation(format!(
            "unknown record kind `{raw}` (expected request, lesson-plan, flight, budget, institute or exam)"
        ))
        .into()
    })
}

fn applied(command: &str, receipt: &TransitionReceipt) -> CommandResult {
    CommandResult::success_with(
        command,
        format!("{} `{}`: {}", receipt.entity, receipt.id, receipt.status.display_status),
        serde_json::to_value(receipt).ok(),
    )
}

/// Without `--yes` nothing is written; the operator is told how to confirm.
pub async fn approve(rt: &CliRuntime, kind: String, id: String, yes: bool) -> CommandResult {
    let ctx = rt.command_context();
    let result = run_approve(rt, &ctx, &kind, &id, yes).await;
    rt.finish("approve", &ctx, result)
}

async fn run_approve(
    rt: &CliRuntime,
    ctx: &ActionContext,
    kind: &str,
    id: &str,
    yes: bool,
) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let kind = record_kind(kind)?;
    let confirmation = if yes { Confirmation::Confirmed } else { Confirmation::Declined };
    let handler = LifecycleHandler::new(rt.context.clone());
    match handler.approve(ctx, kind, id, confirmation).await? {
        TransitionOutcome::Applied(receipt) => Ok(applied("approve", &receipt)),
        TransitionOutcome::Declined => Ok(CommandResult::success_with(
            "approve",
            "not confirmed; nothing was changed (pass --yes to approve)",
            Some(json!({ "kind": kind, "id": id, "confirmed": false })),
        )),
    }
}

pub async fn reject(rt: &CliRuntime, kind: String, id: String, reason: String) -> CommandResult {
    let ctx = rt.command_context();
    let result = run_reject(rt, &ctx, &kind, &id, &reason).await;
    rt.finish("reject", &ctx, result)
}

async fn run_reject(
    rt: &CliRuntime,
    ctx: &ActionContext,
    kind: &str,
    id: &str,
    reason: &str,
) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let kind = record_kind(kind)?;
    let handler = LifecycleHandler::new(rt.context.clone());
    let receipt = handler.reject(ctx, kind, id, reason).await?;
    Ok(applied("reject", &receipt))
}

pub async fn set_active(rt: &CliRuntime, kind: String, id: String, activate: bool) -> CommandResult {
    let command = if activate { "activate" } else { "deactivate" };
    let ctx = rt.command_context();
    let result = run_set_active(rt, &ctx, command, &kind, &id, activate).await;
    rt.finish(command, &ctx, result)
}

async fn run_set_active(
    rt: &CliRuntime,
    ctx: &ActionContext,
    command: &str,
    kind: &str,
    id: &str,
    activate: bool,
) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let catalog = match record_kind(kind)? {
        RecordKind::Institute => CatalogKind::Institute,
        RecordKind::ExamQuestion => CatalogKind::ExamQuestion,
        other => {
            return Err(DomainError::InvariantViolation(format!(
                "{other:?} records are reviewed, not activated"
            ))
            .into())
        }
    };
    let handler = LifecycleHandler::new(rt.context.clone());
    let receipt = handler.set_catalog_status(ctx, catalog, id, activate).await?;
    Ok(applied(command, &receipt))
}

pub async fn baggage(
    rt: &CliRuntime,
    id: String,
    approve: bool,
    reason: Option<String>,
) -> CommandResult {
    let ctx = rt.command_context();
    let result = run_baggage(rt, &ctx, id, approve, reason.as_deref()).await;
    rt.finish("baggage", &ctx, result)
}

async fn run_baggage(
    rt: &CliRuntime,
    ctx: &ActionContext,
    id: String,
    approve: bool,
    reason: Option<&str>,
) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let handler = LifecycleHandler::new(rt.context.clone());
    let receipt = handler.decide_baggage(ctx, &FlightRequestId(id), approve, reason).await?;
    Ok(applied("baggage", &receipt))
}

pub async fn complete(rt: &CliRuntime, id: String) -> CommandResult {
    let ctx = rt.command_context();
    let result = run_complete(rt, &ctx, id).await;
    rt.finish("complete", &ctx, result)
}

async fn run_complete(
    rt: &CliRuntime,
    ctx: &ActionContext,
    id: String,
) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let handler = LifecycleHandler::new(rt.context.clone());
    let receipt = handler.complete_flight(ctx, &FlightRequestId(id)).await?;
    Ok(applied("complete", &receipt))
}

/// Students submit their own plan; an administrator names the student.
pub async fn submit_plan(rt: &CliRuntime, user: Option<String>) -> CommandResult {
    let ctx = rt.command_context();
    let result = run_submit_plan(rt, &ctx, user).await;
    rt.finish("submit-plan", &ctx, result)
}

async fn run_submit_plan(
    rt: &CliRuntime,
    ctx: &ActionContext,
    user: Option<String>,
) -> Result<CommandResult, ApplicationError> {
    let user_id = match (rt.session()?, user) {
        (Session::Student { profile, .. }, None) => profile.id,
        (Session::Student { profile, .. }, Some(user)) if profile.id.0 == user => profile.id,
        (Session::Student { .. }, Some(_)) => {
            return Err(ApplicationError::Unauthorized(
                "students can only submit their own lesson plan".to_string(),
            ))
        }
        (Session::Admin { .. }, Some(user)) => UserId(user),
        (Session::Admin { .. }, None) => {
            return Err(DomainError::MissingFields(vec!["user".to_string()]).into())
        }
    };
    let handler = LifecycleHandler::new(rt.context.clone());
    let receipt = handler.submit_lesson_plan(ctx, &user_id).await?;
    Ok(applied("submit-plan", &receipt))
}
