//! Read-only listings. Every row carries its normalized status so the operator
//! sees the same label and actions the dashboard would offer.

use serde_json::{json, Value};

use sejong_core::domain::catalog::ExamQuestion;
use sejong_core::domain::flight::FlightStatus;
use sejong_core::domain::lesson_plan::LessonPlanStatus;
use sejong_core::domain::request::RequestStatus;
use sejong_core::domain::student::UserId;
use sejong_core::errors::{ApplicationError, DomainError};
use sejong_core::status::{normalize, NormalizedStatus, RecordRef};
use sejong_db::repositories::{FlightRequestFilter, RepositoryError, RequestFilter};
use sejong_service::Session;

use super::{CliRuntime, CommandResult};

fn status_json(status: &NormalizedStatus) -> Value {
    json!({
        "display_status": status.display_status,
        "status_class": status.status_class.css_class(),
        "actions": status
            .available_actions
            .iter()
            .map(|action| json!({ "action": action, "label": action.label() }))
            .collect::<Vec<_>>(),
    })
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn parse_statuses<S>(
    raw: Option<&str>,
    parse: impl Fn(&str) -> Option<S>,
) -> Result<Vec<S>, ApplicationError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            parse(value).ok_or_else(|| {
                DomainError::InvariantViolation(format!("unknown status `{value}`")).into()
            })
        })
        .collect()
}

fn listed(command: &str, noun: &str, rows: Vec<Value>) -> CommandResult {
    CommandResult::success_with(command, format!("{} {noun}", rows.len()), Some(Value::Array(rows)))
}

pub async fn requests(rt: &CliRuntime, status: Option<String>, user: Option<String>) -> CommandResult {
    let ctx = rt.command_context();
    let result = list_requests(rt, status.as_deref(), user).await;
    rt.finish("requests", &ctx, result)
}

async fn list_requests(
    rt: &CliRuntime,
    status: Option<&str>,
    user: Option<String>,
) -> Result<CommandResult, ApplicationError> {
    // students only ever see their own requests
    let user_id = match rt.session()? {
        Session::Admin { .. } => user.map(UserId),
        Session::Student { profile, .. } => Some(profile.id),
    };
    let filter = RequestFilter { user_id, statuses: parse_statuses(status, RequestStatus::parse)? };
    let requests = rt.context.requests.list(&filter).await.map_err(persistence)?;

    let rows = requests
        .iter()
        .map(|request| {
            let status = normalize(RecordRef::Request(request));
            json!({
                "id": request.id,
                "user_id": request.user_id,
                "item_name": request.item_name,
                "price": request.price,
                "purchase_type": request.purchase_type.as_str(),
                "status": request.status.as_str(),
                "rejection_reason": request.rejection_reason,
                "normalized": status_json(&status),
            })
        })
        .collect();
    Ok(listed("requests", "requests", rows))
}

pub async fn lesson_plans(rt: &CliRuntime, status: Option<String>) -> CommandResult {
    let ctx = rt.command_context();
    let result = list_lesson_plans(rt, status.as_deref()).await;
    rt.finish("lesson-plans", &ctx, result)
}

async fn list_lesson_plans(
    rt: &CliRuntime,
    status: Option<&str>,
) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let statuses = parse_statuses(status, LessonPlanStatus::parse)?;
    let plans = rt.context.lesson_plans.list(&statuses).await.map_err(persistence)?;

    let rows = plans
        .iter()
        .map(|plan| {
            json!({
                "user_id": plan.user_id,
                "status": plan.status.as_str(),
                "approval_status": plan.approval_status().as_str(),
                "total_lessons": plan.schedule.total_lessons,
                "start_date": plan.schedule.start_date,
                "end_date": plan.schedule.end_date,
                "rejection_reason": plan.rejection_reason,
                "normalized": status_json(&normalize(RecordRef::LessonPlan(plan))),
            })
        })
        .collect();
    Ok(listed("lesson-plans", "lesson plans", rows))
}

pub async fn flights(rt: &CliRuntime, status: Option<String>, user: Option<String>) -> CommandResult {
    let ctx = rt.command_context();
    let result = list_flights(rt, status.as_deref(), user).await;
    rt.finish("flights", &ctx, result)
}

async fn list_flights(
    rt: &CliRuntime,
    status: Option<&str>,
    user: Option<String>,
) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let filter = FlightRequestFilter {
        user_id: user.map(UserId),
        statuses: parse_statuses(status, FlightStatus::parse)?,
    };
    let flights = rt.context.flights.list(&filter).await.map_err(persistence)?;

    let rows = flights
        .iter()
        .map(|flight| {
            json!({
                "id": flight.id,
                "user_id": flight.user_id,
                "status": flight.status.as_str(),
                "departure_date": flight.departure_date,
                "return_date": flight.return_date,
                "ticket_price": flight.ticket_price,
                "special_baggage": flight.special_baggage.as_ref().map(|baggage| json!({
                    "status": baggage.status.as_str(),
                    "amount": baggage.amount,
                    "reason": baggage.reason,
                })),
                "normalized": status_json(&normalize(RecordRef::FlightRequest(flight))),
            })
        })
        .collect();
    Ok(listed("flights", "flight requests", rows))
}

pub async fn institutes(rt: &CliRuntime) -> CommandResult {
    let ctx = rt.command_context();
    let result = list_institutes(rt).await;
    rt.finish("institutes", &ctx, result)
}

async fn list_institutes(rt: &CliRuntime) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let institutes = rt.context.catalog.list_institutes().await.map_err(persistence)?;

    let rows = institutes
        .iter()
        .map(|institute| {
            json!({
                "id": institute.id,
                "name": institute.name,
                "field": institute.field,
                "status": institute.status.as_str(),
                "normalized": status_json(&normalize(RecordRef::Institute(institute))),
            })
        })
        .collect();
    Ok(listed("institutes", "institutes", rows))
}

pub async fn exam_questions(rt: &CliRuntime, active_only: bool) -> CommandResult {
    let ctx = rt.command_context();
    let result = list_exam_questions(rt, active_only).await;
    rt.finish("exam-questions", &ctx, result)
}

async fn list_exam_questions(
    rt: &CliRuntime,
    active_only: bool,
) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let mut questions = rt.context.catalog.list_exam_questions().await.map_err(persistence)?;
    if active_only {
        questions = ExamQuestion::active_in_order(questions);
    }

    let rows = questions
        .iter()
        .map(|question| {
            json!({
                "id": question.id,
                "order_index": question.order_index,
                "question_text": question.question_text,
                "choices": question.choices,
                "status": question.status.as_str(),
                "normalized": status_json(&normalize(RecordRef::ExamQuestion(question))),
            })
        })
        .collect();
    Ok(listed("exam-questions", "exam questions", rows))
}

#[cfg(test)]
mod tests {
    use sejong_core::domain::request::RequestStatus;

    use super::parse_statuses;

    #[test]
    fn status_lists_accept_legacy_spellings() {
        let statuses = parse_statuses(Some("pending, completed"), RequestStatus::parse).expect("parse");
        assert_eq!(statuses, vec![RequestStatus::Pending, RequestStatus::Purchased]);
        assert!(parse_statuses(None, RequestStatus::parse).expect("none").is_empty());
        assert!(parse_statuses(Some("shipped"), RequestStatus::parse).is_err());
    }
}
