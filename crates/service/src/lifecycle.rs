//! Lifecycle Transition Handler.
//!
//! Every action follows the same path: hold the entity's in-flight guard,
//! read the current record, ask the transition table for the next state,
//! issue exactly one filtered write scoped to the table's source states,
//! then re-read, re-normalize and publish a refresh. A write that matches
//! zero rows means the record moved on underneath us and is reported as
//! already processed, never as a failure.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use sejong_core::domain::budget::{SpecialRequestStatus, StudentBudget};
use sejong_core::domain::catalog::ActiveStatus;
use sejong_core::domain::flight::{BaggageStatus, FlightRequest, FlightRequestId, FlightStatus};
use sejong_core::domain::lesson_plan::{LessonPlan, LessonPlanStatus};
use sejong_core::domain::receipt::{receipt_object_path, Receipt, ReceiptFile, ReceiptMetadata};
use sejong_core::domain::request::{Request, RequestId, RequestStatus};
use sejong_core::domain::student::UserId;
use sejong_core::errors::{ApplicationError, DomainError};
use sejong_core::inflight::InFlightGuard;
use sejong_core::lifecycle::{require_reason, EntityKind, Lifecycle, LifecycleAction};
use sejong_core::status::{normalize, NormalizedStatus, RecordKind, RecordRef};
use sejong_db::repositories::{
    BaggageDecision, CatalogKind, FlightUpdate, LessonPlanUpdate, RepositoryError, RequestUpdate,
    SpecialRequestDecision,
};

use crate::context::{ActionContext, ServiceContext};
use crate::refresh::RefreshEvent;

/// Operator answer to the "are you sure?" prompt that guards approvals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionReceipt {
    pub entity: EntityKind,
    pub id: String,
    pub action: LifecycleAction,
    /// Normalized from the record as re-read after the write.
    pub status: NormalizedStatus,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(TransitionReceipt),
    Declined,
}

impl TransitionOutcome {
    pub fn receipt(&self) -> Option<&TransitionReceipt> {
        match self {
            Self::Applied(receipt) => Some(receipt),
            Self::Declined => None,
        }
    }
}

pub struct LifecycleHandler {
    context: ServiceContext,
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn not_found(entity: EntityKind, id: &str) -> ApplicationError {
    ApplicationError::NotFound { entity, id: id.to_owned() }
}

/// Next state for `action`, or why the action cannot run from `current`.
fn plan_transition<S: Lifecycle>(
    entity: EntityKind,
    id: &str,
    current: S,
    action: LifecycleAction,
) -> Result<S, ApplicationError> {
    match current.next(action) {
        Some(next) => Ok(next),
        None if current.is_past(action) => {
            Err(ApplicationError::AlreadyProcessed { entity, id: id.to_owned() })
        }
        None => Err(DomainError::InvalidTransition { entity, from: current.as_str(), action }.into()),
    }
}

impl LifecycleHandler {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    fn acquire(&self, entity: EntityKind, id: &str) -> Result<InFlightGuard, ApplicationError> {
        self.context
            .inflight
            .try_acquire(entity, id)
            .ok_or_else(|| ApplicationError::Busy { entity, id: id.to_owned() })
    }

    fn declined(&self, ctx: &ActionContext, entity: EntityKind, id: &str) -> TransitionOutcome {
        info!(
            event_name = "lifecycle.transition.declined",
            correlation_id = %ctx.correlation_id,
            entity = %entity,
            record_id = id,
            actor = %ctx.actor,
            "operator declined confirmation, nothing written"
        );
        TransitionOutcome::Declined
    }

    fn already_processed(
        &self,
        ctx: &ActionContext,
        entity: EntityKind,
        id: &str,
        action: LifecycleAction,
    ) -> ApplicationError {
        info!(
            event_name = "lifecycle.transition.already_processed",
            correlation_id = %ctx.correlation_id,
            entity = %entity,
            record_id = id,
            action = %action,
            "filtered write matched no rows"
        );
        ApplicationError::AlreadyProcessed { entity, id: id.to_owned() }
    }

    fn refresh_failed(&self, ctx: &ActionContext, entity: EntityKind, id: &str, detail: &str) {
        warn!(
            event_name = "lifecycle.refresh.failed",
            correlation_id = %ctx.correlation_id,
            entity = %entity,
            record_id = id,
            error = detail,
            "could not re-read record after write, normalizing the local projection"
        );
    }

    fn finish(
        &self,
        ctx: &ActionContext,
        entity: EntityKind,
        id: &str,
        action: LifecycleAction,
        status: NormalizedStatus,
    ) -> TransitionReceipt {
        let receipt = TransitionReceipt {
            entity,
            id: id.to_owned(),
            action,
            status,
            correlation_id: ctx.correlation_id.clone(),
        };
        self.context.refresh.publish(RefreshEvent {
            entity,
            id: receipt.id.clone(),
            action,
            status: receipt.status.clone(),
            correlation_id: receipt.correlation_id.clone(),
        });
        info!(
            event_name = "lifecycle.transition.applied",
            correlation_id = %ctx.correlation_id,
            entity = %entity,
            record_id = id,
            action = %action,
            actor = %ctx.actor,
            display_status = receipt.status.display_status,
            "transition applied"
        );
        receipt
    }

    // Requests

    async fn load_request(&self, id: &RequestId) -> Result<Request, ApplicationError> {
        self.context
            .requests
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| not_found(EntityKind::Request, &id.0))
    }

    async fn write_request(
        &self,
        ctx: &ActionContext,
        request: Request,
        action: LifecycleAction,
        update: RequestUpdate,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let id = request.id.clone();
        let changed = self
            .context
            .requests
            .transition(&id, &RequestStatus::sources(action), update.clone())
            .await
            .map_err(persistence)?;
        if changed == 0 {
            return Err(self.already_processed(ctx, EntityKind::Request, &id.0, action));
        }

        let fresh = match self.context.requests.find_by_id(&id).await {
            Ok(Some(fresh)) => fresh,
            other => {
                if let Err(error) = &other {
                    self.refresh_failed(ctx, EntityKind::Request, &id.0, &error.to_string());
                }
                let mut projected = request;
                projected.status = update.status;
                projected.rejection_reason = update.rejection_reason;
                projected
            }
        };
        if let Err(violation) = fresh.check_invariants() {
            warn!(
                event_name = "lifecycle.request.invariant_violated",
                correlation_id = %ctx.correlation_id,
                record_id = %id,
                error = %violation,
                "request row is inconsistent after the write"
            );
        }
        let status = normalize(RecordRef::Request(&fresh));
        Ok(self.finish(ctx, EntityKind::Request, &id.0, action, status))
    }

    pub async fn approve_request(
        &self,
        ctx: &ActionContext,
        id: &RequestId,
        confirmation: Confirmation,
    ) -> Result<TransitionOutcome, ApplicationError> {
        if confirmation == Confirmation::Declined {
            return Ok(self.declined(ctx, EntityKind::Request, &id.0));
        }
        let _guard = self.acquire(EntityKind::Request, &id.0)?;
        let request = self.load_request(id).await?;
        let next =
            plan_transition(EntityKind::Request, &id.0, request.status, LifecycleAction::Approve)?;

        let mut update = RequestUpdate::to_status(next);
        update.reviewed_by = Some(ctx.actor.clone());
        update.reviewed_at = Some(Utc::now());
        self.write_request(ctx, request, LifecycleAction::Approve, update)
            .await
            .map(TransitionOutcome::Applied)
    }

    pub async fn reject_request(
        &self,
        ctx: &ActionContext,
        id: &RequestId,
        reason: &str,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let reason = require_reason(reason)?;
        let _guard = self.acquire(EntityKind::Request, &id.0)?;
        let request = self.load_request(id).await?;
        let next =
            plan_transition(EntityKind::Request, &id.0, request.status, LifecycleAction::Reject)?;

        let mut update = RequestUpdate::to_status(next);
        update.rejection_reason = Some(reason);
        update.reviewed_by = Some(ctx.actor.clone());
        update.reviewed_at = Some(Utc::now());
        self.write_request(ctx, request, LifecycleAction::Reject, update).await
    }

    pub async fn mark_purchased(
        &self,
        ctx: &ActionContext,
        id: &RequestId,
        amount: Option<Decimal>,
        purchase_date: Option<NaiveDate>,
    ) -> Result<TransitionReceipt, ApplicationError> {
        if amount.map_or(false, |amount| amount <= Decimal::ZERO) {
            return Err(DomainError::MissingFields(vec!["final_purchase_amount".to_string()]).into());
        }
        let _guard = self.acquire(EntityKind::Request, &id.0)?;
        let request = self.load_request(id).await?;
        let next = plan_transition(
            EntityKind::Request,
            &id.0,
            request.status,
            LifecycleAction::MarkPurchased,
        )?;

        let mut update = RequestUpdate::to_status(next);
        update.final_purchase_amount = amount;
        update.purchase_date = purchase_date;
        self.write_request(ctx, request, LifecycleAction::MarkPurchased, update).await
    }

    /// Upload, then insert the receipt row, then flip the request to
    /// purchased. A failure after the upload leaves the object in storage;
    /// the failed step is logged with the object path so it can be cleaned up.
    pub async fn submit_receipt(
        &self,
        ctx: &ActionContext,
        id: &RequestId,
        file: ReceiptFile,
        metadata: ReceiptMetadata,
    ) -> Result<TransitionReceipt, ApplicationError> {
        metadata.validate()?;
        if file.bytes.is_empty() {
            return Err(DomainError::MissingFields(vec!["file".to_string()]).into());
        }
        let action = LifecycleAction::SubmitReceipt;
        let _guard = self.acquire(EntityKind::Request, &id.0)?;
        let request = self.load_request(id).await?;
        if !request.is_offline() {
            return Err(DomainError::InvariantViolation(format!(
                "request {id} is an online purchase and takes no receipt"
            ))
            .into());
        }
        let next = plan_transition(EntityKind::Request, &id.0, request.status, action)?;

        let uploaded_at = Utc::now();
        let bucket = self.context.buckets.receipts_bucket.clone();
        let object_path = receipt_object_path(&request.user_id, &request.id, &file, uploaded_at);
        let file_url =
            self.context.storage.upload(&bucket, &object_path, &file).await.map_err(|error| {
                error!(
                    event_name = "lifecycle.receipt.upload_failed",
                    correlation_id = %ctx.correlation_id,
                    record_id = %id,
                    bucket = %bucket,
                    error = %error,
                    "receipt upload failed, nothing written"
                );
                ApplicationError::Integration(format!("receipt upload failed: {error}"))
            })?;

        let receipt = Receipt {
            id: None,
            request_id: request.id.clone(),
            user_id: request.user_id.clone(),
            file_path: object_path.clone(),
            file_url,
            purchase_date: metadata.purchase_date,
            total_amount: metadata.total_amount,
            purchase_store: metadata.purchase_store.clone(),
            note: metadata.note.clone(),
            uploaded_at,
        };
        if let Err(error) = self.context.receipts.insert(receipt).await {
            self.orphaned(ctx, &bucket, &object_path, "insert_receipt", &error.to_string());
            return Err(persistence(error));
        }

        let mut update = RequestUpdate::to_status(next);
        update.final_purchase_amount = Some(metadata.total_amount);
        update.purchase_date = Some(metadata.purchase_date);
        match self.write_request(ctx, request, action, update).await {
            Ok(receipt) => Ok(receipt),
            Err(error) => {
                self.orphaned(ctx, &bucket, &object_path, "flip_status", &error.to_string());
                Err(error)
            }
        }
    }

    fn orphaned(&self, ctx: &ActionContext, bucket: &str, object_path: &str, step: &str, detail: &str) {
        error!(
            event_name = "lifecycle.receipt.orphaned_object",
            correlation_id = %ctx.correlation_id,
            bucket,
            object_path,
            failed_step = step,
            error = detail,
            "receipt object stored but the purchase was not completed"
        );
    }

    // Lesson plans

    async fn load_lesson_plan(&self, user_id: &UserId) -> Result<LessonPlan, ApplicationError> {
        self.context
            .lesson_plans
            .find_by_user(user_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| not_found(EntityKind::LessonPlan, &user_id.0))
    }

    async fn write_lesson_plan(
        &self,
        ctx: &ActionContext,
        plan: LessonPlan,
        action: LifecycleAction,
        update: LessonPlanUpdate,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let user_id = plan.user_id.clone();
        let changed = self
            .context
            .lesson_plans
            .transition(&user_id, &LessonPlanStatus::sources(action), update.clone())
            .await
            .map_err(persistence)?;
        if changed == 0 {
            return Err(self.already_processed(ctx, EntityKind::LessonPlan, &user_id.0, action));
        }

        let fresh = match self.context.lesson_plans.find_by_user(&user_id).await {
            Ok(Some(fresh)) => fresh,
            other => {
                if let Err(error) = &other {
                    self.refresh_failed(ctx, EntityKind::LessonPlan, &user_id.0, &error.to_string());
                }
                let mut projected = plan;
                projected.status = update.status;
                projected.rejection_reason = update.rejection_reason;
                projected
            }
        };
        let status = normalize(RecordRef::LessonPlan(&fresh));
        Ok(self.finish(ctx, EntityKind::LessonPlan, &user_id.0, action, status))
    }

    pub async fn approve_lesson_plan(
        &self,
        ctx: &ActionContext,
        user_id: &UserId,
        confirmation: Confirmation,
    ) -> Result<TransitionOutcome, ApplicationError> {
        if confirmation == Confirmation::Declined {
            return Ok(self.declined(ctx, EntityKind::LessonPlan, &user_id.0));
        }
        let _guard = self.acquire(EntityKind::LessonPlan, &user_id.0)?;
        let plan = self.load_lesson_plan(user_id).await?;
        let next = plan_transition(
            EntityKind::LessonPlan,
            &user_id.0,
            plan.status,
            LifecycleAction::Approve,
        )?;
        let update = LessonPlanUpdate { status: next, rejection_reason: None, submitted_at: None };
        self.write_lesson_plan(ctx, plan, LifecycleAction::Approve, update)
            .await
            .map(TransitionOutcome::Applied)
    }

    pub async fn reject_lesson_plan(
        &self,
        ctx: &ActionContext,
        user_id: &UserId,
        reason: &str,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let reason = require_reason(reason)?;
        let _guard = self.acquire(EntityKind::LessonPlan, &user_id.0)?;
        let plan = self.load_lesson_plan(user_id).await?;
        let next = plan_transition(
            EntityKind::LessonPlan,
            &user_id.0,
            plan.status,
            LifecycleAction::Reject,
        )?;
        let update =
            LessonPlanUpdate { status: next, rejection_reason: Some(reason), submitted_at: None };
        self.write_lesson_plan(ctx, plan, LifecycleAction::Reject, update).await
    }

    /// Draft or rejected plans go to `submitted`; the old reason is cleared.
    pub async fn submit_lesson_plan(
        &self,
        ctx: &ActionContext,
        user_id: &UserId,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let _guard = self.acquire(EntityKind::LessonPlan, &user_id.0)?;
        let plan = self.load_lesson_plan(user_id).await?;
        if !plan.is_editable() {
            return Err(ApplicationError::AlreadyProcessed {
                entity: EntityKind::LessonPlan,
                id: user_id.0.clone(),
            });
        }
        let next = plan_transition(
            EntityKind::LessonPlan,
            &user_id.0,
            plan.status,
            LifecycleAction::Submit,
        )?;
        let update = LessonPlanUpdate {
            status: next,
            rejection_reason: None,
            submitted_at: Some(Utc::now()),
        };
        self.write_lesson_plan(ctx, plan, LifecycleAction::Submit, update).await
    }

    // Flight requests

    async fn load_flight(&self, id: &FlightRequestId) -> Result<FlightRequest, ApplicationError> {
        self.context
            .flights
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| not_found(EntityKind::FlightRequest, &id.0))
    }

    async fn refreshed_flight(
        &self,
        ctx: &ActionContext,
        projected: FlightRequest,
    ) -> NormalizedStatus {
        let fresh = match self.context.flights.find_by_id(&projected.id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => projected,
            Err(error) => {
                self.refresh_failed(ctx, EntityKind::FlightRequest, &projected.id.0, &error.to_string());
                projected
            }
        };
        normalize(RecordRef::FlightRequest(&fresh))
    }

    async fn write_flight(
        &self,
        ctx: &ActionContext,
        flight: FlightRequest,
        action: LifecycleAction,
        update: FlightUpdate,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let changed = self
            .context
            .flights
            .transition(&flight.id, &FlightStatus::sources(action), update.clone())
            .await
            .map_err(persistence)?;
        if changed == 0 {
            return Err(self.already_processed(ctx, EntityKind::FlightRequest, &flight.id.0, action));
        }

        let id = flight.id.clone();
        let mut projected = flight;
        projected.status = update.status;
        projected.rejection_reason = update.rejection_reason;
        let status = self.refreshed_flight(ctx, projected).await;
        Ok(self.finish(ctx, EntityKind::FlightRequest, &id.0, action, status))
    }

    pub async fn approve_flight(
        &self,
        ctx: &ActionContext,
        id: &FlightRequestId,
        confirmation: Confirmation,
    ) -> Result<TransitionOutcome, ApplicationError> {
        if confirmation == Confirmation::Declined {
            return Ok(self.declined(ctx, EntityKind::FlightRequest, &id.0));
        }
        let _guard = self.acquire(EntityKind::FlightRequest, &id.0)?;
        let flight = self.load_flight(id).await?;
        let next = plan_transition(
            EntityKind::FlightRequest,
            &id.0,
            flight.status,
            LifecycleAction::Approve,
        )?;
        let update = FlightUpdate { status: next, rejection_reason: None };
        self.write_flight(ctx, flight, LifecycleAction::Approve, update)
            .await
            .map(TransitionOutcome::Applied)
    }

    pub async fn reject_flight(
        &self,
        ctx: &ActionContext,
        id: &FlightRequestId,
        reason: &str,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let reason = require_reason(reason)?;
        let _guard = self.acquire(EntityKind::FlightRequest, &id.0)?;
        let flight = self.load_flight(id).await?;
        let next = plan_transition(
            EntityKind::FlightRequest,
            &id.0,
            flight.status,
            LifecycleAction::Reject,
        )?;
        let update = FlightUpdate { status: next, rejection_reason: Some(reason) };
        self.write_flight(ctx, flight, LifecycleAction::Reject, update).await
    }

    pub async fn complete_flight(
        &self,
        ctx: &ActionContext,
        id: &FlightRequestId,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let _guard = self.acquire(EntityKind::FlightRequest, &id.0)?;
        let flight = self.load_flight(id).await?;
        let next = plan_transition(
            EntityKind::FlightRequest,
            &id.0,
            flight.status,
            LifecycleAction::Complete,
        )?;
        let update = FlightUpdate { status: next, rejection_reason: None };
        self.write_flight(ctx, flight, LifecycleAction::Complete, update).await
    }

    /// Decides the special baggage sub-request without touching the flight's
    /// own status. Rejection needs a reason like every other rejection.
    pub async fn decide_baggage(
        &self,
        ctx: &ActionContext,
        id: &FlightRequestId,
        approve: bool,
        reason: Option<&str>,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let (action, rejection_reason) = if approve {
            (LifecycleAction::ApproveSpecialRequest, None)
        } else {
            (LifecycleAction::RejectSpecialRequest, Some(require_reason(reason.unwrap_or_default())?))
        };
        let _guard = self.acquire(EntityKind::FlightRequest, &id.0)?;
        let flight = self.load_flight(id).await?;
        let Some(baggage) = flight.special_baggage.as_ref() else {
            return Err(DomainError::InvariantViolation(format!(
                "flight request {id} has no special baggage request"
            ))
            .into());
        };
        let next = plan_transition(EntityKind::FlightRequest, &id.0, baggage.status, action)?;

        let decision = BaggageDecision { status: next, rejection_reason: rejection_reason.clone() };
        let changed = self
            .context
            .flights
            .decide_baggage(id, &BaggageStatus::sources(action), decision)
            .await
            .map_err(persistence)?;
        if changed == 0 {
            return Err(self.already_processed(ctx, EntityKind::FlightRequest, &id.0, action));
        }

        let mut projected = flight;
        if let Some(baggage) = projected.special_baggage.as_mut() {
            baggage.status = next;
            baggage.rejection_reason = rejection_reason;
        }
        let status = self.refreshed_flight(ctx, projected).await;
        Ok(self.finish(ctx, EntityKind::FlightRequest, &id.0, action, status))
    }

    // Budgets

    /// Reviews the special budget request on a student's budget row. The
    /// rejection reason is stored for the student; approval clears it.
    pub async fn decide_special_request(
        &self,
        ctx: &ActionContext,
        user_id: &UserId,
        approve: bool,
        reason: Option<&str>,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let (action, rejection_reason) = if approve {
            (LifecycleAction::ApproveSpecialRequest, None)
        } else {
            (LifecycleAction::RejectSpecialRequest, Some(require_reason(reason.unwrap_or_default())?))
        };
        let entity = EntityKind::StudentBudget;
        let _guard = self.acquire(entity, &user_id.0)?;
        let budget = self
            .context
            .budgets
            .find_by_user(user_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| not_found(entity, &user_id.0))?;
        let Some(current) = budget.special_request_status else {
            return Err(DomainError::InvariantViolation(format!(
                "student budget {user_id} has no special request"
            ))
            .into());
        };
        let next = plan_transition(entity, &user_id.0, current, action)?;

        let changed = self
            .context
            .budgets
            .decide_special_request(
                user_id,
                &SpecialRequestStatus::sources(action),
                SpecialRequestDecision { status: next, rejection_reason: rejection_reason.clone() },
            )
            .await
            .map_err(persistence)?;
        if changed == 0 {
            return Err(self.already_processed(ctx, entity, &user_id.0, action));
        }

        let fresh = match self.context.budgets.find_by_user(user_id).await {
            Ok(Some(fresh)) => fresh,
            other => {
                if let Err(error) = &other {
                    self.refresh_failed(ctx, entity, &user_id.0, &error.to_string());
                }
                StudentBudget {
                    special_request_status: Some(next),
                    special_request_rejection_reason: rejection_reason,
                    ..budget
                }
            }
        };
        let status = normalize(RecordRef::StudentBudget(&fresh));
        Ok(self.finish(ctx, entity, &user_id.0, action, status))
    }

    // Institutes and exam questions

    pub async fn set_catalog_status(
        &self,
        ctx: &ActionContext,
        kind: CatalogKind,
        id: &str,
        activate: bool,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let action = if activate { LifecycleAction::Activate } else { LifecycleAction::Deactivate };
        let entity = match kind {
            CatalogKind::Institute => EntityKind::Institute,
            CatalogKind::ExamQuestion => EntityKind::ExamQuestion,
        };
        let _guard = self.acquire(entity, id)?;
        let current = self.catalog_status(kind, id).await?.ok_or_else(|| not_found(entity, id))?;
        let next = plan_transition(entity, id, current, action)?;

        let changed = self
            .context
            .catalog
            .set_status(kind, id, &ActiveStatus::sources(action), next)
            .await
            .map_err(persistence)?;
        if changed == 0 {
            return Err(self.already_processed(ctx, entity, id, action));
        }

        let status = match self.catalog_normalized(kind, id).await {
            Ok(Some(status)) => status,
            other => {
                if let Err(error) = &other {
                    self.refresh_failed(ctx, entity, id, &error.to_string());
                }
                normalize_active_projection(kind, id, next)
            }
        };
        Ok(self.finish(ctx, entity, id, action, status))
    }

    async fn catalog_status(
        &self,
        kind: CatalogKind,
        id: &str,
    ) -> Result<Option<ActiveStatus>, ApplicationError> {
        let status = match kind {
            CatalogKind::Institute => {
                self.context.catalog.find_institute(id).await.map_err(persistence)?.map(|i| i.status)
            }
            CatalogKind::ExamQuestion => self
                .context
                .catalog
                .find_exam_question(id)
                .await
                .map_err(persistence)?
                .map(|q| q.status),
        };
        Ok(status)
    }

    async fn catalog_normalized(
        &self,
        kind: CatalogKind,
        id: &str,
    ) -> Result<Option<NormalizedStatus>, RepositoryError> {
        Ok(match kind {
            CatalogKind::Institute => self
                .context
                .catalog
                .find_institute(id)
                .await?
                .map(|institute| normalize(RecordRef::Institute(&institute))),
            CatalogKind::ExamQuestion => self
                .context
                .catalog
                .find_exam_question(id)
                .await?
                .map(|question| normalize(RecordRef::ExamQuestion(&question))),
        })
    }

    // Dispatch by record kind, for callers that only hold a kind and an id.

    pub async fn approve(
        &self,
        ctx: &ActionContext,
        kind: RecordKind,
        id: &str,
        confirmation: Confirmation,
    ) -> Result<TransitionOutcome, ApplicationError> {
        match kind {
            RecordKind::Request => {
                self.approve_request(ctx, &RequestId(id.to_owned()), confirmation).await
            }
            RecordKind::LessonPlan => {
                self.approve_lesson_plan(ctx, &UserId(id.to_owned()), confirmation).await
            }
            RecordKind::FlightRequest => {
                self.approve_flight(ctx, &FlightRequestId(id.to_owned()), confirmation).await
            }
            RecordKind::StudentBudget => {
                if confirmation == Confirmation::Declined {
                    return Ok(self.declined(ctx, EntityKind::StudentBudget, id));
                }
                self.decide_special_request(ctx, &UserId(id.to_owned()), true, None)
                    .await
                    .map(TransitionOutcome::Applied)
            }
            RecordKind::Institute | RecordKind::ExamQuestion => Err(not_reviewable(kind)),
        }
    }

    pub async fn reject(
        &self,
        ctx: &ActionContext,
        kind: RecordKind,
        id: &str,
        reason: &str,
    ) -> Result<TransitionReceipt, ApplicationError> {
        match kind {
            RecordKind::Request => self.reject_request(ctx, &RequestId(id.to_owned()), reason).await,
            RecordKind::LessonPlan => {
                self.reject_lesson_plan(ctx, &UserId(id.to_owned()), reason).await
            }
            RecordKind::FlightRequest => {
                self.reject_flight(ctx, &FlightRequestId(id.to_owned()), reason).await
            }
            RecordKind::StudentBudget => {
                self.decide_special_request(ctx, &UserId(id.to_owned()), false, Some(reason)).await
            }
            RecordKind::Institute | RecordKind::ExamQuestion => Err(not_reviewable(kind)),
        }
    }
}

fn not_reviewable(kind: RecordKind) -> ApplicationError {
    DomainError::InvariantViolation(format!(
        "{kind:?} records are activated or deactivated, not approved or rejected"
    ))
    .into()
}

fn normalize_active_projection(kind: CatalogKind, id: &str, status: ActiveStatus) -> NormalizedStatus {
    use sejong_core::domain::catalog::{ExamQuestion, Institute};

    match kind {
        CatalogKind::Institute => normalize(RecordRef::Institute(&Institute {
            id: id.to_owned(),
            name: String::new(),
            field: None,
            address: None,
            contact: None,
            status,
        })),
        CatalogKind::ExamQuestion => normalize(RecordRef::ExamQuestion(&ExamQuestion {
            id: id.to_owned(),
            question_text: String::new(),
            choices: Vec::new(),
            correct_answer: None,
            status,
            order_index: 0,
        })),
    }
}
