use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use sejong_core::domain::budget::{SpecialRequestStatus, StudentBudget};
use sejong_core::domain::catalog::{ActiveStatus, Institute};
use sejong_core::domain::flight::{
    BaggageStatus, FlightPurchaseType, FlightRequest, FlightRequestId, FlightStatus,
    SpecialBaggageRequest,
};
use sejong_core::domain::lesson_plan::{LessonPlan, LessonPlanStatus, LessonSchedule};
use sejong_core::domain::receipt::{ReceiptFile, ReceiptMetadata};
use sejong_core::domain::request::{PurchaseChannel, Request, RequestId, RequestStatus};
use sejong_core::domain::student::UserId;
use sejong_core::errors::{ApplicationError, DomainError, InterfaceError};
use sejong_core::lifecycle::{EntityKind, LifecycleAction};
use sejong_core::status::{AvailableAction, RecordKind};
use sejong_db::repositories::{
    BudgetRepository, CatalogKind, CatalogRepository, FlightRequestRepository,
    LessonPlanRepository, ReceiptRepository, RepositoryError, RequestFilter, RequestRepository,
    RequestUpdate,
};
use sejong_service::{ActionContext, Confirmation, LifecycleHandler, MemoryBackend};

fn admin() -> ActionContext {
    ActionContext::new("admin").with_correlation_id("corr-flow")
}

fn request(id: &str, status: RequestStatus, channel: PurchaseChannel) -> Request {
    Request {
        id: RequestId(id.to_string()),
        user_id: UserId("u-1".to_string()),
        item_name: "한복 대여".to_string(),
        purpose: "문화 수업".to_string(),
        price: Decimal::new(80_000, 0),
        purchase_type: channel,
        is_bundle: false,
        link: None,
        store_info: None,
        account_id: None,
        status,
        rejection_reason: None,
        reviewed_by: None,
        reviewed_at: None,
        final_purchase_amount: None,
        purchase_date: None,
        created_at: None,
        updated_at: None,
    }
}

fn lesson_plan(status: LessonPlanStatus, rejection_reason: Option<&str>) -> LessonPlan {
    LessonPlan {
        user_id: UserId("u-1".to_string()),
        status,
        rejection_reason: rejection_reason.map(str::to_string),
        schedule: LessonSchedule { total_lessons: 24, ..LessonSchedule::default() },
        submitted_at: None,
        created_at: None,
        updated_at: None,
    }
}

fn flight(status: FlightStatus, baggage: Option<BaggageStatus>) -> FlightRequest {
    FlightRequest {
        id: FlightRequestId("f-1".to_string()),
        user_id: UserId("u-1".to_string()),
        status,
        purchase_type: FlightPurchaseType::Direct,
        departure_date: NaiveDate::from_ymd_opt(2024, 8, 20),
        return_date: NaiveDate::from_ymd_opt(2025, 1, 10),
        departure_airport: Some("ICN".to_string()),
        arrival_airport: Some("WAW".to_string()),
        ticket_price: Decimal::new(1_250_000, 0),
        ticket_url: None,
        rejection_reason: None,
        special_baggage: baggage.map(|status| SpecialBaggageRequest {
            status,
            amount: Some(Decimal::new(100_000, 0)),
            reason: Some("교구 운반".to_string()),
            rejection_reason: None,
        }),
        created_at: None,
        updated_at: None,
    }
}

fn receipt_file() -> ReceiptFile {
    ReceiptFile {
        file_name: "영수증.PNG".to_string(),
        content_type: "image/png".to_string(),
        bytes: vec![0x89, 0x50, 0x4e, 0x47],
    }
}

fn receipt_metadata() -> ReceiptMetadata {
    ReceiptMetadata {
        purchase_date: NaiveDate::from_ymd_opt(2024, 3, 11).expect("date"),
        total_amount: Decimal::new(78_500, 0),
        purchase_store: Some("인사동 한복집".to_string()),
        note: None,
    }
}

#[tokio::test]
async fn approving_twice_reports_already_processed_without_a_second_write() {
    let backend = MemoryBackend::default();
    backend.requests.insert(request("r-1", RequestStatus::Pending, PurchaseChannel::Online)).await;
    let context = backend.context();
    let mut refreshes = context.refresh.subscribe();
    let handler = LifecycleHandler::new(context);
    let id = RequestId("r-1".to_string());

    let first = handler.approve_request(&admin(), &id, Confirmation::Confirmed).await.expect("approve");
    let receipt = first.receipt().expect("applied");
    assert_eq!(receipt.status.display_status, "승인됨");
    assert!(receipt.status.allows(AvailableAction::MarkPurchased));

    let event = refreshes.try_recv().expect("refresh published");
    assert_eq!(event.entity, EntityKind::Request);
    assert_eq!(event.action, LifecycleAction::Approve);
    assert_eq!(event.correlation_id, "corr-flow");

    let second = handler
        .approve_request(&admin(), &id, Confirmation::Confirmed)
        .await
        .expect_err("second approval");
    assert!(matches!(second, ApplicationError::AlreadyProcessed { .. }));
    assert!(refreshes.try_recv().is_err(), "no refresh for a no-op");

    let interface = second.into_interface("corr-flow");
    assert!(matches!(interface, InterfaceError::AlreadyProcessed { .. }));

    let stored = backend.requests.find_by_id(&id).await.expect("find").expect("stored");
    assert_eq!(stored.status, RequestStatus::Approved);
    assert_eq!(stored.reviewed_by.as_deref(), Some("admin"));
    assert!(stored.reviewed_at.is_some());
}

#[tokio::test]
async fn rejection_requires_a_reason_and_records_it() {
    let backend = MemoryBackend::default();
    backend.requests.insert(request("r-1", RequestStatus::Pending, PurchaseChannel::Online)).await;
    let handler = LifecycleHandler::new(backend.context());
    let id = RequestId("r-1".to_string());

    let blank = handler.reject_request(&admin(), &id, "   ").await.expect_err("blank reason");
    assert!(matches!(blank, ApplicationError::Domain(DomainError::ReasonRequired)));
    let untouched = backend.requests.find_by_id(&id).await.expect("find").expect("stored");
    assert_eq!(untouched.status, RequestStatus::Pending);

    let receipt = handler.reject_request(&admin(), &id, " 예산 초과 ").await.expect("reject");
    assert_eq!(receipt.status.display_status, "반려됨");

    let stored = backend.requests.find_by_id(&id).await.expect("find").expect("stored");
    assert_eq!(stored.status, RequestStatus::Rejected);
    assert_eq!(stored.rejection_reason.as_deref(), Some("예산 초과"));
}

#[tokio::test]
async fn offline_receipt_uploads_records_and_completes_the_purchase() {
    let backend = MemoryBackend::default();
    backend.requests.insert(request("r-1", RequestStatus::Approved, PurchaseChannel::Offline)).await;
    let handler = LifecycleHandler::new(backend.context());
    let id = RequestId("r-1".to_string());

    let receipt = handler
        .submit_receipt(&admin(), &id, receipt_file(), receipt_metadata())
        .await
        .expect("submit receipt");

    assert_eq!(receipt.status.display_status, "구매완료");
    assert_eq!(receipt.status.available_actions, vec![AvailableAction::ViewReceipt]);

    let keys = backend.storage.keys().await;
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("receipt-files/u-1/receipt_r-1_"));
    assert!(keys[0].ends_with(".png"));

    let stored_receipt =
        backend.receipts.find_by_request(&id).await.expect("find").expect("receipt row");
    assert_eq!(stored_receipt.total_amount, Decimal::new(78_500, 0));
    assert!(stored_receipt.file_url.ends_with(&keys[0]));

    let stored = backend.requests.find_by_id(&id).await.expect("find").expect("stored");
    assert_eq!(stored.status, RequestStatus::Purchased);
    assert_eq!(stored.final_purchase_amount, Some(Decimal::new(78_500, 0)));
    assert_eq!(stored.purchase_date, NaiveDate::from_ymd_opt(2024, 3, 11));
}

#[tokio::test]
async fn receipt_row_failure_leaves_the_object_and_the_request_status() {
    let backend = MemoryBackend::default();
    backend.requests.insert(request("r-1", RequestStatus::Approved, PurchaseChannel::Offline)).await;
    backend.receipts.set_unavailable(true);
    let handler = LifecycleHandler::new(backend.context());
    let id = RequestId("r-1".to_string());

    let error = handler
        .submit_receipt(&admin(), &id, receipt_file(), receipt_metadata())
        .await
        .expect_err("receipt insert fails");

    assert!(matches!(error, ApplicationError::Persistence(_)));
    assert_eq!(backend.storage.keys().await.len(), 1, "uploaded object is left behind");
    let stored = backend.requests.find_by_id(&id).await.expect("find").expect("stored");
    assert_eq!(stored.status, RequestStatus::Approved);
}

#[tokio::test]
async fn receipt_metadata_is_validated_before_anything_is_sent() {
    let backend = MemoryBackend::default();
    backend.requests.insert(request("r-1", RequestStatus::Approved, PurchaseChannel::Offline)).await;
    let handler = LifecycleHandler::new(backend.context());

    let mut metadata = receipt_metadata();
    metadata.total_amount = Decimal::ZERO;
    let error = handler
        .submit_receipt(&admin(), &RequestId("r-1".to_string()), receipt_file(), metadata)
        .await
        .expect_err("zero amount");

    assert!(matches!(error, ApplicationError::Domain(DomainError::MissingFields(_))));
    assert!(backend.storage.keys().await.is_empty());
}

#[tokio::test]
async fn rejected_lesson_plan_is_resubmitted_then_approved() {
    let backend = MemoryBackend::default();
    backend.lesson_plans.insert(lesson_plan(LessonPlanStatus::Rejected, Some("수업 수 부족"))).await;
    let handler = LifecycleHandler::new(backend.context());
    let user = UserId("u-1".to_string());

    let direct = handler
        .approve_lesson_plan(&admin(), &user, Confirmation::Confirmed)
        .await
        .expect_err("a rejected plan was already reviewed");
    assert!(matches!(direct, ApplicationError::AlreadyProcessed { .. }));

    let submitted = handler.submit_lesson_plan(&admin(), &user).await.expect("resubmit");
    assert_eq!(submitted.status.display_status, "승인 대기");
    let stored = backend.lesson_plans.find_by_user(&user).await.expect("find").expect("plan");
    assert_eq!(stored.status, LessonPlanStatus::Submitted);
    assert_eq!(stored.rejection_reason, None);
    assert!(stored.submitted_at.is_some());

    let approved = handler
        .approve_lesson_plan(&admin(), &user, Confirmation::Confirmed)
        .await
        .expect("approve");
    assert_eq!(approved.receipt().map(|r| r.status.display_status), Some("승인됨"));
}

#[tokio::test]
async fn flight_baggage_is_decided_separately_from_the_ticket() {
    let backend = MemoryBackend::default();
    backend.flights.insert(flight(FlightStatus::Pending, Some(BaggageStatus::Pending))).await;
    let handler = LifecycleHandler::new(backend.context());
    let id = FlightRequestId("f-1".to_string());

    let missing_reason =
        handler.decide_baggage(&admin(), &id, false, None).await.expect_err("reason required");
    assert!(matches!(missing_reason, ApplicationError::Domain(DomainError::ReasonRequired)));

    let decided = handler.decide_baggage(&admin(), &id, true, None).await.expect("approve baggage");
    assert!(!decided.status.allows(AvailableAction::SpecialBaggage));
    assert!(decided.status.allows(AvailableAction::Approve));

    let stored = backend.flights.find_by_id(&id).await.expect("find").expect("flight");
    assert_eq!(stored.status, FlightStatus::Pending);
    assert_eq!(stored.special_baggage.map(|b| b.status), Some(BaggageStatus::Approved));

    handler.approve_flight(&admin(), &id, Confirmation::Confirmed).await.expect("approve flight");
    let completed = handler.complete_flight(&admin(), &id).await.expect("complete");
    assert_eq!(completed.status.display_status, "구매완료");
}

#[tokio::test]
async fn flight_without_baggage_request_cannot_have_one_decided() {
    let backend = MemoryBackend::default();
    backend.flights.insert(flight(FlightStatus::Approved, None)).await;
    let handler = LifecycleHandler::new(backend.context());

    let error = handler
        .decide_baggage(&admin(), &FlightRequestId("f-1".to_string()), true, None)
        .await
        .expect_err("no baggage request");
    assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
}

#[tokio::test]
async fn special_budget_request_is_reviewed_through_the_dispatcher() {
    let backend = MemoryBackend::default();
    backend
        .budgets
        .insert_budget(StudentBudget {
            user_id: UserId("u-1".to_string()),
            field: Some("한국어교육".to_string()),
            allocated_budget: Decimal::new(400_000, 0),
            used_budget: Decimal::ZERO,
            special_request_amount: Some(Decimal::new(50_000, 0)),
            special_request_status: Some(SpecialRequestStatus::Pending),
            special_request_rejection_reason: None,
        })
        .await;
    let handler = LifecycleHandler::new(backend.context());
    let user = UserId("u-1".to_string());

    let blank = handler
        .reject(&admin(), RecordKind::StudentBudget, "u-1", "  ")
        .await
        .expect_err("reason required");
    assert!(matches!(blank, ApplicationError::Domain(DomainError::ReasonRequired)));

    let rejected = handler
        .reject(&admin(), RecordKind::StudentBudget, "u-1", " 증빙 서류 미제출 ")
        .await
        .expect("reject special request");
    assert_eq!(rejected.status.display_status, "반려됨");
    let stored = backend.budgets.find_by_user(&user).await.expect("find").expect("budget");
    assert_eq!(stored.special_request_status, Some(SpecialRequestStatus::Rejected));
    assert_eq!(stored.special_request_rejection_reason.as_deref(), Some("증빙 서류 미제출"));

    let again = handler
        .approve(&admin(), RecordKind::StudentBudget, "u-1", Confirmation::Confirmed)
        .await
        .expect_err("already decided");
    assert!(matches!(again, ApplicationError::AlreadyProcessed { .. }));
}

#[tokio::test]
async fn approving_a_special_request_clears_any_reason() {
    let backend = MemoryBackend::default();
    backend
        .budgets
        .insert_budget(StudentBudget {
            user_id: UserId("u-1".to_string()),
            field: None,
            allocated_budget: Decimal::new(400_000, 0),
            used_budget: Decimal::ZERO,
            special_request_amount: Some(Decimal::new(30_000, 0)),
            special_request_status: Some(SpecialRequestStatus::Pending),
            special_request_rejection_reason: Some("이전 반려 사유".to_string()),
        })
        .await;
    let handler = LifecycleHandler::new(backend.context());

    let outcome = handler
        .approve(&admin(), RecordKind::StudentBudget, "u-1", Confirmation::Confirmed)
        .await
        .expect("approve special request");
    assert_eq!(outcome.receipt().map(|r| r.status.display_status), Some("승인됨"));

    let stored = backend
        .budgets
        .find_by_user(&UserId("u-1".to_string()))
        .await
        .expect("find")
        .expect("budget");
    assert_eq!(stored.special_request_rejection_reason, None);
}

#[tokio::test]
async fn institutes_toggle_between_active_and_inactive() {
    let backend = MemoryBackend::default();
    backend
        .catalog
        .insert_institute(Institute {
            id: "inst-1".to_string(),
            name: "바르샤바 세종학당".to_string(),
            field: Some("한국어교육".to_string()),
            address: None,
            contact: None,
            status: ActiveStatus::Active,
        })
        .await;
    let handler = LifecycleHandler::new(backend.context());

    let deactivated = handler
        .set_catalog_status(&admin(), CatalogKind::Institute, "inst-1", false)
        .await
        .expect("deactivate");
    assert_eq!(deactivated.status.display_status, "비활성");
    assert!(deactivated.status.allows(AvailableAction::Activate));

    let again = handler
        .set_catalog_status(&admin(), CatalogKind::Institute, "inst-1", false)
        .await
        .expect_err("already inactive");
    assert!(matches!(again, ApplicationError::AlreadyProcessed { .. }));

    let reviewed = handler
        .approve(&admin(), RecordKind::Institute, "inst-1", Confirmation::Confirmed)
        .await
        .expect_err("institutes are not reviewed");
    assert!(matches!(reviewed, ApplicationError::Domain(DomainError::InvariantViolation(_))));

    let stored = backend.catalog.find_institute("inst-1").await.expect("find").expect("institute");
    assert_eq!(stored.status, ActiveStatus::Inactive);
}

#[tokio::test]
async fn unknown_record_is_not_found() {
    let backend = MemoryBackend::default();
    let handler = LifecycleHandler::new(backend.context());

    let error = handler
        .approve(&admin(), RecordKind::Request, "missing", Confirmation::Confirmed)
        .await
        .expect_err("missing");
    assert!(matches!(error, ApplicationError::NotFound { entity: EntityKind::Request, .. }));
}

/// Reads the record back as pending but never matches it on write, as when
/// another operator decides the request between the read and the write.
struct ConcurrentlyDecided {
    inner: Arc<sejong_db::repositories::InMemoryRequestRepository>,
}

#[async_trait]
impl RequestRepository for ConcurrentlyDecided {
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError> {
        self.inner.list(filter).await
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn transition(
        &self,
        _id: &RequestId,
        _from: &[RequestStatus],
        _update: RequestUpdate,
    ) -> Result<u64, RepositoryError> {
        Ok(0)
    }
}

#[tokio::test]
async fn write_matching_no_rows_is_already_processed_and_publishes_nothing() {
    let backend = MemoryBackend::default();
    backend.requests.insert(request("r-1", RequestStatus::Pending, PurchaseChannel::Online)).await;
    let mut context = backend.context();
    context.requests = Arc::new(ConcurrentlyDecided { inner: backend.requests.clone() });
    let mut refreshes = context.refresh.subscribe();
    let handler = LifecycleHandler::new(context);
    let id = RequestId("r-1".to_string());

    let error = handler
        .approve_request(&admin(), &id, Confirmation::Confirmed)
        .await
        .expect_err("write matched nothing");
    assert_eq!(
        error,
        ApplicationError::AlreadyProcessed { entity: EntityKind::Request, id: "r-1".to_string() }
    );
    assert!(refreshes.try_recv().is_err(), "nothing published for a no-op write");

    let rejected = handler.reject_request(&admin(), &id, "예산 초과").await.expect_err("no rows");
    assert!(matches!(rejected, ApplicationError::AlreadyProcessed { .. }));
    assert!(refreshes.try_recv().is_err());

    let stored = backend.requests.find_by_id(&id).await.expect("find").expect("stored");
    assert_eq!(stored.status, RequestStatus::Pending);
}

#[tokio::test]
async fn record_with_unknown_status_cannot_be_reviewed() {
    let backend = MemoryBackend::default();
    backend.requests.insert(request("r-1", RequestStatus::Unknown, PurchaseChannel::Online)).await;
    backend.flights.insert(flight(FlightStatus::Unknown, None)).await;
    let context = backend.context();
    let mut refreshes = context.refresh.subscribe();
    let handler = LifecycleHandler::new(context);

    let request_error = handler
        .approve(&admin(), RecordKind::Request, "r-1", Confirmation::Confirmed)
        .await
        .expect_err("unknown request status");
    assert!(matches!(
        request_error,
        ApplicationError::Domain(DomainError::InvalidTransition { from: "unknown", .. })
    ));

    let flight_error = handler
        .reject(&admin(), RecordKind::FlightRequest, "f-1", "일정 변경")
        .await
        .expect_err("unknown flight status");
    assert!(matches!(
        flight_error,
        ApplicationError::Domain(DomainError::InvalidTransition { from: "unknown", .. })
    ));
    assert!(refreshes.try_recv().is_err());

    let stored = backend
        .requests
        .find_by_id(&RequestId("r-1".to_string()))
        .await
        .expect("find")
        .expect("stored");
    assert_eq!(stored.status, RequestStatus::Unknown);
}

#[tokio::test]
async fn online_request_takes_no_receipt() {
    let backend = MemoryBackend::default();
    backend.requests.insert(request("r-1", RequestStatus::Approved, PurchaseChannel::Online)).await;
    let handler = LifecycleHandler::new(backend.context());
    let id = RequestId("r-1".to_string());

    let error = handler
        .submit_receipt(&admin(), &id, receipt_file(), receipt_metadata())
        .await
        .expect_err("online purchase");
    assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
    assert!(backend.storage.keys().await.is_empty(), "nothing uploaded");

    let stored = backend.requests.find_by_id(&id).await.expect("find").expect("stored");
    assert_eq!(stored.status, RequestStatus::Approved);
}

#[tokio::test]
async fn submitted_lesson_plan_is_not_editable() {
    let backend = MemoryBackend::default();
    backend.lesson_plans.insert(lesson_plan(LessonPlanStatus::Submitted, None)).await;
    let handler = LifecycleHandler::new(backend.context());
    let user = UserId("u-1".to_string());

    let error = handler.submit_lesson_plan(&admin(), &user).await.expect_err("already submitted");
    assert!(matches!(
        error,
        ApplicationError::AlreadyProcessed { entity: EntityKind::LessonPlan, .. }
    ));

    let stored = backend.lesson_plans.find_by_user(&user).await.expect("find").expect("plan");
    assert_eq!(stored.status, LessonPlanStatus::Submitted);
    assert_eq!(stored.submitted_at, None);
}
