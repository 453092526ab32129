use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use sejong_core::domain::budget::{FieldRate, SpecialRequestStatus, StudentBudget};
use sejong_core::domain::catalog::{
    ActiveStatus, ExamQuestion, FeatureSetting, Institute, SystemSetting,
};
use sejong_core::domain::flight::{BaggageStatus, FlightRequest, FlightRequestId, FlightStatus};
use sejong_core::domain::lesson_plan::{LessonPlan, LessonPlanStatus};
use sejong_core::domain::receipt::{Receipt, ReceiptFile};
use sejong_core::domain::request::{Request, RequestId, RequestStatus};
use sejong_core::domain::student::{StudentProfile, UserId};

use super::{
    BaggageDecision, BudgetRepository, CatalogKind, CatalogRepository, FlightRequestFilter,
    FlightRequestRepository, FlightUpdate, LessonPlanRepository, LessonPlanUpdate, ObjectStorage,
    ProfileRepository, ReceiptRepository, RepositoryError, RequestFilter, RequestRepository,
    RequestUpdate, SettingsRepository, SpecialRequestDecision,
};

/// Simulated outage switch for the in-memory stores.
#[derive(Debug, Default)]
struct Outage(AtomicBool);

impl Outage {
    fn set(&self, down: bool) {
        self.0.store(down, Ordering::SeqCst);
    }

    fn check(&self, store: &str) -> Result<(), RepositoryError> {
        if self.0.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(format!("{store} is unavailable")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, Request>>,
}

impl InMemoryRequestRepository {
    pub async fn insert(&self, request: Request) {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
    }
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matching: Vec<Request> = requests
            .values()
            .filter(|request| filter.user_id.as_ref().map_or(true, |id| &request.user_id == id))
            .filter(|request| filter.statuses.is_empty() || filter.statuses.contains(&request.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(matching)
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn transition(
        &self,
        id: &RequestId,
        from: &[RequestStatus],
        update: RequestUpdate,
    ) -> Result<u64, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(&id.0).filter(|r| from.contains(&r.status)) else {
            return Ok(0);
        };

        request.status = update.status;
        request.rejection_reason = update.rejection_reason;
        if update.reviewed_by.is_some() {
            request.reviewed_by = update.reviewed_by;
        }
        if update.reviewed_at.is_some() {
            request.reviewed_at = update.reviewed_at;
        }
        if update.final_purchase_amount.is_some() {
            request.final_purchase_amount = update.final_purchase_amount;
        }
        if update.purchase_date.is_some() {
            request.purchase_date = update.purchase_date;
        }
        request.updated_at = Some(Utc::now());
        Ok(1)
    }
}

#[derive(Default)]
pub struct InMemoryLessonPlanRepository {
    plans: RwLock<HashMap<UserId, LessonPlan>>,
    outage: Outage,
}

impl InMemoryLessonPlanRepository {
    pub async fn insert(&self, plan: LessonPlan) {
        let mut plans = self.plans.write().await;
        plans.insert(plan.user_id.clone(), plan);
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }
}

#[async_trait::async_trait]
impl LessonPlanRepository for InMemoryLessonPlanRepository {
    async fn list(&self, statuses: &[LessonPlanStatus]) -> Result<Vec<LessonPlan>, RepositoryError> {
        self.outage.check("lesson_plans")?;
        let plans = self.plans.read().await;
        let mut matching: Vec<LessonPlan> = plans
            .values()
            .filter(|plan| statuses.is_empty() || statuses.contains(&plan.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(matching)
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<LessonPlan>, RepositoryError> {
        self.outage.check("lesson_plans")?;
        let plans = self.plans.read().await;
        Ok(plans.get(user_id).cloned())
    }

    async fn transition(
        &self,
        user_id: &UserId,
        from: &[LessonPlanStatus],
        update: LessonPlanUpdate,
    ) -> Result<u64, RepositoryError> {
        self.outage.check("lesson_plans")?;
        let mut plans = self.plans.write().await;
        let Some(plan) = plans.get_mut(user_id).filter(|p| from.contains(&p.status)) else {
            return Ok(0);
        };

        plan.status = update.status;
        plan.rejection_reason = update.rejection_reason;
        if update.submitted_at.is_some() {
            plan.submitted_at = update.submitted_at;
        }
        plan.updated_at = Some(Utc::now());
        Ok(1)
    }
}

#[derive(Default)]
pub struct InMemoryBudgetRepository {
    budgets: RwLock<HashMap<UserId, StudentBudget>>,
    rates: RwLock<HashMap<String, FieldRate>>,
    outage: Outage,
}

impl InMemoryBudgetRepository {
    pub async fn insert_budget(&self, budget: StudentBudget) {
        let mut budgets = self.budgets.write().await;
        budgets.insert(budget.user_id.clone(), budget);
    }

    pub async fn insert_rate(&self, rate: FieldRate) {
        let mut rates = self.rates.write().await;
        rates.insert(rate.field.clone(), rate);
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }
}

#[async_trait::async_trait]
impl BudgetRepository for InMemoryBudgetRepository {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<StudentBudget>, RepositoryError> {
        self.outage.check("student_budgets")?;
        let budgets = self.budgets.read().await;
        Ok(budgets.get(user_id).cloned())
    }

    async fn field_rate(&self, field: &str) -> Result<Option<FieldRate>, RepositoryError> {
        self.outage.check("budget_settings")?;
        let rates = self.rates.read().await;
        Ok(rates.get(field).cloned())
    }

    async fn decide_special_request(
        &self,
        user_id: &UserId,
        from: &[SpecialRequestStatus],
        decision: SpecialRequestDecision,
    ) -> Result<u64, RepositoryError> {
        self.outage.check("student_budgets")?;
        let mut budgets = self.budgets.write().await;
        let Some(budget) = budgets.get_mut(user_id).filter(|b| {
            b.special_request_status.map_or(false, |status| from.contains(&status))
        }) else {
            return Ok(0);
        };
        budget.special_request_status = Some(decision.status);
        budget.special_request_rejection_reason = decision.rejection_reason;
        Ok(1)
    }
}

#[derive(Default)]
pub struct InMemoryFlightRequestRepository {
    flights: RwLock<HashMap<String, FlightRequest>>,
}

impl InMemoryFlightRequestRepository {
    pub async fn insert(&self, flight: FlightRequest) {
        let mut flights = self.flights.write().await;
        flights.insert(flight.id.0.clone(), flight);
    }
}

#[async_trait::async_trait]
impl FlightRequestRepository for InMemoryFlightRequestRepository {
    async fn list(
        &self,
        filter: &FlightRequestFilter,
    ) -> Result<Vec<FlightRequest>, RepositoryError> {
        let flights = self.flights.read().await;
        let mut matching: Vec<FlightRequest> = flights
            .values()
            .filter(|flight| filter.user_id.as_ref().map_or(true, |id| &flight.user_id == id))
            .filter(|flight| filter.statuses.is_empty() || filter.statuses.contains(&flight.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(matching)
    }

    async fn find_by_id(
        &self,
        id: &FlightRequestId,
    ) -> Result<Option<FlightRequest>, RepositoryError> {
        let flights = self.flights.read().await;
        Ok(flights.get(&id.0).cloned())
    }

    async fn transition(
        &self,
        id: &FlightRequestId,
        from: &[FlightStatus],
        update: FlightUpdate,
    ) -> Result<u64, RepositoryError> {
        let mut flights = self.flights.write().await;
        let Some(flight) = flights.get_mut(&id.0).filter(|f| from.contains(&f.status)) else {
            return Ok(0);
        };
        flight.status = update.status;
        flight.rejection_reason = update.rejection_reason;
        flight.updated_at = Some(Utc::now());
        Ok(1)
    }

    async fn decide_baggage(
        &self,
        id: &FlightRequestId,
        from: &[BaggageStatus],
        decision: BaggageDecision,
    ) -> Result<u64, RepositoryError> {
        let mut flights = self.flights.write().await;
        let Some(baggage) = flights
            .get_mut(&id.0)
            .and_then(|flight| flight.special_baggage.as_mut())
            .filter(|baggage| from.contains(&baggage.status))
        else {
            return Ok(0);
        };
        baggage.status = decision.status;
        baggage.rejection_reason = decision.rejection_reason;
        Ok(1)
    }
}

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    institutes: RwLock<BTreeMap<String, Institute>>,
    questions: RwLock<BTreeMap<String, ExamQuestion>>,
}

impl InMemoryCatalogRepository {
    pub async fn insert_institute(&self, institute: Institute) {
        let mut institutes = self.institutes.write().await;
        institutes.insert(institute.id.clone(), institute);
    }

    pub async fn insert_exam_question(&self, question: ExamQuestion) {
        let mut questions = self.questions.write().await;
        questions.insert(question.id.clone(), question);
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_institutes(&self) -> Result<Vec<Institute>, RepositoryError> {
        let institutes = self.institutes.read().await;
        let mut all: Vec<Institute> = institutes.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn list_exam_questions(&self) -> Result<Vec<ExamQuestion>, RepositoryError> {
        let questions = self.questions.read().await;
        let mut all: Vec<ExamQuestion> = questions.values().cloned().collect();
        all.sort_by_key(|question| question.order_index);
        Ok(all)
    }

    async fn find_institute(&self, id: &str) -> Result<Option<Institute>, RepositoryError> {
        let institutes = self.institutes.read().await;
        Ok(institutes.get(id).cloned())
    }

    async fn find_exam_question(&self, id: &str) -> Result<Option<ExamQuestion>, RepositoryError> {
        let questions = self.questions.read().await;
        Ok(questions.get(id).cloned())
    }

    async fn set_status(
        &self,
        kind: CatalogKind,
        id: &str,
        from: &[ActiveStatus],
        to: ActiveStatus,
    ) -> Result<u64, RepositoryError> {
        let changed = match kind {
            CatalogKind::Institute => {
                let mut institutes = self.institutes.write().await;
                match institutes.get_mut(id).filter(|i| from.contains(&i.status)) {
                    Some(institute) => {
                        institute.status = to;
                        true
                    }
                    None => false,
                }
            }
            CatalogKind::ExamQuestion => {
                let mut questions = self.questions.write().await;
                match questions.get_mut(id).filter(|q| from.contains(&q.status)) {
                    Some(question) => {
                        question.status = to;
                        true
                    }
                    None => false,
                }
            }
        };
        Ok(u64::from(changed))
    }
}

#[derive(Default)]
pub struct InMemoryReceiptRepository {
    receipts: RwLock<Vec<Receipt>>,
    outage: Outage,
}

impl InMemoryReceiptRepository {
    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }

    pub async fn all(&self) -> Vec<Receipt> {
        self.receipts.read().await.clone()
    }
}

#[async_trait::async_trait]
impl ReceiptRepository for InMemoryReceiptRepository {
    async fn insert(&self, mut receipt: Receipt) -> Result<Receipt, RepositoryError> {
        self.outage.check("receipts")?;
        let mut receipts = self.receipts.write().await;
        receipt.id.get_or_insert_with(|| format!("receipt-{}", receipts.len() + 1));
        receipts.push(receipt.clone());
        Ok(receipt)
    }

    async fn find_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Receipt>, RepositoryError> {
        self.outage.check("receipts")?;
        let receipts = self.receipts.read().await;
        Ok(receipts
            .iter()
            .filter(|receipt| &receipt.request_id == request_id)
            .max_by_key(|receipt| receipt.uploaded_at)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<BTreeMap<String, usize>>,
    outage: Outage,
}

impl InMemoryObjectStorage {
    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }

    /// `bucket/path` keys of every stored object.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        file: &ReceiptFile,
    ) -> Result<String, RepositoryError> {
        self.outage.check("storage")?;
        let key = format!("{bucket}/{path}");
        let mut objects = self.objects.write().await;
        objects.insert(key.clone(), file.bytes.len());
        Ok(format!("memory://storage/v1/object/public/{key}"))
    }
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<UserId, StudentProfile>>,
    outage: Outage,
}

impl InMemoryProfileRepository {
    pub async fn insert(&self, profile: StudentProfile) {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.id.clone(), profile);
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }
}

#[async_trait::async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<StudentProfile>, RepositoryError> {
        self.outage.check("user_profiles")?;
        let profiles = self.profiles.read().await;
        Ok(profiles.get(id).cloned())
    }

    async fn find_by_name_and_birth_date(
        &self,
        name: &str,
        birth_date: NaiveDate,
    ) -> Result<Vec<StudentProfile>, RepositoryError> {
        self.outage.check("user_profiles")?;
        let profiles = self.profiles.read().await;
        let mut matching: Vec<StudentProfile> = profiles
            .values()
            .filter(|profile| profile.name == name.trim() && profile.birth_date == Some(birth_date))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    system: RwLock<Vec<SystemSetting>>,
    features: RwLock<Vec<FeatureSetting>>,
}

impl InMemorySettingsRepository {
    pub async fn insert_system(&self, setting: SystemSetting) {
        self.system.write().await.push(setting);
    }

    pub async fn insert_feature(&self, setting: FeatureSetting) {
        self.features.write().await.push(setting);
    }
}

#[async_trait::async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn system_settings(&self) -> Result<Vec<SystemSetting>, RepositoryError> {
        Ok(self.system.read().await.clone())
    }

    async fn feature_settings(&self) -> Result<Vec<FeatureSetting>, RepositoryError> {
        Ok(self.features.read().await.clone())
    }
}
