use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::screening::judgment::{Judgment, JudgmentError, JudgmentService};
use crate::screening::questions::{
    EvaluationPolicy, InMemoryQuestionSets, Question, QuestionId, QuestionSet, QuestionSetId,
    RuleSpec,
};
use crate::screening::report::{OutcomeSnapshot, ReportError, ReportSink};
use crate::screening::service::{CreateSessionRequest, ScreeningService, SubmitAnswer};
use crate::screening::session::{AnswerValue, Candidate, Session, SessionToken, Verdict};
use crate::screening::store::{InMemorySessionStore, SessionStore, StoreError, VersionedSession};

pub(super) const SET_ID: &str = "set-screening";

pub(super) fn rule_question(
    id: &str,
    position: u32,
    weight: f64,
    eliminatory: bool,
    rule: RuleSpec,
) -> Question {
    Question {
        id: QuestionId(id.to_string()),
        position,
        prompt: format!("prompt for {id}"),
        required: true,
        eliminatory,
        weight,
        policy: EvaluationPolicy::Rule,
        rule: Some(rule),
        judging_criteria: None,
        active: true,
    }
}

pub(super) fn manual_question(id: &str, position: u32, weight: f64) -> Question {
    Question {
        id: QuestionId(id.to_string()),
        position,
        prompt: format!("prompt for {id}"),
        required: true,
        eliminatory: false,
        weight,
        policy: EvaluationPolicy::ManualReview,
        rule: None,
        judging_criteria: None,
        active: true,
    }
}

pub(super) fn external_question(id: &str, position: u32, weight: f64) -> Question {
    Question {
        id: QuestionId(id.to_string()),
        position,
        prompt: format!("prompt for {id}"),
        required: true,
        eliminatory: false,
        weight,
        policy: EvaluationPolicy::ExternalJudgment,
        rule: None,
        judging_criteria: Some("judge fairly".to_string()),
        active: true,
    }
}

pub(super) fn question_set(questions: Vec<Question>, threshold: f64) -> QuestionSet {
    QuestionSet {
        id: QuestionSetId(SET_ID.to_string()),
        name: "Screening interview".to_string(),
        approval_threshold: threshold,
        strict_order: false,
        questions,
    }
}

/// Range question (1..5, weight 2) plus keyword question (a/b/c min 2, weight 1).
pub(super) fn range_keyword_set() -> QuestionSet {
    question_set(
        vec![
            rule_question(
                "q-range",
                1,
                2.0,
                false,
                RuleSpec::Range {
                    min: Some(1.0),
                    max: Some(5.0),
                },
            ),
            rule_question(
                "q-keywords",
                2,
                1.0,
                false,
                RuleSpec::KeywordSet {
                    keywords: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                    minimum_matches: 2,
                },
            ),
        ],
        70.0,
    )
}

pub(super) fn text(value: &str) -> AnswerValue {
    AnswerValue::Text(value.to_string())
}

pub(super) fn selection(choices: &[&str]) -> AnswerValue {
    AnswerValue::Selection(choices.iter().map(|c| c.to_string()).collect())
}

pub(super) fn answer(question: &str, value: AnswerValue) -> SubmitAnswer {
    SubmitAnswer {
        question_id: QuestionId(question.to_string()),
        answer: value,
    }
}

pub(super) struct StaticJudge {
    pub judgment: Judgment,
}

impl StaticJudge {
    pub(super) fn passing(score: f64) -> Self {
        Self {
            judgment: Judgment {
                verdict: Verdict::Pass,
                score,
                rationale: "looks solid".to_string(),
            },
        }
    }
}

#[async_trait]
impl JudgmentService for StaticJudge {
    async fn judge(
        &self,
        _question: &Question,
        _answer: &AnswerValue,
        _criteria: Option<&str>,
    ) -> Result<Judgment, JudgmentError> {
        Ok(self.judgment.clone())
    }
}

pub(super) struct OfflineJudge;

#[async_trait]
impl JudgmentService for OfflineJudge {
    async fn judge(
        &self,
        _question: &Question,
        _answer: &AnswerValue,
        _criteria: Option<&str>,
    ) -> Result<Judgment, JudgmentError> {
        Err(JudgmentError::Unavailable("judge offline".to_string()))
    }
}

/// Expires the session mid-judgment so the in-flight result must be discarded.
pub(super) struct ExpiringJudge {
    pub store: Arc<InMemorySessionStore>,
    pub token: Mutex<Option<SessionToken>>,
}

#[async_trait]
impl JudgmentService for ExpiringJudge {
    async fn judge(
        &self,
        _question: &Question,
        _answer: &AnswerValue,
        _criteria: Option<&str>,
    ) -> Result<Judgment, JudgmentError> {
        let token = self
            .token
            .lock()
            .expect("token mutex poisoned")
            .clone()
            .expect("token registered before judging");
        let loaded = self.store.load(&token).expect("session present");
        let mut session = loaded.session;
        session.expires_at = Utc::now() - Duration::minutes(5);
        self.store
            .commit(session, loaded.version)
            .expect("expiry commit succeeds");

        Ok(Judgment {
            verdict: Verdict::Pass,
            score: 100.0,
            rationale: "too late".to_string(),
        })
    }
}

#[derive(Default)]
pub(super) struct MemorySink {
    snapshots: Mutex<Vec<OutcomeSnapshot>>,
}

impl MemorySink {
    pub(super) fn snapshots(&self) -> Vec<OutcomeSnapshot> {
        self.snapshots.lock().expect("sink mutex poisoned").clone()
    }
}

impl ReportSink for MemorySink {
    fn deliver(&self, snapshot: OutcomeSnapshot) -> Result<(), ReportError> {
        self.snapshots
            .lock()
            .expect("sink mutex poisoned")
            .push(snapshot);
        Ok(())
    }
}

/// Store whose commits always lose the optimistic version race.
#[derive(Default)]
pub(super) struct StaleOnCommitStore {
    inner: InMemorySessionStore,
}

impl SessionStore for StaleOnCommitStore {
    fn insert(&self, session: Session) -> Result<VersionedSession, StoreError> {
        self.inner.insert(session)
    }

    fn load(&self, token: &SessionToken) -> Result<VersionedSession, StoreError> {
        self.inner.load(token)
    }

    fn commit(
        &self,
        _session: Session,
        _expected_version: u64,
    ) -> Result<VersionedSession, StoreError> {
        Err(StoreError::StaleCommit)
    }
}

pub(super) struct FailingSink;

impl ReportSink for FailingSink {
    fn deliver(&self, _snapshot: OutcomeSnapshot) -> Result<(), ReportError> {
        Err(ReportError::Transport("smtp offline".to_string()))
    }
}

pub(super) type TestService<J, N> =
    ScreeningService<InMemoryQuestionSets, InMemorySessionStore, J, N>;

pub(super) fn build_service_with<J, N>(
    set: QuestionSet,
    judge: Arc<J>,
    sink: Arc<N>,
) -> (Arc<TestService<J, N>>, Arc<InMemorySessionStore>)
where
    J: JudgmentService + 'static,
    N: ReportSink + 'static,
{
    let catalog = InMemoryQuestionSets::default();
    catalog.register(set).expect("valid question set");
    let store = Arc::new(InMemorySessionStore::default());
    let service = Arc::new(ScreeningService::new(
        Arc::new(catalog),
        store.clone(),
        judge,
        sink,
        Duration::hours(72),
    ));
    (service, store)
}

pub(super) fn build_service<J>(
    set: QuestionSet,
    judge: J,
) -> (
    Arc<TestService<J, MemorySink>>,
    Arc<InMemorySessionStore>,
    Arc<MemorySink>,
)
where
    J: JudgmentService + 'static,
{
    let sink = Arc::new(MemorySink::default());
    let (service, store) = build_service_with(set, Arc::new(judge), sink.clone());
    (service, store, sink)
}

pub(super) fn open_session<J, N>(service: &TestService<J, N>) -> SessionToken
where
    J: JudgmentService + 'static,
    N: ReportSink + 'static,
{
    let view = service
        .create_session(CreateSessionRequest {
            question_set_id: QuestionSetId(SET_ID.to_string()),
            candidate: Candidate {
                name: Some("Ada Perez".to_string()),
                email: Some("ada@example.com".to_string()),
                phone: None,
            },
        })
        .expect("session opens");
    view.token
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Rewind the deadline so the next access observes an expired session.
pub(super) fn force_expire(store: &InMemorySessionStore, token: &SessionToken) {
    let loaded = store.load(token).expect("session present");
    let mut session = loaded.session;
    session.expires_at = Utc::now() - Duration::minutes(5);
    store
        .commit(session, loaded.version)
        .expect("expiry commit succeeds");
}
