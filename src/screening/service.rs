use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use super::judgment::{
    dispatch, draft_from_judgment, Dispatch, DispatchError, EvaluationDraft, JudgmentService,
};
use super::questions::{
    ConfigurationError, Question, QuestionId, QuestionSet, QuestionSetError, QuestionSetId,
    QuestionSetProvider,
};
use super::report::{OutcomeSnapshot, ReportSink};
use super::rules::AnswerValidationError;
use super::scoring::{self, ScoreBreakdown};
use super::session::{
    AnswerValue, Candidate, Evaluation, Evaluator, MessageKind, Session, SessionId, SessionState,
    SessionStatusView, SessionToken, Verdict,
};
use super::store::{SessionStore, StoreError, VersionedSession};

/// Errors surfaced by the screening facade. Fail verdicts are evaluation
/// outcomes, never errors.
#[derive(Debug, thiserror::Error)]
pub enum ScreeningError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    QuestionSet(#[from] QuestionSetError),
    #[error(transparent)]
    Validation(#[from] AnswerValidationError),
    #[error("session expired at {deadline}")]
    SessionExpired { deadline: DateTime<Utc> },
    #[error("session is already {state}")]
    TerminalState { state: SessionState },
    #[error("question {question} already answered")]
    DuplicateAnswer { question: QuestionId },
    #[error("answers must follow question order; next question is {expected}")]
    OutOfOrder { expected: QuestionId },
    #[error("external judgment unavailable: {0}")]
    JudgmentUnavailable(String),
    #[error("session modified concurrently; retry against current state")]
    StaleCommit,
    #[error("session not found")]
    SessionNotFound,
    #[error("question {0} not part of this session's question set")]
    UnknownQuestion(QuestionId),
    #[error("question {question} has no evaluation awaiting manual review")]
    ReviewNotPending { question: QuestionId },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ScreeningError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => Self::SessionNotFound,
            StoreError::StaleCommit => Self::StaleCommit,
            other => Self::Store(other),
        }
    }
}

impl From<DispatchError> for ScreeningError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(err) => Self::Validation(err),
            DispatchError::MissingRule(question) => {
                Self::Configuration(ConfigurationError::MissingRule { question })
            }
        }
    }
}

/// Request payload for opening a new session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateSessionRequest {
    pub question_set_id: QuestionSetId,
    #[serde(default)]
    pub candidate: Candidate,
}

/// One answer submission against an open session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitAnswer {
    pub question_id: QuestionId,
    pub answer: AnswerValue,
}

/// Human resolution of a pending manual-review evaluation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManualReviewDecision {
    pub verdict: Verdict,
    pub score: f64,
    pub rationale: String,
    pub reviewer: String,
}

/// What the candidate gets back after an accepted answer.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerReceipt {
    pub question_id: QuestionId,
    pub verdict: Verdict,
    pub score: f64,
    pub rationale: String,
    pub session: SessionStatusView,
}

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("scr-{id:06}"))
}

/// Facade composing the question catalog, session store, judgment dispatch,
/// scoring engine, and reporting trigger.
pub struct ScreeningService<Q, S, J, N> {
    catalog: Arc<Q>,
    store: Arc<S>,
    judge: Arc<J>,
    reports: Arc<N>,
    validity: Duration,
}

impl<Q, S, J, N> ScreeningService<Q, S, J, N>
where
    Q: QuestionSetProvider + 'static,
    S: SessionStore + 'static,
    J: JudgmentService + 'static,
    N: ReportSink + 'static,
{
    pub fn new(
        catalog: Arc<Q>,
        store: Arc<S>,
        judge: Arc<J>,
        reports: Arc<N>,
        validity: Duration,
    ) -> Self {
        Self {
            catalog,
            store,
            judge,
            reports,
            validity,
        }
    }

    /// Open a pending session against a question set. The expiration deadline
    /// is fixed here and never extended.
    pub fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionStatusView, ScreeningError> {
        let set = self.catalog.question_set(&request.question_set_id)?;
        set.validate()?;

        let session = Session::new(
            next_session_id(),
            SessionToken(Uuid::new_v4().to_string()),
            set.id.clone(),
            request.candidate,
            Utc::now(),
            self.validity,
        );

        let stored = self.store.insert(session)?;
        Ok(stored.session.status_view())
    }

    /// Explicit "begin" action; answering also begins a pending session.
    pub fn begin(&self, token: &SessionToken) -> Result<SessionStatusView, ScreeningError> {
        let now = Utc::now();
        let VersionedSession {
            mut session,
            version,
        } = self.load_live(token, now)?;

        if session.state == SessionState::Pending {
            let set = self.catalog.question_set(&session.question_set)?;
            session.begin(now);
            self.prompt_next(&mut session, &set, now);
            let committed = self.store.commit(session, version)?;
            return Ok(committed.session.status_view());
        }

        Ok(session.status_view())
    }

    /// Current session status. A read past the deadline still force-expires
    /// the session but returns the expired view rather than an error.
    pub fn session_status(&self, token: &SessionToken) -> Result<SessionStatusView, ScreeningError> {
        let loaded = self.store.load(token)?;
        if loaded.session.is_expired(Utc::now()) {
            let mut session = loaded.session;
            session.mark_expired(Utc::now());
            return match self.store.commit(session, loaded.version) {
                Ok(committed) => Ok(committed.session.status_view()),
                // Another writer observed the deadline first; their view stands.
                Err(StoreError::StaleCommit) => Ok(self.store.load(token)?.session.status_view()),
                Err(other) => Err(other.into()),
            };
        }
        Ok(loaded.session.status_view())
    }

    /// Accept one answer, dispatch it to the question's evaluator variant,
    /// record the evaluation, and complete the session when its predicate
    /// holds. External judgments run outside the commit window; their results
    /// are discarded if the session meanwhile expired or completed.
    pub async fn submit_answer(
        &self,
        token: &SessionToken,
        submission: SubmitAnswer,
    ) -> Result<AnswerReceipt, ScreeningError> {
        let now = Utc::now();
        let VersionedSession { session, version } = self.load_live(token, now)?;
        let set = self.catalog.question_set(&session.question_set)?;

        let question = set
            .question(&submission.question_id)
            .ok_or_else(|| ScreeningError::UnknownQuestion(submission.question_id.clone()))?;

        self.check_intake(&session, &set, question)?;
        validate_answer_presence(&submission.answer)?;

        match dispatch(question, &submission.answer)? {
            Dispatch::Resolved(draft) => {
                self.apply_answer(session, version, &set, question, &submission.answer, draft, now)
            }
            Dispatch::External => {
                // The judge may suspend for a while; nothing is committed yet,
                // so a failed call leaves the session untouched for retry.
                let judgment = self
                    .judge
                    .judge(question, &submission.answer, question.judging_criteria.as_deref())
                    .await
                    .map_err(|err| ScreeningError::JudgmentUnavailable(err.to_string()))?;
                let draft = draft_from_judgment(judgment)
                    .map_err(|err| ScreeningError::JudgmentUnavailable(err.to_string()))?;

                let now = Utc::now();
                let VersionedSession { session, version } = self.load_live(token, now)?;
                self.check_intake(&session, &set, question)?;
                self.apply_answer(session, version, &set, question, &submission.answer, draft, now)
            }
        }
    }

    /// Resolve a pending manual-review evaluation with a human verdict. The
    /// existing evaluation row keeps its identity; verdict, score, rationale,
    /// and evaluator are replaced.
    pub fn resolve_manual_review(
        &self,
        token: &SessionToken,
        question_id: &QuestionId,
        decision: ManualReviewDecision,
    ) -> Result<SessionStatusView, ScreeningError> {
        if decision.verdict == Verdict::Pending {
            return Err(AnswerValidationError::PendingReviewVerdict.into());
        }
        if !(0.0..=100.0).contains(&decision.score) {
            return Err(AnswerValidationError::ScoreOutOfRange(decision.score).into());
        }

        let now = Utc::now();
        let VersionedSession {
            mut session,
            version,
        } = self.load_live(token, now)?;
        let set = self.catalog.question_set(&session.question_set)?;

        if set.question(question_id).is_none() {
            return Err(ScreeningError::UnknownQuestion(question_id.clone()));
        }

        let evaluation = session
            .evaluation_for_mut(question_id)
            .filter(|e| e.verdict == Verdict::Pending)
            .ok_or_else(|| ScreeningError::ReviewNotPending {
                question: question_id.clone(),
            })?;

        evaluation.verdict = decision.verdict;
        evaluation.score = decision.score;
        evaluation.rationale = decision.rationale;
        evaluation.evaluator = Evaluator::Human(decision.reviewer);
        evaluation.details = json!({ "state": "reviewed" });

        let completed = self.finalize_if_complete(&mut session, &set, now);
        let committed = self.store.commit(session, version)?;
        if let Some(breakdown) = completed {
            self.deliver_report(&committed.session, &breakdown);
        }

        Ok(committed.session.status_view())
    }

    /// Guards shared by the initial intake and the post-judgment recommit.
    fn check_intake(
        &self,
        session: &Session,
        set: &QuestionSet,
        question: &Question,
    ) -> Result<(), ScreeningError> {
        if session.evaluation_for(&question.id).is_some() || session.has_answer(&question.id) {
            return Err(ScreeningError::DuplicateAnswer {
                question: question.id.clone(),
            });
        }

        if set.strict_order {
            if let Some(expected) = session.next_unanswered(set) {
                if expected.id != question.id {
                    return Err(ScreeningError::OutOfOrder {
                        expected: expected.id.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    fn apply_answer(
        &self,
        mut session: Session,
        version: u64,
        set: &QuestionSet,
        question: &Question,
        answer: &AnswerValue,
        draft: EvaluationDraft,
        now: DateTime<Utc>,
    ) -> Result<AnswerReceipt, ScreeningError> {
        session.begin(now);

        let message_id = session.append_message(
            MessageKind::Answer,
            Some(question.id.clone()),
            &answer.transcript_content(),
            now,
        );

        session.record_evaluation(Evaluation {
            id: 0,
            question_id: question.id.clone(),
            message_id,
            verdict: draft.verdict,
            score: draft.score,
            rationale: draft.rationale.clone(),
            policy: draft.policy,
            evaluator: draft.evaluator,
            details: draft.details,
            created_at: now,
        });

        let completed = self.finalize_if_complete(&mut session, set, now);
        if completed.is_none() {
            self.prompt_next(&mut session, set, now);
        }

        let committed = self.store.commit(session, version)?;
        if let Some(breakdown) = completed {
            self.deliver_report(&committed.session, &breakdown);
        }

        Ok(AnswerReceipt {
            question_id: question.id.clone(),
            verdict: draft.verdict,
            score: draft.score,
            rationale: draft.rationale,
            session: committed.session.status_view(),
        })
    }

    /// Entering `completed` computes the final outcome; the caller delivers
    /// the report only after the transition is committed.
    fn finalize_if_complete(
        &self,
        session: &mut Session,
        set: &QuestionSet,
        now: DateTime<Utc>,
    ) -> Option<ScoreBreakdown> {
        if !session.is_complete(set) {
            return None;
        }

        let breakdown = scoring::score_session(set, &session.evaluations);
        session.outcome = breakdown.outcome;
        session.state = SessionState::Completed;
        session.completed_at = Some(now);
        session.score = Some(breakdown.clone());
        session.append_message(MessageKind::System, None, &breakdown.rationale, now);
        Some(breakdown)
    }

    fn prompt_next(&self, session: &mut Session, set: &QuestionSet, now: DateTime<Utc>) {
        if let Some(next) = session.next_unanswered(set) {
            let (id, prompt) = (next.id.clone(), next.prompt.clone());
            session.append_message(MessageKind::QuestionPrompt, Some(id), &prompt, now);
        }
    }

    /// Fire-and-forget relative to completion: a delivery failure is logged,
    /// never rolled back into session state.
    fn deliver_report(&self, session: &Session, breakdown: &ScoreBreakdown) {
        let snapshot = OutcomeSnapshot::from_session(session, breakdown);
        if let Err(err) = self.reports.deliver(snapshot) {
            warn!(session = %session.id, error = %err, "outcome report delivery failed");
        }
    }

    /// Load a session and enforce lazy expiration and terminal absorption.
    /// Crossing the deadline persists the `expired` transition before the
    /// triggering operation is rejected.
    fn load_live(
        &self,
        token: &SessionToken,
        now: DateTime<Utc>,
    ) -> Result<VersionedSession, ScreeningError> {
        let loaded = self.store.load(token)?;

        if loaded.session.is_expired(now) {
            let deadline = loaded.session.expires_at;
            let mut session = loaded.session;
            session.mark_expired(now);
            match self.store.commit(session, loaded.version) {
                Ok(_) | Err(StoreError::StaleCommit) => {}
                Err(other) => return Err(other.into()),
            }
            return Err(ScreeningError::SessionExpired { deadline });
        }

        if loaded.session.state.is_terminal() {
            return Err(ScreeningError::TerminalState {
                state: loaded.session.state,
            });
        }

        Ok(loaded)
    }
}

fn validate_answer_presence(answer: &AnswerValue) -> Result<(), AnswerValidationError> {
    match answer {
        AnswerValue::Text(text) if text.trim().is_empty() => {
            Err(AnswerValidationError::EmptyAnswer)
        }
        AnswerValue::Selection(choices) if choices.is_empty() => {
            Err(AnswerValidationError::EmptySelection)
        }
        _ => Ok(()),
    }
}

impl ScreeningError {
    /// HTTP status the router maps this error to.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            ScreeningError::Validation(_) | ScreeningError::OutOfOrder { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ScreeningError::SessionExpired { .. } => StatusCode::GONE,
            ScreeningError::TerminalState { .. }
            | ScreeningError::DuplicateAnswer { .. }
            | ScreeningError::ReviewNotPending { .. }
            | ScreeningError::StaleCommit => StatusCode::CONFLICT,
            ScreeningError::JudgmentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ScreeningError::SessionNotFound | ScreeningError::UnknownQuestion(_) => {
                StatusCode::NOT_FOUND
            }
            ScreeningError::QuestionSet(QuestionSetError::NotFound) => StatusCode::NOT_FOUND,
            ScreeningError::Configuration(_)
            | ScreeningError::QuestionSet(QuestionSetError::Unavailable(_))
            | ScreeningError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
