use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::questions::{EvaluationPolicy, QuestionId, QuestionSet, QuestionSetId};
use super::scoring::ScoreBreakdown;

/// Identifier wrapper for screening sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token a candidate uses to resume their session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle states; `completed` and `expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Active,
    Completed,
    Expired,
}

impl SessionState {
    pub const fn label(self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Active => "active",
            SessionState::Completed => "completed",
            SessionState::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Expired)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Final approved/rejected determination for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Unevaluated,
    Approved,
    Rejected,
}

impl SessionOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            SessionOutcome::Unevaluated => "unevaluated",
            SessionOutcome::Approved => "approved",
            SessionOutcome::Rejected => "rejected",
        }
    }
}

/// Recorded verdict for one answered question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Pending,
}

impl Verdict {
    pub const fn label(self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
            Verdict::Pending => "pending",
        }
    }
}

/// Candidate identity captured at session creation; every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Candidate answer payload: free text or a set of selected option identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Selection(Vec<String>),
}

impl AnswerValue {
    /// Transcript rendering of the answer.
    pub fn transcript_content(&self) -> String {
        match self {
            AnswerValue::Text(text) => text.clone(),
            AnswerValue::Selection(choices) => choices.join(", "),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    System,
    QuestionPrompt,
    Answer,
}

impl MessageKind {
    pub const fn label(self) -> &'static str {
        match self {
            MessageKind::System => "system",
            MessageKind::QuestionPrompt => "question_prompt",
            MessageKind::Answer => "answer",
        }
    }
}

/// One entry in the session's append-only transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<QuestionId>,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Who produced an evaluation's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluator {
    System,
    Human(String),
}

impl fmt::Display for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluator::System => f.write_str("system"),
            Evaluator::Human(name) => f.write_str(name),
        }
    }
}

/// Verdict and score recorded for one answered question. At most one per
/// (session, question); manual re-evaluation replaces fields in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: u64,
    pub question_id: QuestionId,
    pub message_id: u64,
    pub verdict: Verdict,
    pub score: f64,
    pub rationale: String,
    pub policy: EvaluationPolicy,
    pub evaluator: Evaluator,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One candidate's screening interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub token: SessionToken,
    pub question_set: QuestionSetId,
    pub candidate: Candidate,
    pub state: SessionState,
    pub outcome: SessionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreBreakdown>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Fixed at creation; never extended.
    pub expires_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub evaluations: Vec<Evaluation>,
    next_record_id: u64,
}

impl Session {
    pub fn new(
        id: SessionId,
        token: SessionToken,
        question_set: QuestionSetId,
        candidate: Candidate,
        now: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        let mut session = Self {
            id,
            token,
            question_set,
            candidate,
            state: SessionState::Pending,
            outcome: SessionOutcome::Unevaluated,
            score: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            expires_at: now + validity,
            messages: Vec::new(),
            evaluations: Vec::new(),
            next_record_id: 1,
        };
        session.append_message(MessageKind::System, None, "screening session created", now);
        session
    }

    /// Lazy expiration predicate; checked at the top of every session operation.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && now >= self.expires_at
    }

    /// Force-transition into `expired` on first observation past the deadline.
    pub fn mark_expired(&mut self, now: DateTime<Utc>) {
        self.state = SessionState::Expired;
        self.append_message(MessageKind::System, None, "session expired", now);
    }

    /// First accepted activity moves `pending` to `active` and fixes the start time.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        if self.state == SessionState::Pending {
            self.state = SessionState::Active;
            self.started_at = Some(now);
        }
    }

    pub fn append_message(
        &mut self,
        kind: MessageKind,
        question_id: Option<QuestionId>,
        content: &str,
        now: DateTime<Utc>,
    ) -> u64 {
        let id = self.next_record_id;
        self.next_record_id += 1;
        self.messages.push(Message {
            id,
            question_id,
            kind,
            content: content.to_string(),
            created_at: now,
        });
        id
    }

    pub fn record_evaluation(&mut self, mut evaluation: Evaluation) -> u64 {
        let id = self.next_record_id;
        self.next_record_id += 1;
        evaluation.id = id;
        self.evaluations.push(evaluation);
        id
    }

    pub fn evaluation_for(&self, question: &QuestionId) -> Option<&Evaluation> {
        self.evaluations.iter().find(|e| e.question_id == *question)
    }

    pub fn evaluation_for_mut(&mut self, question: &QuestionId) -> Option<&mut Evaluation> {
        self.evaluations
            .iter_mut()
            .find(|e| e.question_id == *question)
    }

    pub fn has_answer(&self, question: &QuestionId) -> bool {
        self.messages
            .iter()
            .any(|m| m.kind == MessageKind::Answer && m.question_id.as_ref() == Some(question))
    }

    /// Any recorded fail verdict on an eliminatory question.
    pub fn eliminatory_failure(&self, set: &QuestionSet) -> bool {
        self.evaluations.iter().any(|evaluation| {
            evaluation.verdict == Verdict::Fail
                && set
                    .question(&evaluation.question_id)
                    .map(|q| q.eliminatory)
                    .unwrap_or(false)
        })
    }

    /// Completion predicate: every required active question carries exactly one
    /// non-pending evaluation. An eliminatory failure completes the session
    /// early regardless of remaining questions.
    pub fn is_complete(&self, set: &QuestionSet) -> bool {
        if self.eliminatory_failure(set) {
            return true;
        }

        set.active_questions().filter(|q| q.required).all(|q| {
            self.evaluation_for(&q.id)
                .map(|e| e.verdict != Verdict::Pending)
                .unwrap_or(false)
        })
    }

    /// Next active question without an answer, in ordinal order.
    pub fn next_unanswered<'a>(&self, set: &'a QuestionSet) -> Option<&'a super::questions::Question> {
        set.active_questions().find(|q| !self.has_answer(&q.id))
    }

    pub fn answered_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.kind == MessageKind::Answer)
            .count()
    }
}

/// Sanitized representation of a session's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusView {
    pub session_id: SessionId,
    pub token: SessionToken,
    pub state: &'static str,
    pub outcome: &'static str,
    pub questions_answered: usize,
    pub questions_passed: usize,
    pub questions_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obtained: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn status_view(&self) -> SessionStatusView {
        let passed = self
            .evaluations
            .iter()
            .filter(|e| e.verdict == Verdict::Pass)
            .count();
        let failed = self
            .evaluations
            .iter()
            .filter(|e| e.verdict == Verdict::Fail)
            .count();

        SessionStatusView {
            session_id: self.id.clone(),
            token: self.token.clone(),
            state: self.state.label(),
            outcome: self.outcome.label(),
            questions_answered: self.answered_count(),
            questions_passed: passed,
            questions_failed: failed,
            obtained: self.score.as_ref().map(|s| s.obtained),
            maximum: self.score.as_ref().map(|s| s.maximum),
            percentage: self.score.as_ref().map(|s| s.percentage),
            rationale: self.score.as_ref().map(|s| s.rationale.clone()),
            expires_at: self.expires_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}
