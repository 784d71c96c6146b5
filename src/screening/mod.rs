//! Screening session engine: lifecycle state machine, per-answer evaluation
//! dispatch, weighted scoring, and completion reporting.

pub mod judgment;
pub mod questions;
pub mod report;
pub mod router;
pub(crate) mod rules;
pub mod scoring;
pub mod service;
pub mod session;
pub mod store;

#[cfg(test)]
mod tests;

pub use judgment::{DisabledJudge, Judgment, JudgmentError, JudgmentService};
pub use questions::{
    load_question_sets, CatalogLoadError, ConfigurationError, EvaluationPolicy,
    InMemoryQuestionSets, Question, QuestionId, QuestionSet, QuestionSetError, QuestionSetId,
    QuestionSetProvider, RuleSpec,
};
pub use report::{LoggingReportSink, OutcomeSnapshot, ReportError, ReportSink};
pub use rules::{AnswerValidationError, RuleOutcome};
pub use scoring::{score_session, PolicyStats, ScoreBreakdown};
pub use service::{
    AnswerReceipt, CreateSessionRequest, ManualReviewDecision, ScreeningError, ScreeningService,
    SubmitAnswer,
};
pub use session::{
    AnswerValue, Candidate, Evaluation, Evaluator, Message, MessageKind, Session, SessionId,
    SessionOutcome, SessionState, SessionStatusView, SessionToken, Verdict,
};
pub use store::{InMemorySessionStore, SessionStore, StoreError, VersionedSession};
pub use router::screening_router;
