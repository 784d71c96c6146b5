use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::scoring::ScoreBreakdown;
use super::session::{Candidate, Evaluation, Message, Session, SessionId, SessionToken};

/// Immutable outcome payload handed to the notification/report collaborator
/// when a session completes.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSnapshot {
    pub session_id: SessionId,
    pub token: SessionToken,
    pub candidate: Candidate,
    pub outcome: &'static str,
    pub obtained: f64,
    pub maximum: f64,
    pub percentage: f64,
    pub rationale: String,
    pub evaluations: Vec<Evaluation>,
    pub transcript: Vec<Message>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OutcomeSnapshot {
    /// Snapshot a completed session by value. Callers pass the breakdown the
    /// scoring engine just produced.
    pub fn from_session(session: &Session, breakdown: &ScoreBreakdown) -> Self {
        Self {
            session_id: session.id.clone(),
            token: session.token.clone(),
            candidate: session.candidate.clone(),
            outcome: session.outcome.label(),
            obtained: breakdown.obtained,
            maximum: breakdown.maximum,
            percentage: breakdown.percentage,
            rationale: breakdown.rationale.clone(),
            evaluations: session.evaluations.clone(),
            transcript: session.messages.clone(),
            completed_at: session.completed_at,
        }
    }
}

/// Outbound notification/report hook (e.g., email or PDF adapters).
/// Delivery failure never rolls back session completion.
pub trait ReportSink: Send + Sync {
    fn deliver(&self, snapshot: OutcomeSnapshot) -> Result<(), ReportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report transport unavailable: {0}")]
    Transport(String),
}

/// Default sink that records outcomes in the service log.
pub struct LoggingReportSink;

impl ReportSink for LoggingReportSink {
    fn deliver(&self, snapshot: OutcomeSnapshot) -> Result<(), ReportError> {
        info!(
            session = %snapshot.session_id,
            outcome = snapshot.outcome,
            percentage = snapshot.percentage,
            "screening outcome recorded"
        );
        Ok(())
    }
}
