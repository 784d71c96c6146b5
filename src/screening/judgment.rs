use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::questions::{EvaluationPolicy, Question};
use super::rules::{self, AnswerValidationError};
use super::session::{AnswerValue, Evaluator, Verdict};

/// Verdict shape returned by the external judgment collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub verdict: Verdict,
    pub score: f64,
    pub rationale: String,
}

/// External judgment collaborator; may time out or error transiently.
#[async_trait]
pub trait JudgmentService: Send + Sync {
    async fn judge(
        &self,
        question: &Question,
        answer: &AnswerValue,
        criteria: Option<&str>,
    ) -> Result<Judgment, JudgmentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum JudgmentError {
    #[error("judgment service unavailable: {0}")]
    Unavailable(String),
    #[error("judgment service timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("judgment verdict must be pass or fail, got pending")]
    IndeterminateVerdict,
}

/// Placeholder collaborator for deployments without an external judge wired in.
pub struct DisabledJudge;

#[async_trait]
impl JudgmentService for DisabledJudge {
    async fn judge(
        &self,
        _question: &Question,
        _answer: &AnswerValue,
        _criteria: Option<&str>,
    ) -> Result<Judgment, JudgmentError> {
        Err(JudgmentError::Unavailable(
            "no judgment service configured".to_string(),
        ))
    }
}

/// Evaluation fields produced by any evaluator variant, before the session
/// assigns record identity.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationDraft {
    pub verdict: Verdict,
    pub score: f64,
    pub rationale: String,
    pub policy: EvaluationPolicy,
    pub evaluator: Evaluator,
    pub details: serde_json::Value,
}

/// Routing decision for one (question, answer) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Rule or manual-review outcome, available synchronously.
    Resolved(EvaluationDraft),
    /// Caller must invoke the external judge outside the session commit window.
    External,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] AnswerValidationError),
    #[error("question {0} has rule policy but no rule specification")]
    MissingRule(super::questions::QuestionId),
}

/// Select the evaluator variant for a question and, where possible, resolve it.
pub fn dispatch(question: &Question, answer: &AnswerValue) -> Result<Dispatch, DispatchError> {
    match question.policy {
        EvaluationPolicy::Rule => {
            let rule = question
                .rule
                .as_ref()
                .ok_or_else(|| DispatchError::MissingRule(question.id.clone()))?;
            let outcome = rules::evaluate(rule, answer)?;
            Ok(Dispatch::Resolved(EvaluationDraft {
                verdict: outcome.verdict,
                score: outcome.score,
                rationale: outcome.rationale,
                policy: EvaluationPolicy::Rule,
                evaluator: Evaluator::System,
                details: serde_json::Value::Null,
            }))
        }
        EvaluationPolicy::ManualReview => Ok(Dispatch::Resolved(EvaluationDraft {
            verdict: Verdict::Pending,
            score: 0.0,
            rationale: "awaiting manual review".to_string(),
            policy: EvaluationPolicy::ManualReview,
            evaluator: Evaluator::System,
            details: json!({ "state": "awaiting_review" }),
        })),
        EvaluationPolicy::ExternalJudgment => Ok(Dispatch::External),
    }
}

/// Normalize an external judgment into the common evaluation shape. The
/// judge must decide: a pending verdict would strand the evaluation outside
/// the manual-review path, so it is rejected rather than recorded.
pub fn draft_from_judgment(judgment: Judgment) -> Result<EvaluationDraft, JudgmentError> {
    if judgment.verdict == Verdict::Pending {
        return Err(JudgmentError::IndeterminateVerdict);
    }

    Ok(EvaluationDraft {
        verdict: judgment.verdict,
        score: judgment.score.clamp(0.0, 100.0),
        rationale: judgment.rationale,
        policy: EvaluationPolicy::ExternalJudgment,
        evaluator: Evaluator::System,
        details: serde_json::Value::Null,
    })
}
