use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::questions::{QuestionId, QuestionSet};
use super::session::{Evaluation, SessionOutcome, Verdict};

/// Final weighted outcome for a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub outcome: SessionOutcome,
    pub obtained: f64,
    pub maximum: f64,
    pub percentage: f64,
    pub threshold: f64,
    pub rationale: String,
    pub questions_passed: usize,
    pub questions_failed: usize,
    pub eliminatory_failures: Vec<QuestionId>,
    /// Per evaluation-policy score distribution, for report transparency.
    pub by_policy: BTreeMap<String, PolicyStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStats {
    pub count: usize,
    pub average_score: f64,
}

/// Standard round-half-up to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate non-pending evaluations into the final weighted outcome.
///
/// Any fail verdict on an eliminatory question short-circuits to rejection
/// with zeroed scores; otherwise the outcome compares the weighted percentage
/// against the set's approval threshold.
pub fn score_session(set: &QuestionSet, evaluations: &[Evaluation]) -> ScoreBreakdown {
    let scored: Vec<&Evaluation> = evaluations
        .iter()
        .filter(|e| e.verdict != Verdict::Pending)
        .collect();

    let eliminatory_failures: Vec<QuestionId> = scored
        .iter()
        .filter(|e| {
            e.verdict == Verdict::Fail
                && set
                    .question(&e.question_id)
                    .map(|q| q.eliminatory)
                    .unwrap_or(false)
        })
        .map(|e| e.question_id.clone())
        .collect();

    let questions_passed = scored.iter().filter(|e| e.verdict == Verdict::Pass).count();
    let questions_failed = scored.iter().filter(|e| e.verdict == Verdict::Fail).count();
    let by_policy = policy_distribution(&scored);

    if !eliminatory_failures.is_empty() {
        let names = eliminatory_failures
            .iter()
            .map(|id| id.0.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        return ScoreBreakdown {
            outcome: SessionOutcome::Rejected,
            obtained: 0.0,
            maximum: 0.0,
            percentage: 0.0,
            threshold: set.approval_threshold,
            rationale: format!("failed eliminatory question(s): {names}"),
            questions_passed,
            questions_failed,
            eliminatory_failures,
            by_policy,
        };
    }

    let mut obtained = 0.0;
    let mut maximum = 0.0;
    for evaluation in &scored {
        let weight = set
            .question(&evaluation.question_id)
            .map(|q| q.weight)
            .unwrap_or(1.0);
        obtained += evaluation.score * weight;
        maximum += 100.0 * weight;
    }

    let obtained = round2(obtained);
    let maximum = round2(maximum);
    let percentage = if maximum == 0.0 {
        0.0
    } else {
        round2(obtained / maximum * 100.0)
    };

    let outcome = if percentage >= set.approval_threshold {
        SessionOutcome::Approved
    } else {
        SessionOutcome::Rejected
    };

    let rationale = format!(
        "{} with {percentage}% (threshold {}%)",
        outcome.label(),
        set.approval_threshold
    );

    ScoreBreakdown {
        outcome,
        obtained,
        maximum,
        percentage,
        threshold: set.approval_threshold,
        rationale,
        questions_passed,
        questions_failed,
        eliminatory_failures,
        by_policy,
    }
}

fn policy_distribution(scored: &[&Evaluation]) -> BTreeMap<String, PolicyStats> {
    let mut totals: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    for evaluation in scored {
        let entry = totals
            .entry(evaluation.policy.label().to_string())
            .or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += evaluation.score;
    }

    totals
        .into_iter()
        .map(|(policy, (count, sum))| {
            (
                policy,
                PolicyStats {
                    count,
                    average_score: round2(sum / count as f64),
                },
            )
        })
        .collect()
}
