use std::collections::BTreeSet;

use super::questions::RuleSpec;
use super::session::{AnswerValue, Verdict};

/// Normalized result shared by every evaluator variant.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub verdict: Verdict,
    pub score: f64,
    pub rationale: String,
}

/// Malformed answer input; the session is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum AnswerValidationError {
    #[error("answer must not be empty")]
    EmptyAnswer,
    #[error("selection must contain at least one option")]
    EmptySelection,
    #[error("this question expects a text answer")]
    ExpectedText,
    #[error("this question expects a selection of option identifiers")]
    ExpectedSelection,
    #[error("score must be between 0 and 100, got {0}")]
    ScoreOutOfRange(f64),
    #[error("review verdict must be pass or fail")]
    PendingReviewVerdict,
}

/// Apply one fixed judging rule to an answer. Pure and deterministic; a fail
/// verdict is a legitimate outcome, never an error.
pub fn evaluate(rule: &RuleSpec, answer: &AnswerValue) -> Result<RuleOutcome, AnswerValidationError> {
    match rule {
        RuleSpec::Range { min, max } => evaluate_range(*min, *max, text_answer(answer)?),
        RuleSpec::KeywordSet {
            keywords,
            minimum_matches,
        } => evaluate_keywords(keywords, *minimum_matches, text_answer(answer)?),
        RuleSpec::ExactMatch { expected } => evaluate_exact(expected, text_answer(answer)?),
        RuleSpec::Choice {
            correct_choices,
            multi_select,
        } => evaluate_choice(correct_choices, *multi_select, selection_answer(answer)?),
    }
}

fn text_answer(answer: &AnswerValue) -> Result<&str, AnswerValidationError> {
    match answer {
        AnswerValue::Text(text) if text.trim().is_empty() => {
            Err(AnswerValidationError::EmptyAnswer)
        }
        AnswerValue::Text(text) => Ok(text),
        AnswerValue::Selection(_) => Err(AnswerValidationError::ExpectedText),
    }
}

fn selection_answer(answer: &AnswerValue) -> Result<&[String], AnswerValidationError> {
    match answer {
        AnswerValue::Selection(choices) if choices.is_empty() => {
            Err(AnswerValidationError::EmptySelection)
        }
        AnswerValue::Selection(choices) => Ok(choices),
        AnswerValue::Text(_) => Err(AnswerValidationError::ExpectedSelection),
    }
}

fn evaluate_range(
    min: Option<f64>,
    max: Option<f64>,
    answer: &str,
) -> Result<RuleOutcome, AnswerValidationError> {
    let value: f64 = match answer.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            return Ok(RuleOutcome {
                verdict: Verdict::Fail,
                score: 0.0,
                rationale: "invalid numeric answer".to_string(),
            });
        }
    };

    let above_min = min.map(|bound| value >= bound).unwrap_or(true);
    let below_max = max.map(|bound| value <= bound).unwrap_or(true);

    if above_min && below_max {
        Ok(RuleOutcome {
            verdict: Verdict::Pass,
            score: 100.0,
            rationale: format!("value {value} within range {}..{}", bound_label(min), bound_label(max)),
        })
    } else {
        Ok(RuleOutcome {
            verdict: Verdict::Fail,
            score: 0.0,
            rationale: format!("value {value} outside range {}..{}", bound_label(min), bound_label(max)),
        })
    }
}

fn bound_label(bound: Option<f64>) -> String {
    bound.map(|b| b.to_string()).unwrap_or_else(|| "*".to_string())
}

fn evaluate_keywords(
    keywords: &[String],
    minimum_matches: usize,
    answer: &str,
) -> Result<RuleOutcome, AnswerValidationError> {
    let haystack = answer.to_lowercase();
    let matches = keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|keyword| haystack.contains(keyword.as_str()))
        .count();

    let verdict = if matches >= minimum_matches {
        Verdict::Pass
    } else {
        Verdict::Fail
    };
    let score = ((100.0 * matches as f64) / keywords.len() as f64).round().min(100.0);

    Ok(RuleOutcome {
        verdict,
        score,
        rationale: format!(
            "matched {matches} of {} keyword(s), minimum {minimum_matches}",
            keywords.len()
        ),
    })
}

fn evaluate_exact(expected: &str, answer: &str) -> Result<RuleOutcome, AnswerValidationError> {
    let matched = answer.trim().to_lowercase() == expected.trim().to_lowercase();

    Ok(if matched {
        RuleOutcome {
            verdict: Verdict::Pass,
            score: 100.0,
            rationale: "answer matches expected value".to_string(),
        }
    } else {
        RuleOutcome {
            verdict: Verdict::Fail,
            score: 0.0,
            rationale: "answer does not match expected value".to_string(),
        }
    })
}

fn evaluate_choice(
    correct_choices: &[String],
    multi_select: bool,
    selected: &[String],
) -> Result<RuleOutcome, AnswerValidationError> {
    let normalize = |choices: &[String]| {
        choices
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect::<BTreeSet<_>>()
    };

    let correct = normalize(correct_choices);
    let picked = normalize(selected);

    // Multi-select accepts any non-empty subset of the correct set; single
    // answer demands exact set equality. No partial credit either way.
    let matched = if multi_select {
        !picked.is_empty() && picked.is_subset(&correct)
    } else {
        picked == correct
    };

    Ok(if matched {
        RuleOutcome {
            verdict: Verdict::Pass,
            score: 100.0,
            rationale: "selected choices are correct".to_string(),
        }
    } else {
        RuleOutcome {
            verdict: Verdict::Fail,
            score: 0.0,
            rationale: "selected choices are incorrect".to_string(),
        }
    })
}
