use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Identifier wrapper for catalog questions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestionId(pub String);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for question sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionSetId(pub String);

impl fmt::Display for QuestionSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which evaluator variant judges a question's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPolicy {
    Rule,
    ExternalJudgment,
    ManualReview,
}

impl EvaluationPolicy {
    pub const fn label(self) -> &'static str {
        match self {
            EvaluationPolicy::Rule => "rule",
            EvaluationPolicy::ExternalJudgment => "external_judgment",
            EvaluationPolicy::ManualReview => "manual_review",
        }
    }
}

/// Closed set of deterministic answer-judging rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Numeric answer bounded on either side; an absent bound is unbounded.
    Range { min: Option<f64>, max: Option<f64> },
    /// Case-insensitive substring matches against a keyword list.
    KeywordSet {
        keywords: Vec<String>,
        minimum_matches: usize,
    },
    /// Case-insensitive trimmed equality.
    ExactMatch { expected: String },
    /// Option-identifier selection checked against the correct choices.
    Choice {
        correct_choices: Vec<String>,
        multi_select: bool,
    },
}

fn default_weight() -> f64 {
    1.0
}

fn default_active() -> bool {
    true
}

/// One catalog question with its evaluation policy and scoring weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub position: u32,
    pub prompt: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub eliminatory: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub policy: EvaluationPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleSpec>,
    /// Free-text criteria forwarded to the external judgment collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judging_criteria: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Immutable-during-session catalog of questions plus approval policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: QuestionSetId,
    pub name: String,
    /// Percentage (0-100) a session must reach to be approved.
    pub approval_threshold: f64,
    /// When set, answers must follow ordinal question order.
    #[serde(default)]
    pub strict_order: bool,
    pub questions: Vec<Question>,
}

impl QuestionSet {
    /// Active questions in ordinal order.
    pub fn active_questions(&self) -> impl Iterator<Item = &Question> {
        let mut ordered: Vec<&Question> = self.questions.iter().filter(|q| q.active).collect();
        ordered.sort_by_key(|q| q.position);
        ordered.into_iter()
    }

    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == *id && q.active)
    }

    /// Reject malformed definitions up front so sessions never observe them.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..=100.0).contains(&self.approval_threshold) {
            return Err(ConfigurationError::ThresholdOutOfRange {
                set: self.id.clone(),
                found: self.approval_threshold,
            });
        }

        if !self.questions.iter().any(|q| q.active) {
            return Err(ConfigurationError::NoActiveQuestions {
                set: self.id.clone(),
            });
        }

        let mut seen = BTreeSet::new();
        for question in &self.questions {
            if !seen.insert(question.id.clone()) {
                return Err(ConfigurationError::DuplicateQuestionId {
                    id: question.id.clone(),
                });
            }

            if !question.weight.is_finite() || question.weight <= 0.0 {
                return Err(ConfigurationError::NonPositiveWeight {
                    question: question.id.clone(),
                    found: question.weight,
                });
            }

            match (question.policy, &question.rule) {
                (EvaluationPolicy::Rule, None) => {
                    return Err(ConfigurationError::MissingRule {
                        question: question.id.clone(),
                    });
                }
                (EvaluationPolicy::Rule, Some(rule)) => validate_rule(&question.id, rule)?,
                (_, Some(_)) => {
                    return Err(ConfigurationError::UnexpectedRule {
                        question: question.id.clone(),
                        policy: question.policy,
                    });
                }
                (_, None) => {}
            }
        }

        Ok(())
    }

    /// Built-in sample used when no catalog file is configured.
    pub fn sample() -> Self {
        Self {
            id: QuestionSetId("sample-screening".to_string()),
            name: "Sample screening interview".to_string(),
            approval_threshold: 70.0,
            strict_order: false,
            questions: vec![
                Question {
                    id: QuestionId("years-experience".to_string()),
                    position: 1,
                    prompt: "How many years of professional experience do you have?".to_string(),
                    required: true,
                    eliminatory: false,
                    weight: 2.0,
                    policy: EvaluationPolicy::Rule,
                    rule: Some(RuleSpec::Range {
                        min: Some(2.0),
                        max: None,
                    }),
                    judging_criteria: None,
                    active: true,
                },
                Question {
                    id: QuestionId("work-authorization".to_string()),
                    position: 2,
                    prompt: "Are you legally authorized to work here? (yes/no)".to_string(),
                    required: true,
                    eliminatory: true,
                    weight: 1.0,
                    policy: EvaluationPolicy::Rule,
                    rule: Some(RuleSpec::ExactMatch {
                        expected: "yes".to_string(),
                    }),
                    judging_criteria: None,
                    active: true,
                },
                Question {
                    id: QuestionId("tooling".to_string()),
                    position: 3,
                    prompt: "Which tools from our stack have you used?".to_string(),
                    required: true,
                    eliminatory: false,
                    weight: 1.0,
                    policy: EvaluationPolicy::Rule,
                    rule: Some(RuleSpec::KeywordSet {
                        keywords: vec![
                            "docker".to_string(),
                            "kubernetes".to_string(),
                            "terraform".to_string(),
                        ],
                        minimum_matches: 1,
                    }),
                    judging_criteria: None,
                    active: true,
                },
            ],
        }
    }
}

fn validate_rule(question: &QuestionId, rule: &RuleSpec) -> Result<(), ConfigurationError> {
    match rule {
        RuleSpec::Range { min: None, max: None } => Err(ConfigurationError::EmptyRange {
            question: question.clone(),
        }),
        RuleSpec::Range {
            min: Some(min),
            max: Some(max),
        } if min > max => Err(ConfigurationError::InvertedRange {
            question: question.clone(),
            min: *min,
            max: *max,
        }),
        RuleSpec::Range { .. } => Ok(()),
        RuleSpec::KeywordSet {
            keywords,
            minimum_matches,
        } => {
            if keywords.is_empty() || keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(ConfigurationError::EmptyKeywords {
                    question: question.clone(),
                });
            }
            if *minimum_matches == 0 || *minimum_matches > keywords.len() {
                return Err(ConfigurationError::UnsatisfiableMinimumMatches {
                    question: question.clone(),
                    minimum: *minimum_matches,
                    available: keywords.len(),
                });
            }
            Ok(())
        }
        RuleSpec::ExactMatch { expected } => {
            if expected.trim().is_empty() {
                return Err(ConfigurationError::BlankExpectedAnswer {
                    question: question.clone(),
                });
            }
            Ok(())
        }
        RuleSpec::Choice {
            correct_choices, ..
        } => {
            if correct_choices.is_empty() || correct_choices.iter().any(|c| c.trim().is_empty()) {
                return Err(ConfigurationError::EmptyChoices {
                    question: question.clone(),
                });
            }
            let mut seen = BTreeSet::new();
            for choice in correct_choices {
                if !seen.insert(choice.trim().to_lowercase()) {
                    return Err(ConfigurationError::DuplicateChoice {
                        question: question.clone(),
                        choice: choice.clone(),
                    });
                }
            }
            Ok(())
        }
    }
}

/// Malformed question or rule definitions; fatal, never defaulted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("question set {set}: approval threshold {found} outside 0-100")]
    ThresholdOutOfRange { set: QuestionSetId, found: f64 },
    #[error("question set {set}: no active questions")]
    NoActiveQuestions { set: QuestionSetId },
    #[error("duplicate question id {id}")]
    DuplicateQuestionId { id: QuestionId },
    #[error("question {question}: weight {found} must be a positive number")]
    NonPositiveWeight { question: QuestionId, found: f64 },
    #[error("question {question}: rule policy without a rule specification")]
    MissingRule { question: QuestionId },
    #[error("question {question}: rule specification attached to {} policy", policy.label())]
    UnexpectedRule {
        question: QuestionId,
        policy: EvaluationPolicy,
    },
    #[error("question {question}: range rule needs at least one bound")]
    EmptyRange { question: QuestionId },
    #[error("question {question}: range bounds inverted ({min} > {max})")]
    InvertedRange {
        question: QuestionId,
        min: f64,
        max: f64,
    },
    #[error("question {question}: keyword rule needs non-blank keywords")]
    EmptyKeywords { question: QuestionId },
    #[error("question {question}: minimum matches {minimum} unsatisfiable with {available} keyword(s)")]
    UnsatisfiableMinimumMatches {
        question: QuestionId,
        minimum: usize,
        available: usize,
    },
    #[error("question {question}: exact-match rule with blank expected answer")]
    BlankExpectedAnswer { question: QuestionId },
    #[error("question {question}: choice rule needs non-blank choices")]
    EmptyChoices { question: QuestionId },
    #[error("question {question}: duplicate choice '{choice}'")]
    DuplicateChoice { question: QuestionId, choice: String },
}

/// Read-only access to the question snapshot a session was created against.
pub trait QuestionSetProvider: Send + Sync {
    fn question_set(&self, id: &QuestionSetId) -> Result<QuestionSet, QuestionSetError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QuestionSetError {
    #[error("question set not found")]
    NotFound,
    #[error("question set provider unavailable: {0}")]
    Unavailable(String),
}

/// In-memory provider; sets are validated on registration.
#[derive(Default)]
pub struct InMemoryQuestionSets {
    sets: Mutex<HashMap<QuestionSetId, QuestionSet>>,
}

impl InMemoryQuestionSets {
    pub fn with_sets(sets: Vec<QuestionSet>) -> Result<Self, ConfigurationError> {
        let provider = Self::default();
        for set in sets {
            provider.register(set)?;
        }
        Ok(provider)
    }

    pub fn register(&self, set: QuestionSet) -> Result<(), ConfigurationError> {
        set.validate()?;
        let mut guard = self
            .sets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.insert(set.id.clone(), set);
        Ok(())
    }
}

impl QuestionSetProvider for InMemoryQuestionSets {
    fn question_set(&self, id: &QuestionSetId) -> Result<QuestionSet, QuestionSetError> {
        let guard = self
            .sets
            .lock()
            .map_err(|_| QuestionSetError::Unavailable("catalog mutex poisoned".to_string()))?;
        guard.get(id).cloned().ok_or(QuestionSetError::NotFound)
    }
}

/// Load and validate a JSON catalog of question sets from disk.
pub fn load_question_sets(path: &Path) -> Result<Vec<QuestionSet>, CatalogLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CatalogLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let sets: Vec<QuestionSet> =
        serde_json::from_str(&raw).map_err(|source| CatalogLoadError::Json {
            path: path.display().to_string(),
            source,
        })?;
    for set in &sets {
        set.validate()?;
    }
    Ok(sets)
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("failed to read question catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse question catalog {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigurationError),
}
