use std::sync::{Arc, Mutex};

use super::common::*;
use crate::screening::judgment::{DisabledJudge, Judgment};
use crate::screening::questions::{QuestionId, QuestionSetError, QuestionSetId, RuleSpec};
use crate::screening::service::{CreateSessionRequest, ManualReviewDecision, ScreeningError};
use crate::screening::session::{Candidate, Evaluator, SessionState, Verdict};
use crate::screening::store::SessionStore;

#[tokio::test]
async fn weighted_flow_completes_and_approves() {
    let (service, store, sink) = build_service(range_keyword_set(), DisabledJudge);
    let token = open_session(&service);

    let receipt = service
        .submit_answer(&token, answer("q-range", text("3")))
        .await
        .expect("range answer accepted");
    assert_eq!(receipt.verdict, Verdict::Pass);
    assert_eq!(receipt.score, 100.0);
    assert_eq!(receipt.session.state, "active");

    let receipt = service
        .submit_answer(&token, answer("q-keywords", text("I know a and c")))
        .await
        .expect("keyword answer accepted");
    assert_eq!(receipt.score, 67.0);
    assert_eq!(receipt.session.state, "completed");
    assert_eq!(receipt.session.outcome, "approved");

    let stored = store.load(&token).expect("session present").session;
    let breakdown = stored.score.expect("score recorded");
    assert_eq!(breakdown.obtained, 267.0);
    assert_eq!(breakdown.maximum, 300.0);
    assert_eq!(breakdown.percentage, 89.0);

    let snapshots = sink.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].outcome, "approved");
    assert_eq!(snapshots[0].evaluations.len(), 2);
    assert!(!snapshots[0].transcript.is_empty());
}

#[tokio::test]
async fn range_answer_contributes_weighted_points() {
    let set = question_set(
        vec![rule_question(
            "q-range",
            1,
            2.0,
            false,
            RuleSpec::Range {
                min: Some(1.0),
                max: Some(5.0),
            },
        )],
        70.0,
    );
    let (service, store, _) = build_service(set, DisabledJudge);
    let token = open_session(&service);

    service
        .submit_answer(&token, answer("q-range", text("3")))
        .await
        .expect("answer accepted");

    let breakdown = store
        .load(&token)
        .expect("session present")
        .session
        .score
        .expect("score recorded");
    assert_eq!(breakdown.obtained, 200.0);
    assert_eq!(breakdown.maximum, 200.0);
    assert_eq!(breakdown.percentage, 100.0);
}

#[tokio::test]
async fn duplicate_answers_are_rejected_without_touching_the_evaluation() {
    let (service, store, _) = build_service(range_keyword_set(), DisabledJudge);
    let token = open_session(&service);

    service
        .submit_answer(&token, answer("q-range", text("3")))
        .await
        .expect("first answer accepted");
    let before = store.load(&token).expect("session present").session;

    match service
        .submit_answer(&token, answer("q-range", text("5")))
        .await
    {
        Err(ScreeningError::DuplicateAnswer { question }) => {
            assert_eq!(question, QuestionId("q-range".to_string()));
        }
        other => panic!("expected duplicate answer rejection, got {other:?}"),
    }

    let after = store.load(&token).expect("session present").session;
    assert_eq!(before.evaluations, after.evaluations);
    assert_eq!(before.answered_count(), after.answered_count());
}

#[tokio::test]
async fn expired_sessions_reject_answers_and_transition() {
    let (service, store, _) = build_service(range_keyword_set(), DisabledJudge);
    let token = open_session(&service);
    force_expire(&store, &token);

    match service
        .submit_answer(&token, answer("q-range", text("3")))
        .await
    {
        Err(ScreeningError::SessionExpired { .. }) => {}
        other => panic!("expected expiration rejection, got {other:?}"),
    }

    let stored = store.load(&token).expect("session present").session;
    assert_eq!(stored.state, SessionState::Expired);
    assert!(stored.evaluations.is_empty());
}

#[tokio::test]
async fn completed_sessions_absorb_further_writes() {
    let set = question_set(
        vec![rule_question(
            "q-only",
            1,
            1.0,
            false,
            RuleSpec::ExactMatch {
                expected: "yes".to_string(),
            },
        )],
        50.0,
    );
    let (service, _, _) = build_service(set, DisabledJudge);
    let token = open_session(&service);

    service
        .submit_answer(&token, answer("q-only", text("yes")))
        .await
        .expect("answer accepted");

    match service
        .submit_answer(&token, answer("q-only", text("yes")))
        .await
    {
        Err(ScreeningError::TerminalState { state }) => {
            assert_eq!(state, SessionState::Completed);
        }
        other => panic!("expected terminal-state rejection, got {other:?}"),
    }

    match service.begin(&token) {
        Err(ScreeningError::TerminalState { .. }) => {}
        other => panic!("expected terminal-state rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn eliminatory_failure_rejects_immediately() {
    let set = question_set(
        vec![
            rule_question(
                "q-knockout",
                1,
                1.0,
                true,
                RuleSpec::ExactMatch {
                    expected: "yes".to_string(),
                },
            ),
            rule_question(
                "q-other",
                2,
                3.0,
                false,
                RuleSpec::ExactMatch {
                    expected: "yes".to_string(),
                },
            ),
        ],
        50.0,
    );
    let (service, store, sink) = build_service(set, DisabledJudge);
    let token = open_session(&service);

    let receipt = service
        .submit_answer(&token, answer("q-knockout", text("no")))
        .await
        .expect("answer accepted; failing is not an error");

    assert_eq!(receipt.verdict, Verdict::Fail);
    assert_eq!(receipt.session.state, "completed");
    assert_eq!(receipt.session.outcome, "rejected");

    let breakdown = store
        .load(&token)
        .expect("session present")
        .session
        .score
        .expect("score recorded");
    assert_eq!(breakdown.obtained, 0.0);
    assert_eq!(breakdown.maximum, 0.0);
    assert_eq!(sink.snapshots().len(), 1);
}

#[tokio::test]
async fn manual_review_blocks_completion_until_resolved() {
    let set = question_set(
        vec![
            manual_question("q-manual", 1, 1.0),
            rule_question(
                "q-range",
                2,
                2.0,
                false,
                RuleSpec::Range {
                    min: Some(1.0),
                    max: Some(5.0),
                },
            ),
        ],
        50.0,
    );
    let (service, store, sink) = build_service(set, DisabledJudge);
    let token = open_session(&service);

    let receipt = service
        .submit_answer(&token, answer("q-manual", text("my essay answer")))
        .await
        .expect("manual answer accepted");
    assert_eq!(receipt.verdict, Verdict::Pending);
    assert_eq!(receipt.rationale, "awaiting manual review");

    let receipt = service
        .submit_answer(&token, answer("q-range", text("4")))
        .await
        .expect("rule answer accepted");
    assert_eq!(receipt.session.state, "active");
    assert!(sink.snapshots().is_empty());

    let pending_id = store
        .load(&token)
        .expect("session present")
        .session
        .evaluation_for(&QuestionId("q-manual".to_string()))
        .expect("pending evaluation present")
        .id;

    let view = service
        .resolve_manual_review(
            &token,
            &QuestionId("q-manual".to_string()),
            ManualReviewDecision {
                verdict: Verdict::Pass,
                score: 80.0,
                rationale: "solid reasoning".to_string(),
                reviewer: "reviewer@example.com".to_string(),
            },
        )
        .expect("review resolves");
    assert_eq!(view.state, "completed");
    assert_eq!(view.outcome, "approved");

    let stored = store.load(&token).expect("session present").session;
    let resolved = stored
        .evaluation_for(&QuestionId("q-manual".to_string()))
        .expect("evaluation present");
    assert_eq!(resolved.id, pending_id);
    assert_eq!(resolved.verdict, Verdict::Pass);
    assert_eq!(resolved.score, 80.0);
    assert_eq!(
        resolved.evaluator,
        Evaluator::Human("reviewer@example.com".to_string())
    );

    // obtained = 80*1 + 100*2 = 280, maximum = 300
    let breakdown = stored.score.expect("score recorded");
    assert_eq!(breakdown.obtained, 280.0);
    assert_eq!(breakdown.percentage, 93.33);
    assert_eq!(sink.snapshots().len(), 1);
}

#[tokio::test]
async fn resolving_a_non_pending_evaluation_is_rejected() {
    let (service, _, _) = build_service(range_keyword_set(), DisabledJudge);
    let token = open_session(&service);

    service
        .submit_answer(&token, answer("q-range", text("3")))
        .await
        .expect("answer accepted");

    match service.resolve_manual_review(
        &token,
        &QuestionId("q-range".to_string()),
        ManualReviewDecision {
            verdict: Verdict::Fail,
            score: 0.0,
            rationale: "override".to_string(),
            reviewer: "reviewer@example.com".to_string(),
        },
    ) {
        Err(ScreeningError::ReviewNotPending { question }) => {
            assert_eq!(question, QuestionId("q-range".to_string()));
        }
        other => panic!("expected review rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn external_judgments_are_normalized_into_evaluations() {
    let set = question_set(vec![external_question("q-essay", 1, 1.0)], 50.0);
    let (service, store, _) = build_service(set, StaticJudge::passing(80.0));
    let token = open_session(&service);

    let receipt = service
        .submit_answer(&token, answer("q-essay", text("a thoughtful essay")))
        .await
        .expect("judged answer accepted");
    assert_eq!(receipt.verdict, Verdict::Pass);
    assert_eq!(receipt.score, 80.0);
    assert_eq!(receipt.session.state, "completed");

    let stored = store.load(&token).expect("session present").session;
    let evaluation = stored
        .evaluation_for(&QuestionId("q-essay".to_string()))
        .expect("evaluation present");
    assert_eq!(evaluation.evaluator, Evaluator::System);
    assert_eq!(
        evaluation.policy,
        crate::screening::questions::EvaluationPolicy::ExternalJudgment
    );
}

#[tokio::test]
async fn judges_must_decide_pending_verdicts_are_rejected() {
    let set = question_set(vec![external_question("q-essay", 1, 1.0)], 50.0);
    let undecided = StaticJudge {
        judgment: Judgment {
            verdict: Verdict::Pending,
            score: 50.0,
            rationale: "cannot decide".to_string(),
        },
    };
    let (service, store, _) = build_service(set, undecided);
    let token = open_session(&service);

    match service
        .submit_answer(&token, answer("q-essay", text("a thoughtful essay")))
        .await
    {
        Err(ScreeningError::JudgmentUnavailable(reason)) => {
            assert!(reason.contains("pass or fail"));
        }
        other => panic!("expected verdict rejection, got {other:?}"),
    }

    let stored = store.load(&token).expect("session present").session;
    assert!(stored.evaluations.is_empty());
    assert_eq!(stored.answered_count(), 0);
}

#[tokio::test]
async fn judge_outage_surfaces_error_and_leaves_session_untouched() {
    let set = question_set(vec![external_question("q-essay", 1, 1.0)], 50.0);
    let (service, store, _) = build_service(set, OfflineJudge);
    let token = open_session(&service);

    match service
        .submit_answer(&token, answer("q-essay", text("a thoughtful essay")))
        .await
    {
        Err(ScreeningError::JudgmentUnavailable(reason)) => {
            assert!(reason.contains("judge offline"));
        }
        other => panic!("expected judgment unavailability, got {other:?}"),
    }

    let stored = store.load(&token).expect("session present").session;
    assert!(stored.evaluations.is_empty());
    assert_eq!(stored.answered_count(), 0);
    assert_eq!(stored.state, SessionState::Pending);
}

#[tokio::test]
async fn inflight_judgment_is_discarded_when_the_session_expires() {
    let set = question_set(vec![external_question("q-essay", 1, 1.0)], 50.0);
    let sink = Arc::new(MemorySink::default());

    let catalog = crate::screening::questions::InMemoryQuestionSets::default();
    catalog.register(set).expect("valid question set");
    let store = Arc::new(crate::screening::store::InMemorySessionStore::default());
    let judge = Arc::new(ExpiringJudge {
        store: store.clone(),
        token: Mutex::new(None),
    });
    let service = crate::screening::service::ScreeningService::new(
        Arc::new(catalog),
        store.clone(),
        judge.clone(),
        sink.clone(),
        chrono::Duration::hours(72),
    );

    let view = service
        .create_session(CreateSessionRequest {
            question_set_id: QuestionSetId(SET_ID.to_string()),
            candidate: Candidate::default(),
        })
        .expect("session opens");
    let token = view.token;
    *judge.token.lock().expect("token mutex poisoned") = Some(token.clone());

    match service
        .submit_answer(&token, answer("q-essay", text("a thoughtful essay")))
        .await
    {
        Err(ScreeningError::SessionExpired { .. }) => {}
        other => panic!("expected stale judgment discard, got {other:?}"),
    }

    let stored = store.load(&token).expect("session present").session;
    assert_eq!(stored.state, SessionState::Expired);
    assert!(stored.evaluations.is_empty());
    assert!(sink.snapshots().is_empty());
}

#[tokio::test]
async fn report_failures_never_roll_back_completion() {
    let set = question_set(
        vec![rule_question(
            "q-only",
            1,
            1.0,
            false,
            RuleSpec::ExactMatch {
                expected: "yes".to_string(),
            },
        )],
        50.0,
    );
    let (service, store) = build_service_with(set, Arc::new(DisabledJudge), Arc::new(FailingSink));
    let token = open_session(&service);

    let receipt = service
        .submit_answer(&token, answer("q-only", text("yes")))
        .await
        .expect("answer accepted despite sink failure");
    assert_eq!(receipt.session.state, "completed");

    let stored = store.load(&token).expect("session present").session;
    assert_eq!(stored.state, SessionState::Completed);
}

#[tokio::test]
async fn strict_order_sets_reject_out_of_order_answers() {
    let mut set = range_keyword_set();
    set.strict_order = true;
    let (service, _, _) = build_service(set, DisabledJudge);
    let token = open_session(&service);

    match service
        .submit_answer(&token, answer("q-keywords", text("a and b")))
        .await
    {
        Err(ScreeningError::OutOfOrder { expected }) => {
            assert_eq!(expected, QuestionId("q-range".to_string()));
        }
        other => panic!("expected ordering rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_answers_are_validation_errors() {
    let (service, store, _) = build_service(range_keyword_set(), DisabledJudge);
    let token = open_session(&service);

    match service
        .submit_answer(&token, answer("q-range", text("   ")))
        .await
    {
        Err(ScreeningError::Validation(_)) => {}
        other => panic!("expected validation rejection, got {other:?}"),
    }

    let stored = store.load(&token).expect("session present").session;
    assert!(stored.evaluations.is_empty());
}

#[test]
fn creating_against_an_unknown_set_fails() {
    let (service, _, _) = build_service(range_keyword_set(), DisabledJudge);

    match service.create_session(CreateSessionRequest {
        question_set_id: QuestionSetId("missing-set".to_string()),
        candidate: Candidate::default(),
    }) {
        Err(ScreeningError::QuestionSet(QuestionSetError::NotFound)) => {}
        other => panic!("expected missing-set rejection, got {other:?}"),
    }
}

#[test]
fn status_reads_expire_lazily_but_are_not_rejected() {
    let (service, store, _) = build_service(range_keyword_set(), DisabledJudge);
    let token = open_session(&service);
    force_expire(&store, &token);

    let view = service.session_status(&token).expect("status readable");
    assert_eq!(view.state, "expired");

    let stored = store.load(&token).expect("session present").session;
    assert_eq!(stored.state, SessionState::Expired);
}

#[test]
fn begin_prompts_the_first_question() {
    let (service, store, _) = build_service(range_keyword_set(), DisabledJudge);
    let token = open_session(&service);

    let view = service.begin(&token).expect("session begins");
    assert_eq!(view.state, "active");

    let stored = store.load(&token).expect("session present").session;
    assert!(stored
        .messages
        .iter()
        .any(|m| m.kind == crate::screening::session::MessageKind::QuestionPrompt
            && m.question_id == Some(QuestionId("q-range".to_string()))));
}
