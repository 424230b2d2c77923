use std::sync::Arc;
use std::time::Duration;

use backend::{InMemoryProvider, ProviderCall, ProviderError};
use quiz_core::model::{
    AccessError, AccessSnapshot, Question, QuestionId, QuestionKind, QuizDefinition, QuizId,
    Skill, SubscriptionTier, UserId,
};
use quiz_core::time::fixed_clock;
use services::{
    QuizSessionController, ResultsError, ResultsService, SessionError, SessionPhase,
    SubmitOutcome, TickReport, TickerMode,
};

fn choice(id: &str, correct: &str) -> Question {
    Question::new(QuestionId::new(id), QuestionKind::SingleChoice, format!("Prompt {id}"))
        .unwrap()
        .with_choices(["A", "B", "C", "D"])
        .with_correct_answer(correct)
}

fn three_question_quiz(minutes: Option<u32>) -> QuizDefinition {
    let fill = Question::new(QuestionId::new("q2"), QuestionKind::ShortText, "Fill the gap")
        .unwrap()
        .with_correct_answer("two")
        .with_explanation("Plural noun follows.");
    QuizDefinition::new(
        QuizId::new("quiz-1"),
        "Reading Part 5",
        Skill::Reading,
        5,
        vec![choice("q1", "A"), fill, choice("q3", "C")],
        minutes,
    )
    .unwrap()
}

fn premium() -> AccessSnapshot {
    AccessSnapshot::new(UserId::new("u1"), SubscriptionTier::Premium, 0, 0)
}

fn setup(
    provider: &InMemoryProvider,
    minutes: Option<u32>,
    ticker: TickerMode,
) -> Arc<QuizSessionController> {
    provider.insert_quiz(three_question_quiz(minutes));
    QuizSessionController::new(Arc::new(provider.clone()), fixed_clock(), ticker)
}

async fn started(
    provider: &InMemoryProvider,
    minutes: Option<u32>,
    ticker: TickerMode,
) -> Arc<QuizSessionController> {
    let session = setup(provider, minutes, ticker);
    session
        .start(&QuizId::new("quiz-1"), &premium())
        .await
        .unwrap();
    session
}

fn stored_answers(provider: &InMemoryProvider, session: &QuizSessionController) -> Vec<String> {
    let attempt = provider.attempt(&session.attempt_id().unwrap()).unwrap();
    attempt
        .answers
        .iter()
        .map(|slot| slot.answer().to_owned())
        .collect()
}

#[tokio::test]
async fn answered_quiz_submits_slots_in_question_order() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, None, TickerMode::Manual).await;
    assert_eq!(session.phase(), SessionPhase::Active);
    assert_eq!(session.slots().len(), 3);

    session.record_answer(0, "A").unwrap();
    session.record_answer(2, "C").unwrap();
    assert_eq!(session.answered_flags(), [true, false, true]);

    let SubmitOutcome::Completed(result) = session.submit().await.unwrap() else {
        panic!("expected a completed submission");
    };

    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 1);
    assert_eq!(stored_answers(&provider, &session), ["A", "", "C"]);
    assert_eq!(session.phase(), SessionPhase::Completed);
    assert_eq!(session.result(), Some(result.clone()));
    assert_eq!(result.correct_count(), 2);
    assert!((result.score - 200.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn record_answer_is_idempotent() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, None, TickerMode::Manual).await;

    assert_eq!(session.record_answer(1, "two"), Ok(true));
    let before = session.slots();
    assert_eq!(session.record_answer(1, "two"), Ok(false));
    assert_eq!(session.slots(), before);
}

#[tokio::test]
async fn out_of_range_index_is_rejected() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, None, TickerMode::Manual).await;

    assert!(matches!(
        session.record_answer(3, "x"),
        Err(SessionError::State(_))
    ));
    assert!(matches!(session.navigate(7), Err(SessionError::State(_))));
    assert_eq!(session.current_index(), Some(0));
}

#[tokio::test]
async fn navigation_preserves_answers() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, None, TickerMode::Manual).await;

    session.record_answer(0, "B").unwrap();
    assert_eq!(session.navigate(1).unwrap(), "");
    assert_eq!(session.navigate(0).unwrap(), "B");
    assert_eq!(session.current_answer().as_deref(), Some("B"));
    assert_eq!(session.slots()[0].answer(), "B");
}

#[tokio::test]
async fn one_minute_quiz_submits_itself_after_sixty_ticks() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, Some(1), TickerMode::Manual).await;
    assert_eq!(session.remaining_secs(), Some(60));

    for expected in (1..60).rev() {
        assert_eq!(
            session.tick().await.unwrap(),
            TickReport::Running {
                remaining: expected
            }
        );
    }
    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 0);

    let report = session.tick().await.unwrap();
    assert!(matches!(report, TickReport::AutoSubmitted(_)));
    assert_eq!(session.phase(), SessionPhase::Completed);

    for _ in 0..5 {
        assert_eq!(session.tick().await.unwrap(), TickReport::Inactive);
    }
    assert_eq!(session.remaining_secs(), Some(0));
    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 1);
}

#[tokio::test(start_paused = true)]
async fn automatic_ticker_submits_on_timeout() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, Some(1), TickerMode::every_second()).await;
    assert!(session.is_ticking());

    tokio::time::sleep(Duration::from_millis(30_500)).await;
    assert_eq!(session.remaining_secs(), Some(30));
    assert_eq!(session.phase(), SessionPhase::Active);

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(session.phase(), SessionPhase::Completed);
    assert_eq!(session.remaining_secs(), Some(0));
    assert!(!session.is_ticking());
    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_submit_stops_the_countdown() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, Some(1), TickerMode::every_second()).await;

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    session.submit().await.unwrap();
    assert!(!session.is_ticking());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(session.remaining_secs(), Some(50));
    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_releases_the_ticker() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, Some(1), TickerMode::every_second()).await;

    session.teardown();
    assert!(!session.is_ticking());
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(session.phase(), SessionPhase::Uninitialized);
    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_submits_finalize_once() {
    let provider = InMemoryProvider::new().with_latency(Duration::from_millis(200));
    let session = started(&provider, None, TickerMode::Manual).await;
    session.record_answer(0, "A").unwrap();

    let (first, second) = tokio::join!(session.submit(), session.submit());

    assert!(matches!(first, Ok(SubmitOutcome::Completed(_))));
    assert_eq!(second, Ok(SubmitOutcome::AlreadySubmitting));
    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 1);
}

#[tokio::test(start_paused = true)]
async fn save_during_submission_is_rejected() {
    let provider = InMemoryProvider::new().with_latency(Duration::from_millis(200));
    let session = started(&provider, None, TickerMode::Manual).await;

    let (submitted, saved) = tokio::join!(session.submit(), session.save_progress());

    assert!(matches!(submitted, Ok(SubmitOutcome::Completed(_))));
    assert_eq!(saved, Err(SessionError::Busy));
    assert_eq!(provider.calls(ProviderCall::UpdateAttempt), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_saves_are_serialised() {
    let provider = InMemoryProvider::new().with_latency(Duration::from_millis(200));
    let session = started(&provider, None, TickerMode::Manual).await;

    let (first, second) = tokio::join!(session.save_progress(), session.save_progress());

    assert!(first.is_ok());
    assert_eq!(second, Err(SessionError::Busy));
    assert_eq!(provider.calls(ProviderCall::UpdateAttempt), 1);
}

#[tokio::test(start_paused = true)]
async fn start_from_a_torn_down_session_does_not_take_over_the_next_one() {
    let provider = InMemoryProvider::new().with_latency(Duration::from_millis(200));
    let session = setup(&provider, None, TickerMode::Manual);
    let template = three_question_quiz(None);
    provider.insert_quiz(
        QuizDefinition::new(
            QuizId::new("quiz-2"),
            "Reading Part 6",
            Skill::Reading,
            6,
            template.questions().to_vec(),
            None,
        )
        .unwrap(),
    );

    let abandoned = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.start(&QuizId::new("quiz-1"), &premium()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.teardown();
    session
        .start(&QuizId::new("quiz-2"), &premium())
        .await
        .unwrap();

    assert_eq!(abandoned.await.unwrap(), Err(SessionError::Discarded));
    assert_eq!(session.phase(), SessionPhase::Active);
    assert_eq!(session.quiz().unwrap().id(), &QuizId::new("quiz-2"));
    assert_eq!(provider.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_submit_from_a_torn_down_session_leaves_the_next_one_alone() {
    let provider = InMemoryProvider::new().with_latency(Duration::from_millis(200));
    let session = started(&provider, None, TickerMode::Manual).await;
    let first_attempt = session.attempt_id().unwrap();
    provider.fail_next(ProviderCall::UpdateAttempt, ProviderError::NotFound);

    let abandoned = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.submit().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.teardown();
    session
        .start(&QuizId::new("quiz-1"), &premium())
        .await
        .unwrap();

    assert!(matches!(abandoned.await.unwrap(), Err(SessionError::Submit(_))));
    assert_eq!(session.phase(), SessionPhase::Active);
    assert_eq!(session.last_failure(), None);
    assert_ne!(session.attempt_id(), Some(first_attempt));
}

#[tokio::test]
async fn exhausted_quota_blocks_start() {
    let provider = InMemoryProvider::new();
    let session = setup(&provider, None, TickerMode::Manual);
    let free = AccessSnapshot::new(UserId::new("u2"), SubscriptionTier::Free, 3, 3);

    let err = session
        .start(&QuizId::new("quiz-1"), &free)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SessionError::QuotaExceeded(AccessError::QuotaExceeded { used: 3, limit: 3 })
    );
    assert_eq!(session.phase(), SessionPhase::Uninitialized);
    assert_eq!(provider.calls(ProviderCall::FetchQuiz), 0);
    assert_eq!(provider.calls(ProviderCall::CreateAttempt), 0);
    assert_eq!(provider.attempt_count(), 0);
}

#[tokio::test]
async fn free_user_with_quota_left_may_start() {
    let provider = InMemoryProvider::new();
    let session = setup(&provider, None, TickerMode::Manual);
    let free = AccessSnapshot::new(UserId::new("u2"), SubscriptionTier::Free, 2, 3);

    session.start(&QuizId::new("quiz-1"), &free).await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Active);
}

#[tokio::test]
async fn failed_save_keeps_session_active_and_retry_succeeds() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, None, TickerMode::Manual).await;
    session.record_answer(0, "A").unwrap();
    provider.fail_next(
        ProviderCall::UpdateAttempt,
        ProviderError::Connection("offline".into()),
    );

    let before = session.slots();
    let err = session.save_progress().await.unwrap_err();
    assert_eq!(
        err,
        SessionError::Save(ProviderError::Connection("offline".into()))
    );
    assert_eq!(session.phase(), SessionPhase::Active);
    assert_eq!(session.slots(), before);
    assert_eq!(session.last_failure(), Some(err));

    let receipt = session.save_progress().await.unwrap();
    assert_eq!(receipt.saved_slots, 3);
    assert_eq!(receipt.answered, 1);
    assert_eq!(stored_answers(&provider, &session), ["A", "", ""]);
}

#[tokio::test]
async fn failed_finalize_returns_to_active_with_answers_intact() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, Some(10), TickerMode::Manual).await;
    session.record_answer(1, "two").unwrap();
    session.tick().await.unwrap();
    provider.fail_next(
        ProviderCall::FinalizeAttempt,
        ProviderError::Rejected {
            status: 503,
            message: "maintenance".into(),
        },
    );

    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::Submit(_)));
    assert_eq!(session.phase(), SessionPhase::Active);
    assert_eq!(session.slots()[1].answer(), "two");

    // an unexpired countdown keeps running after the failure
    assert_eq!(
        session.tick().await.unwrap(),
        TickReport::Running { remaining: 598 }
    );

    let outcome = session.submit().await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Completed(_)));
    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 2);
}

#[tokio::test]
async fn failed_timeout_submission_does_not_rearm_the_countdown() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, Some(1), TickerMode::Manual).await;
    provider.fail_next(
        ProviderCall::FinalizeAttempt,
        ProviderError::Connection("reset".into()),
    );

    for _ in 0..59 {
        session.tick().await.unwrap();
    }
    let err = session.tick().await.unwrap_err();
    assert!(matches!(err, SessionError::Submit(_)));
    assert_eq!(session.phase(), SessionPhase::Active);
    assert_eq!(session.remaining_secs(), Some(0));
    assert_eq!(session.tick().await.unwrap(), TickReport::Frozen);

    session.submit().await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Completed);
    assert_eq!(provider.calls(ProviderCall::FinalizeAttempt), 2);
}

#[tokio::test]
async fn fetch_failure_marks_failed_and_start_can_be_retried() {
    let provider = InMemoryProvider::new();
    let session = setup(&provider, None, TickerMode::Manual);

    let err = session
        .start(&QuizId::new("missing"), &premium())
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::Fetch(ProviderError::NotFound));
    assert_eq!(session.phase(), SessionPhase::Failed);
    assert_eq!(session.last_failure(), Some(err));
    assert_eq!(provider.attempt_count(), 0);

    session
        .start(&QuizId::new("quiz-1"), &premium())
        .await
        .unwrap();
    assert_eq!(session.phase(), SessionPhase::Active);
    assert_eq!(session.last_failure(), None);
}

#[tokio::test]
async fn creation_failure_marks_failed() {
    let provider = InMemoryProvider::new();
    let session = setup(&provider, None, TickerMode::Manual);
    provider.fail_next(
        ProviderCall::CreateAttempt,
        ProviderError::Rejected {
            status: 500,
            message: "boom".into(),
        },
    );

    let err = session
        .start(&QuizId::new("quiz-1"), &premium())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Creation(_)));
    assert_eq!(session.phase(), SessionPhase::Failed);
    assert_eq!(session.attempt_id(), None);
}

#[tokio::test]
async fn results_are_loaded_by_the_attempts_quiz() {
    let provider = InMemoryProvider::new();
    let session = started(&provider, None, TickerMode::Manual).await;
    session.record_answer(0, "A").unwrap();
    session.submit().await.unwrap();
    let attempt_id = session.attempt_id().unwrap();

    let results = ResultsService::new(Arc::new(provider.clone()));
    let view = results.load(&attempt_id).await.unwrap();

    assert_eq!(view.quiz.id(), &QuizId::new("quiz-1"));
    assert_eq!(view.rows.len(), 3);
    assert_eq!(view.correct_count(), 1);
    assert_eq!(view.rows[0].is_correct, Some(true));
    assert_eq!(view.rows[1].given_answer, "");
    assert_eq!(view.rows[1].is_correct, Some(false));
    assert_eq!(
        view.rows[1].explanation.as_deref(),
        Some("Plural noun follows.")
    );

    let by_quiz_id = quiz_core::model::AttemptId::new("quiz-1");
    assert_eq!(
        results.load(&by_quiz_id).await.unwrap_err(),
        ResultsError::Attempt(ProviderError::NotFound)
    );
}
