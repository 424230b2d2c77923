use async_trait::async_trait;
use quiz_core::model::{
    AccessSnapshot, AnswerSlot, AttemptId, AttemptResult, AttemptStatus, QuestionOutcome,
    QuizDefinition, QuizFilter, QuizId, QuizSummary,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use crate::provider::{AccessGate, ContentProvider, ProviderError};

/// Operations the in-memory provider counts and can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderCall {
    FetchQuiz,
    ListQuizzes,
    CreateAttempt,
    UpdateAttempt,
    FinalizeAttempt,
    FetchAttempt,
    CurrentUser,
}

/// Stored attempt, exposed for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub quiz_id: QuizId,
    pub answers: Vec<AnswerSlot>,
    pub status: AttemptStatus,
    pub result: Option<AttemptResult>,
}

#[derive(Default)]
struct State {
    quizzes: Vec<QuizDefinition>,
    attempts: HashMap<AttemptId, AttemptRecord>,
    user: Option<AccessSnapshot>,
    calls: HashMap<ProviderCall, usize>,
    failures: HashMap<ProviderCall, VecDeque<ProviderError>>,
}

/// Simple in-memory backend for testing and prototyping.
///
/// Scores by case-insensitive comparison against each question's reference answer;
/// questions without one are left ungraded.
#[derive(Clone, Default)]
pub struct InMemoryProvider {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl InMemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (uses `tokio::time`, so paused test clocks apply).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ProviderError> {
        self.state
            .lock()
            .map_err(|e| ProviderError::Connection(e.to_string()))
    }

    fn lock_unchecked(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn insert_quiz(&self, quiz: QuizDefinition) {
        let mut guard = self.lock_unchecked();
        guard.quizzes.retain(|existing| existing.id() != quiz.id());
        guard.quizzes.push(quiz);
    }

    pub fn set_user(&self, user: AccessSnapshot) {
        self.lock_unchecked().user = Some(user);
    }

    pub fn sign_out(&self) {
        self.lock_unchecked().user = None;
    }

    /// Queue a failure for the next `call`. Failures are consumed in order.
    pub fn fail_next(&self, call: ProviderCall, error: ProviderError) {
        self.lock_unchecked()
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    /// Number of times `call` was invoked, failed invocations included.
    #[must_use]
    pub fn calls(&self, call: ProviderCall) -> usize {
        self.lock_unchecked()
            .calls
            .get(&call)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn attempt(&self, attempt_id: &AttemptId) -> Option<AttemptRecord> {
        self.lock_unchecked().attempts.get(attempt_id).cloned()
    }

    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.lock_unchecked().attempts.len()
    }

    #[must_use]
    pub fn user(&self) -> Option<AccessSnapshot> {
        self.lock_unchecked().user.clone()
    }

    async fn enter(&self, call: ProviderCall) -> Result<MutexGuard<'_, State>, ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut guard = self.lock()?;
        *guard.calls.entry(call).or_default() += 1;
        if let Some(err) = guard.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(guard)
    }
}

fn normalize(answer: &str) -> String {
    answer.trim().to_lowercase()
}

fn score_attempt(
    attempt_id: &AttemptId,
    quiz: &QuizDefinition,
    answers: &[AnswerSlot],
) -> AttemptResult {
    let outcomes: Vec<QuestionOutcome> = quiz
        .questions()
        .iter()
        .map(|question| {
            let slot = answers
                .iter()
                .find(|slot| slot.question_id() == question.id());
            let answer = slot.map(|slot| slot.answer().to_owned()).unwrap_or_default();
            QuestionOutcome {
                question_id: question.id().clone(),
                is_correct: question
                    .correct_answer()
                    .map(|expected| normalize(expected) == normalize(&answer)),
                answer,
                time_spent_secs: slot.map_or(0, AnswerSlot::time_spent_secs),
            }
        })
        .collect();

    let graded = outcomes.iter().filter(|o| o.is_correct.is_some()).count();
    let correct = outcomes.iter().filter(|o| o.is_correct == Some(true)).count();
    #[allow(clippy::cast_precision_loss)]
    let score = if graded == 0 {
        0.0
    } else {
        correct as f64 * 100.0 / graded as f64
    };

    AttemptResult {
        attempt_id: attempt_id.clone(),
        quiz_id: quiz.id().clone(),
        status: AttemptStatus::Completed,
        score,
        time_spent_secs: outcomes.iter().map(|o| o.time_spent_secs).sum(),
        outcomes,
    }
}

fn in_progress_view(attempt_id: &AttemptId, record: &AttemptRecord) -> AttemptResult {
    AttemptResult {
        attempt_id: attempt_id.clone(),
        quiz_id: record.quiz_id.clone(),
        status: record.status,
        score: 0.0,
        outcomes: record
            .answers
            .iter()
            .map(|slot| QuestionOutcome {
                question_id: slot.question_id().clone(),
                answer: slot.answer().to_owned(),
                is_correct: None,
                time_spent_secs: slot.time_spent_secs(),
            })
            .collect(),
        time_spent_secs: record.answers.iter().map(AnswerSlot::time_spent_secs).sum(),
    }
}

fn conflict(message: &str) -> ProviderError {
    ProviderError::Rejected {
        status: 409,
        message: message.to_owned(),
    }
}

#[async_trait]
impl ContentProvider for InMemoryProvider {
    async fn fetch_quiz_definition(
        &self,
        quiz_id: &QuizId,
    ) -> Result<QuizDefinition, ProviderError> {
        let guard = self.enter(ProviderCall::FetchQuiz).await?;
        guard
            .quizzes
            .iter()
            .find(|quiz| quiz.id() == quiz_id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn list_quizzes(&self, filter: &QuizFilter) -> Result<Vec<QuizSummary>, ProviderError> {
        let guard = self.enter(ProviderCall::ListQuizzes).await?;
        Ok(guard
            .quizzes
            .iter()
            .map(QuizDefinition::summary)
            .filter(|summary| filter.matches(summary))
            .collect())
    }

    async fn create_attempt(&self, quiz_id: &QuizId) -> Result<AttemptId, ProviderError> {
        let mut guard = self.enter(ProviderCall::CreateAttempt).await?;
        if !guard.quizzes.iter().any(|quiz| quiz.id() == quiz_id) {
            return Err(ProviderError::NotFound);
        }
        let attempt_id = AttemptId::new(Uuid::new_v4().to_string());
        guard.attempts.insert(
            attempt_id.clone(),
            AttemptRecord {
                quiz_id: quiz_id.clone(),
                answers: Vec::new(),
                status: AttemptStatus::InProgress,
                result: None,
            },
        );
        Ok(attempt_id)
    }

    async fn update_attempt(
        &self,
        attempt_id: &AttemptId,
        answers: &[AnswerSlot],
    ) -> Result<(), ProviderError> {
        let mut guard = self.enter(ProviderCall::UpdateAttempt).await?;
        let record = guard
            .attempts
            .get_mut(attempt_id)
            .ok_or(ProviderError::NotFound)?;
        if record.status != AttemptStatus::InProgress {
            return Err(conflict("attempt is no longer open"));
        }
        record.answers = answers.to_vec();
        Ok(())
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<AttemptResult, ProviderError> {
        let mut guard = self.enter(ProviderCall::FinalizeAttempt).await?;
        let state = &mut *guard;
        let record = state
            .attempts
            .get_mut(attempt_id)
            .ok_or(ProviderError::NotFound)?;
        if record.status != AttemptStatus::InProgress {
            return Err(conflict("attempt already submitted"));
        }
        let quiz = state
            .quizzes
            .iter()
            .find(|quiz| quiz.id() == &record.quiz_id)
            .ok_or(ProviderError::NotFound)?;

        let result = score_attempt(attempt_id, quiz, &record.answers);
        record.status = AttemptStatus::Completed;
        record.result = Some(result.clone());
        if let Some(user) = state.user.as_mut() {
            user.attempts_used = user.attempts_used.saturating_add(1);
        }
        Ok(result)
    }

    async fn fetch_attempt(&self, attempt_id: &AttemptId) -> Result<AttemptResult, ProviderError> {
        let guard = self.enter(ProviderCall::FetchAttempt).await?;
        let record = guard
            .attempts
            .get(attempt_id)
            .ok_or(ProviderError::NotFound)?;
        Ok(record
            .result
            .clone()
            .unwrap_or_else(|| in_progress_view(attempt_id, record)))
    }
}

#[async_trait]
impl AccessGate for InMemoryProvider {
    async fn current_user(&self) -> Result<AccessSnapshot, ProviderError> {
        let guard = self.enter(ProviderCall::CurrentUser).await?;
        guard.user.clone().ok_or(ProviderError::Unauthenticated)
    }
}
