use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use backend::ContentProvider;
use quiz_core::model::{
    AccessSnapshot, AnswerSlot, AttemptId, AttemptResult, Question, QuizDefinition, QuizId,
    SessionState, TickOutcome,
};
use tracing::{debug, info, warn};

use crate::Clock;
use crate::error::SessionError;
use crate::sessions::countdown::{CountdownHandle, TickerMode};
use crate::sessions::progress::SessionProgress;

/// Lifecycle phase of a quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Initializing,
    Active,
    Submitting,
    Completed,
    Failed,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::Initializing => "initializing",
            SessionPhase::Active => "active",
            SessionPhase::Submitting => "submitting",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgement of a successful `save_progress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    pub attempt_id: AttemptId,
    pub saved_slots: usize,
    pub answered: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(AttemptResult),
    /// A submission was already in flight; nothing was sent.
    AlreadySubmitting,
}

/// Result of delivering one countdown tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// No active timed session.
    Inactive,
    Running { remaining: u32 },
    /// Time already ran out; the tick changed nothing.
    Frozen,
    /// This tick reached zero and the attempt was submitted.
    AutoSubmitted(AttemptResult),
}

struct SubmissionTicket {
    epoch: u64,
    attempt_id: AttemptId,
    slots: Vec<AnswerSlot>,
}

enum TickStep {
    Inactive,
    Running(u32),
    Frozen,
    Expired(SubmissionTicket),
}

#[derive(Default)]
struct Inner {
    /// Bumped on every start and teardown; provider completions from an older epoch are dropped.
    epoch: u64,
    phase: SessionPhase,
    quiz: Option<Arc<QuizDefinition>>,
    state: Option<SessionState>,
    countdown: Option<CountdownHandle>,
    result: Option<AttemptResult>,
    last_failure: Option<SessionError>,
}

impl Inner {
    fn active_state(&mut self, action: &'static str) -> Result<&mut SessionState, SessionError> {
        match (self.phase, self.state.as_mut()) {
            (SessionPhase::Active, Some(state)) => Ok(state),
            (phase, _) => Err(SessionError::InvalidPhase { action, phase }),
        }
    }

    /// Moves Active to Submitting and releases the ticker.
    fn begin_submission(
        &mut self,
        now: chrono::DateTime<chrono::Utc>,
        action: &'static str,
    ) -> Result<SubmissionTicket, SessionError> {
        let state = self.active_state(action)?;
        let slots = state.begin_submission(now)?;
        let attempt_id = state.attempt_id().clone();
        self.phase = SessionPhase::Submitting;
        self.countdown = None;
        Ok(SubmissionTicket {
            epoch: self.epoch,
            attempt_id,
            slots,
        })
    }

    /// Drops everything and moves to a new epoch.
    fn reset(&mut self, phase: SessionPhase) -> u64 {
        let epoch = self.epoch.wrapping_add(1);
        *self = Inner {
            epoch,
            phase,
            ..Inner::default()
        };
        epoch
    }

    fn tick(&mut self, now: chrono::DateTime<chrono::Utc>) -> Result<TickStep, SessionError> {
        if self.phase != SessionPhase::Active {
            return Ok(TickStep::Inactive);
        }
        let Some(outcome) = self.state.as_mut().and_then(SessionState::tick) else {
            return Ok(TickStep::Inactive);
        };
        match outcome {
            TickOutcome::Running { remaining } => Ok(TickStep::Running(remaining)),
            TickOutcome::Frozen => Ok(TickStep::Frozen),
            TickOutcome::Expired => {
                info!("time limit reached, submitting");
                self.begin_submission(now, "submit on timeout")
                    .map(TickStep::Expired)
            }
        }
    }
}

/// Drives one quiz attempt from start to a scored result.
///
/// Shared as `Arc<QuizSessionController>`. State sits behind a short-lived
/// mutex that is never held across provider calls; an async gate keeps
/// saves and the final submit from overlapping.
pub struct QuizSessionController {
    content: Arc<dyn ContentProvider>,
    clock: Clock,
    ticker: TickerMode,
    inner: Mutex<Inner>,
    io_gate: tokio::sync::Mutex<()>,
    weak_self: Weak<Self>,
}

impl QuizSessionController {
    #[must_use]
    pub fn new(content: Arc<dyn ContentProvider>, clock: Clock, ticker: TickerMode) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            content,
            clock,
            ticker,
            inner: Mutex::new(Inner::default()),
            io_gate: tokio::sync::Mutex::new(()),
            weak_self: weak_self.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check the quota, load the quiz, open an attempt and enter Active.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::QuotaExceeded` without touching the provider when the
    /// user has no attempts left, `Fetch`/`Creation` when the provider fails (the
    /// session is then Failed and may be started again), `InvalidPhase` if a
    /// session is already under way, or `Discarded` if the session was torn down
    /// before loading finished.
    pub async fn start(
        &self,
        quiz_id: &QuizId,
        access: &AccessSnapshot,
    ) -> Result<(), SessionError> {
        let epoch = {
            let mut inner = self.lock();
            match inner.phase {
                SessionPhase::Uninitialized | SessionPhase::Failed => {}
                phase => {
                    return Err(SessionError::InvalidPhase {
                        action: "start",
                        phase,
                    });
                }
            }
            if let Err(err) = access.ensure_can_start() {
                warn!(user = %access.user_id, %err, "session start refused");
                return Err(err.into());
            }
            inner.reset(SessionPhase::Initializing)
        };

        let quiz = match self.content.fetch_quiz_definition(quiz_id).await {
            Ok(quiz) => Arc::new(quiz),
            Err(err) => return Err(self.fail_start(epoch, SessionError::Fetch(err))),
        };
        if self.lock().epoch != epoch {
            debug!(quiz = %quiz_id, "start abandoned after teardown");
            return Err(SessionError::Discarded);
        }
        let attempt_id = match self.content.create_attempt(quiz_id).await {
            Ok(attempt_id) => attempt_id,
            Err(err) => return Err(self.fail_start(epoch, SessionError::Creation(err))),
        };

        let mut inner = self.lock();
        if inner.epoch != epoch {
            warn!(attempt = %attempt_id, "attempt created for a discarded session");
            return Err(SessionError::Discarded);
        }
        let state = SessionState::new(attempt_id, &quiz, self.clock.now());
        info!(
            quiz = %quiz.id(),
            attempt = %state.attempt_id(),
            questions = state.len(),
            time_limit_secs = ?state.remaining_secs(),
            "session started"
        );
        if state.is_timed() {
            inner.countdown = self.arm_ticker();
        }
        inner.quiz = Some(quiz);
        inner.state = Some(state);
        inner.phase = SessionPhase::Active;
        Ok(())
    }

    fn fail_start(&self, epoch: u64, error: SessionError) -> SessionError {
        warn!(%error, "session initialization failed");
        let mut inner = self.lock();
        if inner.epoch == epoch && inner.phase == SessionPhase::Initializing {
            inner.phase = SessionPhase::Failed;
            inner.last_failure = Some(error.clone());
        }
        error
    }

    /// Overwrite the answer at `index`. Returns whether the text changed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the session is not Active or the index is out of range.
    pub fn record_answer(
        &self,
        index: usize,
        answer: impl Into<String>,
    ) -> Result<bool, SessionError> {
        let mut inner = self.lock();
        let state = inner.active_state("record an answer")?;
        Ok(state.record_answer(index, answer)?)
    }

    /// Move to question `target` and return the answer already stored there.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the session is not Active or the index is out of range.
    pub fn navigate(&self, target: usize) -> Result<String, SessionError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let state = inner.active_state("navigate")?;
        Ok(state.navigate(target, now)?.to_owned())
    }

    /// Push the current answers to the provider. The session stays Active either way.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Busy` while another save or a submission is in flight,
    /// `Save` if the provider rejects the update.
    pub async fn save_progress(&self) -> Result<SaveReceipt, SessionError> {
        let _gate = self.io_gate.try_lock().map_err(|_| SessionError::Busy)?;

        let (epoch, attempt_id, slots) = {
            let now = self.clock.now();
            let mut inner = self.lock();
            if inner.phase == SessionPhase::Submitting {
                return Err(SessionError::Busy);
            }
            let epoch = inner.epoch;
            let state = inner.active_state("save progress")?;
            (epoch, state.attempt_id().clone(), state.snapshot(now))
        };

        match self.content.update_attempt(&attempt_id, &slots).await {
            Ok(()) => {
                let answered = slots.iter().filter(|slot| slot.is_answered()).count();
                debug!(attempt = %attempt_id, answered, "progress saved");
                Ok(SaveReceipt {
                    attempt_id,
                    saved_slots: slots.len(),
                    answered,
                })
            }
            Err(err) => {
                warn!(attempt = %attempt_id, %err, "saving progress failed");
                let error = SessionError::Save(err);
                let mut inner = self.lock();
                if inner.epoch == epoch {
                    inner.last_failure = Some(error.clone());
                }
                Err(error)
            }
        }
    }

    /// Submit the attempt: push the final answers, then have it scored.
    ///
    /// A call made while a submission is already in flight returns
    /// `SubmitOutcome::AlreadySubmitting` and sends nothing.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submit` if saving or finalizing fails; the session is
    /// back in Active with its answers intact and may be submitted again.
    pub async fn submit(&self) -> Result<SubmitOutcome, SessionError> {
        let ticket = {
            let mut inner = self.lock();
            if inner.phase == SessionPhase::Submitting {
                debug!("duplicate submit ignored");
                return Ok(SubmitOutcome::AlreadySubmitting);
            }
            inner.begin_submission(self.clock.now(), "submit")?
        };
        self.finish_submission(ticket)
            .await
            .map(SubmitOutcome::Completed)
    }

    async fn finish_submission(
        &self,
        ticket: SubmissionTicket,
    ) -> Result<AttemptResult, SessionError> {
        let _gate = self.io_gate.lock().await;
        info!(attempt = %ticket.attempt_id, "submitting attempt");

        let outcome = match self
            .content
            .update_attempt(&ticket.attempt_id, &ticket.slots)
            .await
        {
            Ok(()) => self.content.finalize_attempt(&ticket.attempt_id).await,
            Err(err) => Err(err),
        };

        let mut inner = self.lock();
        if inner.epoch != ticket.epoch {
            debug!(
                attempt = %ticket.attempt_id,
                "submission finished after teardown, result dropped"
            );
            return outcome.map_err(SessionError::Submit);
        }
        match outcome {
            Ok(result) => {
                info!(
                    attempt = %result.attempt_id,
                    score = result.score,
                    "attempt completed"
                );
                if inner.phase == SessionPhase::Submitting {
                    inner.phase = SessionPhase::Completed;
                    inner.result = Some(result.clone());
                    inner.last_failure = None;
                }
                Ok(result)
            }
            Err(err) => {
                warn!(attempt = %ticket.attempt_id, %err, "submission failed");
                let error = SessionError::Submit(err);
                if inner.phase == SessionPhase::Submitting {
                    let now = self.clock.now();
                    let resumed = inner
                        .state
                        .as_mut()
                        .is_some_and(|state| matches!(state.abort_submission(now), Ok(true)));
                    inner.phase = SessionPhase::Active;
                    if resumed {
                        inner.countdown = self.arm_ticker();
                    }
                }
                inner.last_failure = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Deliver one countdown tick. Reaching zero submits the attempt before returning.
    ///
    /// Intended for `TickerMode::Manual`; with an automatic ticker running the
    /// session would be ticked twice.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submit` if the timeout submission fails.
    pub async fn tick(&self) -> Result<TickReport, SessionError> {
        let step = self.lock().tick(self.clock.now())?;
        match step {
            TickStep::Inactive => Ok(TickReport::Inactive),
            TickStep::Running(remaining) => Ok(TickReport::Running { remaining }),
            TickStep::Frozen => Ok(TickReport::Frozen),
            TickStep::Expired(ticket) => self
                .finish_submission(ticket)
                .await
                .map(TickReport::AutoSubmitted),
        }
    }

    fn arm_ticker(&self) -> Option<CountdownHandle> {
        let TickerMode::Automatic { period } = self.ticker else {
            return None;
        };
        let weak = self.weak_self.clone();
        Some(CountdownHandle::spawn(period, move || match weak.upgrade() {
            Some(controller) => controller.advance_countdown(),
            None => ControlFlow::Break(()),
        }))
    }

    fn advance_countdown(&self) -> ControlFlow<()> {
        let step = self.lock().tick(self.clock.now());
        match step {
            Ok(TickStep::Running(remaining)) => {
                debug!(remaining, "countdown tick");
                ControlFlow::Continue(())
            }
            Ok(TickStep::Expired(ticket)) => {
                if let Some(controller) = self.weak_self.upgrade() {
                    tokio::spawn(async move {
                        if let Err(error) = controller.finish_submission(ticket).await {
                            warn!(%error, "automatic submission failed");
                        }
                    });
                }
                ControlFlow::Break(())
            }
            Ok(TickStep::Inactive | TickStep::Frozen) => ControlFlow::Break(()),
            Err(error) => {
                warn!(%error, "countdown tick failed");
                ControlFlow::Break(())
            }
        }
    }

    /// Discard the session. Stops the ticker; results of provider calls still in
    /// flight are not applied to whatever session comes next.
    pub fn teardown(&self) {
        let mut inner = self.lock();
        if let Some(state) = inner.state.as_ref() {
            debug!(attempt = %state.attempt_id(), phase = %inner.phase, "session torn down");
        }
        inner.reset(SessionPhase::Uninitialized);
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.lock().state.as_ref().map(SessionState::current_index)
    }

    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.lock()
            .state
            .as_ref()
            .and_then(SessionState::remaining_secs)
    }

    #[must_use]
    pub fn answered_flags(&self) -> Vec<bool> {
        self.lock()
            .state
            .as_ref()
            .map(SessionState::answered_flags)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn progress(&self) -> Option<SessionProgress> {
        self.lock().state.as_ref().map(|state| {
            SessionProgress::from_flags(
                state.answered_flags(),
                state.current_index(),
                state.remaining_secs(),
            )
        })
    }

    #[must_use]
    pub fn current_question(&self) -> Option<Question> {
        let inner = self.lock();
        let index = inner.state.as_ref()?.current_index();
        inner.quiz.as_ref()?.question(index).cloned()
    }

    #[must_use]
    pub fn current_answer(&self) -> Option<String> {
        self.lock()
            .state
            .as_ref()
            .map(|state| state.current_answer().to_owned())
    }

    #[must_use]
    pub fn slots(&self) -> Vec<AnswerSlot> {
        self.lock()
            .state
            .as_ref()
            .map(|state| state.slots().to_vec())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn quiz(&self) -> Option<Arc<QuizDefinition>> {
        self.lock().quiz.clone()
    }

    #[must_use]
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.lock()
            .state
            .as_ref()
            .map(|state| state.attempt_id().clone())
    }

    /// Scored result once the session is Completed.
    #[must_use]
    pub fn result(&self) -> Option<AttemptResult> {
        self.lock().result.clone()
    }

    /// Most recent provider failure, kept for display until the next success.
    #[must_use]
    pub fn last_failure(&self) -> Option<SessionError> {
        self.lock().last_failure.clone()
    }

    /// Whether an automatic ticker task is currently attached.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.lock()
            .countdown
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::InMemoryProvider;
    use quiz_core::model::{QuestionId, QuestionKind, Skill, SubscriptionTier, UserId};
    use quiz_core::time::fixed_clock;

    fn quiz(minutes: Option<u32>) -> QuizDefinition {
        let questions = (1..=2)
            .map(|n| {
                Question::new(
                    QuestionId::new(format!("q{n}")),
                    QuestionKind::ShortText,
                    format!("Prompt {n}"),
                )
                .unwrap()
            })
            .collect();
        QuizDefinition::new(QuizId::new("quiz-1"), "Quiz", Skill::Reading, 5, questions, minutes)
            .unwrap()
    }

    fn premium() -> AccessSnapshot {
        AccessSnapshot::new(UserId::new("u1"), SubscriptionTier::Premium, 0, 0)
    }

    fn controller(provider: &InMemoryProvider) -> Arc<QuizSessionController> {
        QuizSessionController::new(
            Arc::new(provider.clone()),
            fixed_clock(),
            TickerMode::Manual,
        )
    }

    #[tokio::test]
    async fn operations_before_start_are_rejected() {
        let provider = InMemoryProvider::new();
        let session = controller(&provider);
        assert_eq!(
            session.record_answer(0, "x"),
            Err(SessionError::InvalidPhase {
                action: "record an answer",
                phase: SessionPhase::Uninitialized,
            })
        );
        assert_eq!(session.tick().await, Ok(TickReport::Inactive));
        assert!(session.answered_flags().is_empty());
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_active() {
        let provider = InMemoryProvider::new();
        provider.insert_quiz(quiz(None));
        let session = controller(&provider);
        session.start(&QuizId::new("quiz-1"), &premium()).await.unwrap();

        let err = session
            .start(&QuizId::new("quiz-1"), &premium())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPhase { phase: SessionPhase::Active, .. }));
        assert_eq!(provider.attempt_count(), 1);
    }

    #[tokio::test]
    async fn untimed_session_ignores_ticks() {
        let provider = InMemoryProvider::new();
        provider.insert_quiz(quiz(None));
        let session = controller(&provider);
        session.start(&QuizId::new("quiz-1"), &premium()).await.unwrap();

        assert_eq!(session.remaining_secs(), None);
        assert_eq!(session.tick().await, Ok(TickReport::Inactive));
        assert_eq!(session.phase(), SessionPhase::Active);
    }

    #[tokio::test]
    async fn teardown_discards_state() {
        let provider = InMemoryProvider::new();
        provider.insert_quiz(quiz(Some(1)));
        let session = controller(&provider);
        session.start(&QuizId::new("quiz-1"), &premium()).await.unwrap();
        session.record_answer(0, "kept?").unwrap();

        session.teardown();
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
        assert_eq!(session.attempt_id(), None);
        assert_eq!(session.tick().await, Ok(TickReport::Inactive));
    }

    #[tokio::test]
    async fn current_question_follows_navigation() {
        let provider = InMemoryProvider::new();
        provider.insert_quiz(quiz(None));
        let session = controller(&provider);
        session.start(&QuizId::new("quiz-1"), &premium()).await.unwrap();

        session.navigate(1).unwrap();
        let question = session.current_question().unwrap();
        assert_eq!(question.id(), &QuestionId::new("q2"));
        assert_eq!(session.current_index(), Some(1));
    }
}
