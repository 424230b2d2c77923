use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::attempt::AnswerSlot;
use crate::model::countdown::{Countdown, TickOutcome};
use crate::model::ids::{AttemptId, QuizId};
use crate::model::quiz::QuizDefinition;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("question index {index} is out of range for {len} questions")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("submission already in progress")]
    SubmissionInProgress,

    #[error("no submission in progress")]
    NotSubmitting,
}

/// Mutable state of one quiz attempt.
///
/// Invariants:
/// - `slots.len()` equals the quiz's question count and never changes.
/// - `current < slots.len()`.
/// - remaining time never increases and does not move while submitting.
/// - the attempt id is fixed at construction.
///
/// Timestamps come from the caller so time accounting stays deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    quiz_id: QuizId,
    attempt_id: AttemptId,
    slots: Vec<AnswerSlot>,
    current: usize,
    countdown: Option<Countdown>,
    submitting: bool,
    entered_at: DateTime<Utc>,
}

impl SessionState {
    /// Builds one empty slot per question and arms the countdown if the quiz is timed.
    #[must_use]
    pub fn new(attempt_id: AttemptId, quiz: &QuizDefinition, started_at: DateTime<Utc>) -> Self {
        let slots = quiz
            .questions()
            .iter()
            .map(|question| AnswerSlot::empty(question.id().clone()))
            .collect();

        Self {
            quiz_id: quiz.id().clone(),
            attempt_id,
            slots,
            current: 0,
            countdown: quiz.time_limit_minutes().and_then(Countdown::from_minutes),
            submitting: false,
            entered_at: started_at,
        }
    }

    #[must_use]
    pub fn quiz_id(&self) -> &QuizId {
        &self.quiz_id
    }

    #[must_use]
    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    #[must_use]
    pub fn slots(&self) -> &[AnswerSlot] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&AnswerSlot> {
        self.slots.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Answer text for the question currently shown.
    #[must_use]
    pub fn current_answer(&self) -> &str {
        self.slots
            .get(self.current)
            .map_or("", AnswerSlot::answer)
    }

    #[must_use]
    pub fn countdown(&self) -> Option<&Countdown> {
        self.countdown.as_ref()
    }

    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.countdown.map(|countdown| countdown.remaining())
    }

    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.countdown.is_some()
    }

    /// True while the countdown is armed and unfrozen.
    #[must_use]
    pub fn countdown_running(&self) -> bool {
        self.countdown
            .is_some_and(|countdown| !countdown.is_frozen())
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Answered/unanswered per slot, for the progress map.
    #[must_use]
    pub fn answered_flags(&self) -> Vec<bool> {
        self.slots.iter().map(AnswerSlot::is_answered).collect()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_answered()).count()
    }

    fn check_index(&self, index: usize) -> Result<(), SessionStateError> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(SessionStateError::IndexOutOfRange {
                index,
                len: self.slots.len(),
            })
        }
    }

    /// Overwrites the answer at `index`. Returns whether the stored text changed.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` for a bad index and `SubmissionInProgress` while submitting.
    pub fn record_answer(
        &mut self,
        index: usize,
        answer: impl Into<String>,
    ) -> Result<bool, SessionStateError> {
        self.check_index(index)?;
        if self.submitting {
            return Err(SessionStateError::SubmissionInProgress);
        }
        Ok(self.slots[index].set_answer(answer.into()))
    }

    /// Moves to `target` and returns that slot's stored answer.
    ///
    /// Time spent on the question being left is accounted first.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` for a bad index.
    pub fn navigate(
        &mut self,
        target: usize,
        now: DateTime<Utc>,
    ) -> Result<&str, SessionStateError> {
        self.check_index(target)?;
        self.account_time(now);
        self.current = target;
        Ok(self.slots[target].answer())
    }

    /// Adds whole seconds elapsed since the current question was entered to its slot.
    ///
    /// Clock skew backwards is ignored. Sub-second remainders carry over.
    pub fn account_time(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.entered_at).num_seconds();
        if elapsed <= 0 {
            return;
        }
        let secs = u32::try_from(elapsed).unwrap_or(u32::MAX);
        if let Some(slot) = self.slots.get_mut(self.current) {
            slot.add_time_spent(secs);
        }
        self.entered_at += Duration::seconds(i64::from(secs));
    }

    /// Current slots with time accounted up to `now`, as sent by a save.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> Vec<AnswerSlot> {
        self.account_time(now);
        self.slots.clone()
    }

    /// Advances the countdown by one second. `None` for untimed sessions.
    pub fn tick(&mut self) -> Option<TickOutcome> {
        self.countdown.as_mut().map(Countdown::tick)
    }

    /// Enters submission: freezes the countdown and returns the final slots.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionInProgress` if a submission is already under way.
    pub fn begin_submission(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AnswerSlot>, SessionStateError> {
        if self.submitting {
            return Err(SessionStateError::SubmissionInProgress);
        }
        self.submitting = true;
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.freeze();
        }
        Ok(self.snapshot(now))
    }

    /// Leaves submission after a failure. An expired countdown stays expired.
    ///
    /// Returns whether the countdown is running again.
    ///
    /// # Errors
    ///
    /// Returns `NotSubmitting` when no submission is under way.
    pub fn abort_submission(&mut self, now: DateTime<Utc>) -> Result<bool, SessionStateError> {
        if !self.submitting {
            return Err(SessionStateError::NotSubmitting);
        }
        self.submitting = false;
        // time between begin and abort is not charged to the question
        self.entered_at = self.entered_at.max(now);
        Ok(self
            .countdown
            .as_mut()
            .is_some_and(Countdown::resume))
    }
}
