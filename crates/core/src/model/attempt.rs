use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{AttemptId, QuestionId, QuizId};

//
// ─── ANSWER SLOT ───────────────────────────────────────────────────────────────
//

/// The learner's answer to one question. One slot per question, in question order.
///
/// An empty answer means "unanswered"; the slot itself always exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSlot {
    question_id: QuestionId,
    answer: String,
    time_spent_secs: u32,
}

impl AnswerSlot {
    #[must_use]
    pub fn empty(question_id: QuestionId) -> Self {
        Self {
            question_id,
            answer: String::new(),
            time_spent_secs: 0,
        }
    }

    /// Rehydrate a slot from a saved attempt.
    #[must_use]
    pub fn from_persisted(question_id: QuestionId, answer: String, time_spent_secs: u32) -> Self {
        Self {
            question_id,
            answer,
            time_spent_secs,
        }
    }

    #[must_use]
    pub fn question_id(&self) -> &QuestionId {
        &self.question_id
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    #[must_use]
    pub fn time_spent_secs(&self) -> u32 {
        self.time_spent_secs
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        !self.answer.is_empty()
    }

    /// Overwrites the answer. Returns whether the stored text changed.
    pub fn set_answer(&mut self, answer: String) -> bool {
        if self.answer == answer {
            return false;
        }
        self.answer = answer;
        true
    }

    pub fn add_time_spent(&mut self, secs: u32) {
        self.time_spent_secs = self.time_spent_secs.saturating_add(secs);
    }
}

//
// ─── ATTEMPT RESULT ────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown attempt status: {0}")]
pub struct UnknownStatus(pub String);

/// Lifecycle of an attempt record on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for AttemptStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "abandoned" => Ok(AttemptStatus::Abandoned),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graded answer for one question. `is_correct` is `None` for ungraded questions.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub answer: String,
    pub is_correct: Option<bool>,
    pub time_spent_secs: u32,
}

/// Scored attempt returned by finalization, handed to the results viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptResult {
    pub attempt_id: AttemptId,
    pub quiz_id: QuizId,
    pub status: AttemptStatus,
    /// Percentage in `[0, 100]`.
    pub score: f64,
    pub outcomes: Vec<QuestionOutcome>,
    pub time_spent_secs: u32,
}

impl AttemptResult {
    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_correct == Some(true))
            .count()
    }

    #[must_use]
    pub fn outcome_for(&self, question_id: &QuestionId) -> Option<&QuestionOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| &outcome.question_id == question_id)
    }

    #[must_use]
    pub fn band(&self) -> ScoreBand {
        ScoreBand::from_score(self.score)
    }
}

/// Qualitative label for a percentage score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Excellent,
    Good,
    Fair,
    Average,
    NeedsWork,
}

impl ScoreBand {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            ScoreBand::Excellent
        } else if score >= 80.0 {
            ScoreBand::Good
        } else if score >= 70.0 {
            ScoreBand::Fair
        } else if score >= 60.0 {
            ScoreBand::Average
        } else {
            ScoreBand::NeedsWork
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ScoreBand::Excellent => "Excellent",
            ScoreBand::Good => "Good",
            ScoreBand::Fair => "Fair",
            ScoreBand::Average => "Average",
            ScoreBand::NeedsWork => "Needs work",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_answer_reports_changes_only() {
        let mut slot = AnswerSlot::empty(QuestionId::new("1"));
        assert!(!slot.is_answered());
        assert!(slot.set_answer("B".into()));
        assert!(!slot.set_answer("B".into()));
        assert!(slot.is_answered());
        assert!(slot.set_answer(String::new()));
        assert!(!slot.is_answered());
    }

    #[test]
    fn time_spent_saturates() {
        let mut slot = AnswerSlot::from_persisted(QuestionId::new("1"), String::new(), u32::MAX - 1);
        slot.add_time_spent(10);
        assert_eq!(slot.time_spent_secs(), u32::MAX);
    }

    #[test]
    fn score_bands_follow_thresholds() {
        assert_eq!(ScoreBand::from_score(95.0), ScoreBand::Excellent);
        assert_eq!(ScoreBand::from_score(90.0), ScoreBand::Excellent);
        assert_eq!(ScoreBand::from_score(89.9), ScoreBand::Good);
        assert_eq!(ScoreBand::from_score(70.0), ScoreBand::Fair);
        assert_eq!(ScoreBand::from_score(60.0), ScoreBand::Average);
        assert_eq!(ScoreBand::from_score(12.5), ScoreBand::NeedsWork);
    }

    #[test]
    fn correct_count_ignores_ungraded() {
        let outcome = |id: &str, is_correct| QuestionOutcome {
            question_id: QuestionId::new(id),
            answer: "x".into(),
            is_correct,
            time_spent_secs: 0,
        };
        let result = AttemptResult {
            attempt_id: AttemptId::new("a"),
            quiz_id: QuizId::new("q"),
            status: AttemptStatus::Completed,
            score: 50.0,
            outcomes: vec![
                outcome("1", Some(true)),
                outcome("2", Some(false)),
                outcome("3", None),
            ],
            time_spent_secs: 0,
        };
        assert_eq!(result.correct_count(), 1);
        assert!(result.outcome_for(&QuestionId::new("3")).is_some());
        assert_eq!(result.band(), ScoreBand::NeedsWork);
    }

    #[test]
    fn status_parses_wire_names() {
        assert_eq!(
            "in_progress".parse::<AttemptStatus>().unwrap(),
            AttemptStatus::InProgress
        );
        assert!("done".parse::<AttemptStatus>().is_err());
    }
}
