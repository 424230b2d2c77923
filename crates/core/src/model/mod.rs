mod access;
mod attempt;
mod countdown;
mod ids;
mod quiz;
mod session;

pub use ids::{AttemptId, ParseIdError, QuestionId, QuizId, UserId};

pub use access::{AccessError, AccessSnapshot, SubscriptionTier};
pub use attempt::{
    AnswerSlot, AttemptResult, AttemptStatus, QuestionOutcome, ScoreBand, UnknownStatus,
};
pub use countdown::{Countdown, TickOutcome, format_remaining};
pub use quiz::{Question, QuestionKind, QuizDefinition, QuizError, QuizFilter, QuizSummary, Skill};
pub use session::{SessionState, SessionStateError};
