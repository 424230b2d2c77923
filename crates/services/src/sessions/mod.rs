mod controller;
mod countdown;
mod progress;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{QuizSessionController, SaveReceipt, SessionPhase, SubmitOutcome, TickReport};
pub use countdown::{CountdownHandle, TickerMode};
pub use progress::SessionProgress;
