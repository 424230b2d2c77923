#![forbid(unsafe_code)]

pub mod catalog;
pub mod error;
pub mod results;
pub mod sessions;

pub use quiz_core::Clock;

pub use catalog::QuizCatalogService;
pub use error::{ResultsError, SessionError};
pub use results::{ResultsService, ResultsView, ReviewRow};

pub use sessions::{
    CountdownHandle, QuizSessionController, SaveReceipt, SessionPhase, SessionProgress,
    SubmitOutcome, TickReport, TickerMode,
};
