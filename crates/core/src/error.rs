use thiserror::Error;

use crate::model::{ParseIdError, QuizError, UnknownStatus};

/// Failure to turn external data into a valid domain value.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
    #[error(transparent)]
    Status(#[from] UnknownStatus),
    #[error("invalid media url: {0}")]
    MediaUrl(#[from] url::ParseError),
}
