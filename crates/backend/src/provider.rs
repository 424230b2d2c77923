use async_trait::async_trait;
use quiz_core::model::{
    AccessSnapshot, AnswerSlot, AttemptId, AttemptResult, QuizDefinition, QuizFilter, QuizId,
    QuizSummary,
};
use std::sync::Arc;
use thiserror::Error;

use crate::http::{HttpConfig, HttpProvider};
use crate::memory::InMemoryProvider;

/// Errors surfaced by backend adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("not found")]
    NotFound,

    #[error("not signed in")]
    Unauthenticated,

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid content: {0}")]
    Invalid(String),
}

impl From<quiz_core::Error> for ProviderError {
    fn from(err: quiz_core::Error) -> Self {
        ProviderError::Invalid(err.to_string())
    }
}

/// Quiz content and attempt records.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Fetch a full quiz definition.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::NotFound` if the quiz does not exist.
    async fn fetch_quiz_definition(&self, quiz_id: &QuizId)
    -> Result<QuizDefinition, ProviderError>;

    /// List catalog entries matching the filter.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the catalog cannot be read.
    async fn list_quizzes(&self, filter: &QuizFilter) -> Result<Vec<QuizSummary>, ProviderError>;

    /// Open a new attempt for the quiz.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the attempt cannot be created.
    async fn create_attempt(&self, quiz_id: &QuizId) -> Result<AttemptId, ProviderError>;

    /// Replace the saved answers of an open attempt.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the answers cannot be stored.
    async fn update_attempt(
        &self,
        attempt_id: &AttemptId,
        answers: &[AnswerSlot],
    ) -> Result<(), ProviderError>;

    /// Close the attempt and have it scored.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the attempt cannot be finalized.
    async fn finalize_attempt(&self, attempt_id: &AttemptId)
    -> Result<AttemptResult, ProviderError>;

    /// Fetch an attempt by id, for the results view.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::NotFound` if the attempt does not exist.
    async fn fetch_attempt(&self, attempt_id: &AttemptId) -> Result<AttemptResult, ProviderError>;
}

/// Current user's entitlement.
#[async_trait]
pub trait AccessGate: Send + Sync {
    /// # Errors
    ///
    /// Returns `ProviderError::Unauthenticated` when nobody is signed in.
    async fn current_user(&self) -> Result<AccessSnapshot, ProviderError>;
}

/// Collaborators behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Backend {
    pub content: Arc<dyn ContentProvider>,
    pub access: Arc<dyn AccessGate>,
}

impl Backend {
    #[must_use]
    pub fn in_memory(provider: InMemoryProvider) -> Self {
        let content: Arc<dyn ContentProvider> = Arc::new(provider.clone());
        let access: Arc<dyn AccessGate> = Arc::new(provider);
        Self { content, access }
    }

    /// Build a backend talking to the REST API.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Connection` if the HTTP client cannot be built.
    pub fn http(config: HttpConfig) -> Result<Self, ProviderError> {
        let provider = Arc::new(HttpProvider::new(config)?);
        let content: Arc<dyn ContentProvider> = provider.clone();
        let access: Arc<dyn AccessGate> = provider;
        Ok(Self { content, access })
    }
}
