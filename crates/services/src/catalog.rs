use std::sync::Arc;

use backend::{ContentProvider, ProviderError};
use quiz_core::model::{QuizFilter, QuizSummary};
use tracing::debug;

/// Browses the quiz catalog.
#[derive(Clone)]
pub struct QuizCatalogService {
    content: Arc<dyn ContentProvider>,
}

impl QuizCatalogService {
    #[must_use]
    pub fn new(content: Arc<dyn ContentProvider>) -> Self {
        Self { content }
    }

    /// List quizzes matching the filter, ordered by skill, part, then title.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the catalog cannot be fetched.
    pub async fn list(&self, filter: QuizFilter) -> Result<Vec<QuizSummary>, ProviderError> {
        let mut quizzes = self.content.list_quizzes(&filter).await?;
        // backends may ignore the query; filter again locally
        quizzes.retain(|summary| filter.matches(summary));
        quizzes.sort_by(|a, b| {
            (a.skill.as_str(), a.part, &a.title).cmp(&(b.skill.as_str(), b.part, &b.title))
        });
        debug!(count = quizzes.len(), ?filter, "catalog listed");
        Ok(quizzes)
    }
}
