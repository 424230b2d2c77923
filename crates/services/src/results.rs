use std::sync::Arc;

use backend::ContentProvider;
use quiz_core::model::{AttemptId, AttemptResult, QuestionId, QuizDefinition, ScoreBand};
use tracing::debug;

use crate::error::ResultsError;

/// One reviewed question in a results view.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRow {
    pub number: usize,
    pub question_id: QuestionId,
    pub prompt: String,
    pub given_answer: String,
    pub correct_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub explanation: Option<String>,
    pub time_spent_secs: u32,
}

/// Scored attempt joined with the quiz it was taken on.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsView {
    pub result: AttemptResult,
    pub quiz: QuizDefinition,
    pub rows: Vec<ReviewRow>,
}

impl ResultsView {
    #[must_use]
    pub fn band(&self) -> ScoreBand {
        self.result.band()
    }

    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.result.correct_count()
    }
}

fn review_rows(quiz: &QuizDefinition, result: &AttemptResult) -> Vec<ReviewRow> {
    quiz.questions()
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let outcome = result.outcome_for(question.id());
            ReviewRow {
                number: index + 1,
                question_id: question.id().clone(),
                prompt: question.prompt().to_owned(),
                given_answer: outcome.map(|o| o.answer.clone()).unwrap_or_default(),
                correct_answer: question.correct_answer().map(str::to_owned),
                is_correct: outcome.and_then(|o| o.is_correct),
                explanation: question.explanation().map(str::to_owned),
                time_spent_secs: outcome.map_or(0, |o| o.time_spent_secs),
            }
        })
        .collect()
}

/// Loads finished attempts for review.
#[derive(Clone)]
pub struct ResultsService {
    content: Arc<dyn ContentProvider>,
}

impl ResultsService {
    #[must_use]
    pub fn new(content: Arc<dyn ContentProvider>) -> Self {
        Self { content }
    }

    /// Fetch the attempt, then the quiz it references.
    ///
    /// # Errors
    ///
    /// Returns `ResultsError::Attempt` if the attempt cannot be loaded and
    /// `ResultsError::Quiz` if its quiz cannot.
    pub async fn load(&self, attempt_id: &AttemptId) -> Result<ResultsView, ResultsError> {
        let result = self
            .content
            .fetch_attempt(attempt_id)
            .await
            .map_err(ResultsError::Attempt)?;
        let quiz = self
            .content
            .fetch_quiz_definition(&result.quiz_id)
            .await
            .map_err(ResultsError::Quiz)?;
        debug!(attempt = %attempt_id, quiz = %quiz.id(), "results loaded");

        let rows = review_rows(&quiz, &result);
        Ok(ResultsView { result, quiz, rows })
    }
}
