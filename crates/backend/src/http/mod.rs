use std::env;
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{
    AccessSnapshot, AnswerSlot, AttemptId, AttemptResult, QuizDefinition, QuizFilter, QuizId,
    QuizSummary,
};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::debug;

use crate::provider::{AccessGate, ContentProvider, ProviderError};

mod dto;

use dto::{
    ApiResponse, AttemptDto, CreateAttemptRequest, QuizDto, UpdateAttemptRequest, UserDto,
    answer_dto, map_attempt, map_quiz, map_summary, map_user,
};

pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl HttpConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(15),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.trim().is_empty()).then_some(token);
        self
    }

    /// Reads `QUIZ_API_URL` and `QUIZ_API_TOKEN`.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = env::var("QUIZ_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let config = Self::new(base_url);
        match env::var("QUIZ_API_TOKEN") {
            Ok(token) => config.with_token(token),
            Err(_) => config,
        }
    }
}

/// REST client for the exam-practice backend.
#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    config: HttpConfig,
}

fn transport(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Serialization(err.to_string())
    } else {
        ProviderError::Connection(err.to_string())
    }
}

impl HttpProvider {
    /// # Errors
    ///
    /// Returns `ProviderError::Connection` if the HTTP client cannot be built.
    pub fn new(config: HttpConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport)?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        debug!(%method, %url, "backend request");
        let builder = self.client.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ProviderError> {
        let response = builder.send().await.map_err(transport)?;
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED => return Err(ProviderError::Unauthenticated),
            StatusCode::NOT_FOUND => return Err(ProviderError::NotFound),
            _ => {}
        }

        if !status.is_success() {
            let message = response
                .json::<ApiResponse<IgnoredAny>>()
                .await
                .ok()
                .and_then(|body| body.error.or(body.message))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_owned());
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: ApiResponse<T> = response.json().await.map_err(transport)?;
        body.into_result(status.as_u16())
    }
}

#[async_trait]
impl ContentProvider for HttpProvider {
    async fn fetch_quiz_definition(
        &self,
        quiz_id: &QuizId,
    ) -> Result<QuizDefinition, ProviderError> {
        let dto: QuizDto = self
            .send(self.request(Method::GET, &format!("/quizzes/{quiz_id}")))
            .await?;
        Ok(map_quiz(dto)?)
    }

    async fn list_quizzes(&self, filter: &QuizFilter) -> Result<Vec<QuizSummary>, ProviderError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(skill) = filter.skill {
            query.push(("skill", skill.to_string()));
        }
        if let Some(part) = filter.part {
            query.push(("part", part.to_string()));
        }
        let dtos: Vec<QuizDto> = self
            .send(self.request(Method::GET, "/quizzes").query(&query))
            .await?;
        Ok(dtos
            .into_iter()
            .map(map_summary)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create_attempt(&self, quiz_id: &QuizId) -> Result<AttemptId, ProviderError> {
        let dto: AttemptDto = self
            .send(
                self.request(Method::POST, "/quiz-attempts")
                    .json(&CreateAttemptRequest {
                        quiz_id: quiz_id.as_str(),
                    }),
            )
            .await?;
        Ok(map_attempt(dto)?.attempt_id)
    }

    async fn update_attempt(
        &self,
        attempt_id: &AttemptId,
        answers: &[AnswerSlot],
    ) -> Result<(), ProviderError> {
        let payload = UpdateAttemptRequest {
            answers: answers.iter().map(answer_dto).collect(),
        };
        let _: IgnoredAny = self
            .send(
                self.request(Method::PUT, &format!("/quiz-attempts/{attempt_id}"))
                    .json(&payload),
            )
            .await?;
        Ok(())
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<AttemptResult, ProviderError> {
        let dto: AttemptDto = self
            .send(self.request(Method::POST, &format!("/quiz-attempts/{attempt_id}/submit")))
            .await?;
        Ok(map_attempt(dto)?)
    }

    async fn fetch_attempt(&self, attempt_id: &AttemptId) -> Result<AttemptResult, ProviderError> {
        let dto: AttemptDto = self
            .send(self.request(Method::GET, &format!("/quiz-attempts/{attempt_id}")))
            .await?;
        Ok(map_attempt(dto)?)
    }
}

#[async_trait]
impl AccessGate for HttpProvider {
    async fn current_user(&self) -> Result<AccessSnapshot, ProviderError> {
        let dto: UserDto = self
            .send(self.request(Method::GET, "/auth/profile"))
            .await?;
        map_user(dto)
    }
}
