//! Wire shapes of the REST API and their mapping onto validated domain types.

use quiz_core::model::{
    AccessSnapshot, AnswerSlot, AttemptId, AttemptResult, AttemptStatus, Question, QuestionId,
    QuestionKind, QuestionOutcome, QuizDefinition, QuizId, QuizSummary, Skill, SubscriptionTier,
    UserId,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::provider::ProviderError;

/// Envelope every endpoint wraps its payload in.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub(crate) fn into_result(self, status: u16) -> Result<T, ProviderError> {
        if !self.success {
            return Err(ProviderError::Rejected {
                status,
                message: self
                    .error
                    .or(self.message)
                    .unwrap_or_else(|| "request failed".into()),
            });
        }
        self.data
            .ok_or_else(|| ProviderError::Serialization("response has no data".into()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuizDto {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub skill: String,
    pub part: u32,
    #[serde(default)]
    pub questions: Vec<QuestionDto>,
    pub time_limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub question_text: String,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub audio_url: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptDto {
    pub id: String,
    pub quiz_id: String,
    #[serde(default)]
    pub answers: Vec<AnswerDto>,
    pub score: Option<f64>,
    #[serde(default)]
    pub time_spent: u32,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnswerDto {
    pub question_id: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub time_spent: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserDto {
    pub id: String,
    pub subscription_type: String,
    #[serde(default)]
    pub free_attempts_used: u32,
    #[serde(default)]
    pub free_attempts_limit: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateAttemptRequest<'a> {
    pub quiz_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateAttemptRequest {
    pub answers: Vec<AnswerDto>,
}

fn parse_url(raw: Option<String>) -> Result<Option<Url>, quiz_core::Error> {
    raw.filter(|value| !value.trim().is_empty())
        .map(|value| Url::parse(&value))
        .transpose()
        .map_err(quiz_core::Error::from)
}

pub(crate) fn map_question(dto: QuestionDto) -> Result<Question, quiz_core::Error> {
    let kind: QuestionKind = dto.kind.parse()?;
    let mut question = Question::new(dto.id.parse::<QuestionId>()?, kind, dto.question_text)?
        .with_choices(dto.options.unwrap_or_default());
    if let Some(answer) = dto.correct_answer {
        question = question.with_correct_answer(answer);
    }
    if let Some(explanation) = dto.explanation {
        question = question.with_explanation(explanation);
    }
    if let Some(audio) = parse_url(dto.audio_url)? {
        question = question.with_audio(audio);
    }
    if let Some(image) = parse_url(dto.image_url)? {
        question = question.with_image(image);
    }
    Ok(question)
}

pub(crate) fn map_quiz(dto: QuizDto) -> Result<QuizDefinition, quiz_core::Error> {
    let skill: Skill = dto.skill.parse()?;
    let mut questions = dto.questions;
    // stable: questions without an explicit order keep their array position
    questions.sort_by_key(|question| question.order);
    let questions = questions
        .into_iter()
        .map(map_question)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QuizDefinition::new(
        dto.id.parse::<QuizId>()?,
        dto.title,
        skill,
        dto.part,
        questions,
        dto.time_limit,
    )?
    .with_description(dto.description))
}

pub(crate) fn map_summary(dto: QuizDto) -> Result<QuizSummary, quiz_core::Error> {
    Ok(QuizSummary {
        id: dto.id.parse()?,
        skill: dto.skill.parse()?,
        question_count: dto.questions.len(),
        title: dto.title,
        description: dto.description,
        part: dto.part,
        time_limit_minutes: dto.time_limit.filter(|minutes| *minutes > 0),
    })
}

pub(crate) fn map_attempt(dto: AttemptDto) -> Result<AttemptResult, quiz_core::Error> {
    let outcomes = dto
        .answers
        .into_iter()
        .map(|answer| -> Result<QuestionOutcome, quiz_core::Error> {
            Ok(QuestionOutcome {
                question_id: answer.question_id.parse()?,
                answer: answer.answer,
                is_correct: answer.is_correct,
                time_spent_secs: answer.time_spent,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AttemptResult {
        attempt_id: dto.id.parse::<AttemptId>()?,
        quiz_id: dto.quiz_id.parse::<QuizId>()?,
        status: dto.status.parse::<AttemptStatus>()?,
        score: dto.score.unwrap_or(0.0),
        outcomes,
        time_spent_secs: dto.time_spent,
    })
}

pub(crate) fn map_user(dto: UserDto) -> Result<AccessSnapshot, ProviderError> {
    let tier = match dto.subscription_type.as_str() {
        "free" => SubscriptionTier::Free,
        "premium" => SubscriptionTier::Premium,
        other => {
            return Err(ProviderError::Serialization(format!(
                "unknown subscription type: {other}"
            )));
        }
    };
    Ok(AccessSnapshot::new(
        dto.id.parse::<UserId>().map_err(quiz_core::Error::from)?,
        tier,
        dto.free_attempts_used,
        dto.free_attempts_limit,
    ))
}

pub(crate) fn answer_dto(slot: &AnswerSlot) -> AnswerDto {
    AnswerDto {
        question_id: slot.question_id().to_string(),
        answer: slot.answer().to_owned(),
        is_correct: None,
        time_spent: slot.time_spent_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIZ_JSON: &str = r#"{
        "success": true,
        "data": {
            "id": "quiz-1",
            "title": "Listening Part 1",
            "description": "Short conversations",
            "skill": "listening",
            "part": 1,
            "timeLimit": 15,
            "createdAt": "2024-01-01T00:00:00Z",
            "questions": [
                {
                    "id": "q2", "quizId": "quiz-1", "type": "fill_blank",
                    "questionText": "Second", "order": 2
                },
                {
                    "id": "q1", "quizId": "quiz-1", "type": "multiple_choice",
                    "questionText": "First", "options": ["A train", "A bus"],
                    "correctAnswer": "A bus", "explanation": "She mentions the bus.",
                    "audioUrl": "https://cdn.example.com/q1.mp3", "order": 1
                }
            ]
        }
    }"#;

    #[test]
    fn decodes_quiz_in_question_order() {
        let envelope: ApiResponse<QuizDto> = serde_json::from_str(QUIZ_JSON).unwrap();
        let quiz = map_quiz(envelope.into_result(200).unwrap()).unwrap();

        assert_eq!(quiz.id(), &QuizId::new("quiz-1"));
        assert_eq!(quiz.skill(), Skill::Listening);
        assert_eq!(quiz.time_limit_minutes(), Some(15));
        let ids: Vec<_> = quiz.questions().iter().map(|q| q.id().as_str()).collect();
        assert_eq!(ids, ["q1", "q2"]);
        let first = &quiz.questions()[0];
        assert_eq!(first.kind(), QuestionKind::SingleChoice);
        assert_eq!(first.correct_answer(), Some("A bus"));
        assert_eq!(
            first.audio().map(Url::as_str),
            Some("https://cdn.example.com/q1.mp3")
        );
    }

    #[test]
    fn failed_envelope_becomes_rejection() {
        let envelope: ApiResponse<QuizDto> =
            serde_json::from_str(r#"{"success": false, "data": null, "error": "quota"}"#).unwrap();
        assert_eq!(
            envelope.into_result(200).unwrap_err(),
            ProviderError::Rejected {
                status: 200,
                message: "quota".into()
            }
        );
    }

    #[test]
    fn unknown_question_type_is_invalid() {
        let dto: QuestionDto = serde_json::from_str(
            r#"{"id": "q", "type": "speaking", "questionText": "Talk"}"#,
        )
        .unwrap();
        assert!(matches!(
            map_question(dto),
            Err(quiz_core::Error::Quiz(_))
        ));
    }

    #[test]
    fn decodes_scored_attempt() {
        let dto: AttemptDto = serde_json::from_str(
            r#"{
                "id": "att-9", "userId": "u1", "quizId": "quiz-1",
                "answers": [
                    {"questionId": "q1", "answer": "A bus", "isCorrect": true, "timeSpent": 12},
                    {"questionId": "q2", "answer": "", "isCorrect": false, "timeSpent": 3}
                ],
                "score": 50, "timeSpent": 15, "status": "completed",
                "startedAt": "2024-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        let result = map_attempt(dto).unwrap();
        assert_eq!(result.attempt_id, AttemptId::new("att-9"));
        assert_eq!(result.quiz_id, QuizId::new("quiz-1"));
        assert_eq!(result.status, AttemptStatus::Completed);
        assert_eq!(result.correct_count(), 1);
        assert_eq!(result.time_spent_secs, 15);
    }

    #[test]
    fn decodes_user_tier() {
        let dto: UserDto = serde_json::from_str(
            r#"{"id": "u1", "email": "a@b.c", "username": "ana",
                "subscriptionType": "free", "freeAttemptsUsed": 2, "freeAttemptsLimit": 3}"#,
        )
        .unwrap();
        let access = map_user(dto).unwrap();
        assert_eq!(access.tier, SubscriptionTier::Free);
        assert_eq!(access.remaining_attempts(), Some(1));
    }

    #[test]
    fn answers_serialize_camel_case() {
        let slot = AnswerSlot::from_persisted(QuestionId::new("q1"), "A".into(), 7);
        let json = serde_json::to_value(UpdateAttemptRequest {
            answers: vec![answer_dto(&slot)],
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"answers": [{"questionId": "q1", "answer": "A", "timeSpent": 7}]})
        );
    }
}
