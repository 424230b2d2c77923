use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::model::ids::{QuestionId, QuizId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("quiz must contain at least one question")]
    NoQuestions,

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("single-choice question {0} has no choices")]
    MissingChoices(QuestionId),

    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("unknown question type: {0}")]
    UnknownQuestionKind(String),
}

//
// ─── SKILL ─────────────────────────────────────────────────────────────────────
//

/// The four skills the proficiency test examines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skill {
    Listening,
    Reading,
    Writing,
    Speaking,
}

impl Skill {
    pub const ALL: [Skill; 4] = [
        Skill::Listening,
        Skill::Reading,
        Skill::Writing,
        Skill::Speaking,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Skill::Listening => "listening",
            Skill::Reading => "reading",
            Skill::Writing => "writing",
            Skill::Speaking => "speaking",
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Skill {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Skill::ALL
            .into_iter()
            .find(|skill| skill.as_str() == lowered)
            .ok_or_else(|| QuizError::UnknownSkill(s.to_owned()))
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// How a question expects to be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    /// Pick one of the listed choices.
    #[serde(rename = "multiple_choice")]
    SingleChoice,
    /// Fill in a short free-text answer.
    #[serde(rename = "fill_blank")]
    ShortText,
    /// Write a long free-text answer.
    #[serde(rename = "essay")]
    LongText,
}

impl QuestionKind {
    /// Backend wire name.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "multiple_choice",
            QuestionKind::ShortText => "fill_blank",
            QuestionKind::LongText => "essay",
        }
    }
}

impl FromStr for QuestionKind {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple_choice" => Ok(QuestionKind::SingleChoice),
            "fill_blank" => Ok(QuestionKind::ShortText),
            "essay" => Ok(QuestionKind::LongText),
            other => Err(QuizError::UnknownQuestionKind(other.to_owned())),
        }
    }
}

/// A single question. Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    id: QuestionId,
    kind: QuestionKind,
    prompt: String,
    choices: Vec<String>,
    correct_answer: Option<String>,
    explanation: Option<String>,
    audio: Option<Url>,
    image: Option<Url>,
}

impl Question {
    /// Creates a question with the given prompt and no optional material.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyPrompt` if the prompt is blank.
    pub fn new(
        id: QuestionId,
        kind: QuestionKind,
        prompt: impl Into<String>,
    ) -> Result<Self, QuizError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuizError::EmptyPrompt);
        }
        Ok(Self {
            id,
            kind,
            prompt,
            choices: Vec::new(),
            correct_answer: None,
            explanation: None,
            audio: None,
            image: None,
        })
    }

    #[must_use]
    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_correct_answer(mut self, answer: impl Into<String>) -> Self {
        self.correct_answer = Some(answer.into());
        self
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    #[must_use]
    pub fn with_audio(mut self, audio: Url) -> Self {
        self.audio = Some(audio);
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: Url) -> Self {
        self.image = Some(image);
        self
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    /// Choice at the given letter position (`A`, `B`, ...), case-insensitive.
    #[must_use]
    pub fn choice_by_letter(&self, letter: char) -> Option<&str> {
        let upper = letter.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            return None;
        }
        let index = usize::from(upper as u8 - b'A');
        self.choices.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn correct_answer(&self) -> Option<&str> {
        self.correct_answer.as_deref()
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn audio(&self) -> Option<&Url> {
        self.audio.as_ref()
    }

    #[must_use]
    pub fn image(&self) -> Option<&Url> {
        self.image.as_ref()
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// A complete quiz as served by the content provider.
///
/// Questions keep the provider's order; answer slots are index-aligned with them.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizDefinition {
    id: QuizId,
    title: String,
    description: String,
    skill: Skill,
    part: u32,
    questions: Vec<Question>,
    time_limit_minutes: Option<u32>,
}

impl QuizDefinition {
    /// Creates a validated quiz definition.
    ///
    /// A time limit of zero minutes is treated as untimed.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if the title is blank, there are no questions, a question id
    /// repeats, or a single-choice question lists no choices.
    pub fn new(
        id: QuizId,
        title: impl Into<String>,
        skill: Skill,
        part: u32,
        questions: Vec<Question>,
        time_limit_minutes: Option<u32>,
    ) -> Result<Self, QuizError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(QuizError::EmptyTitle);
        }
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(QuizError::DuplicateQuestion(question.id().clone()));
            }
            if question.kind() == QuestionKind::SingleChoice && question.choices().is_empty() {
                return Err(QuizError::MissingChoices(question.id().clone()));
            }
        }

        Ok(Self {
            id,
            title,
            description: String::new(),
            skill,
            part,
            questions,
            time_limit_minutes: time_limit_minutes.filter(|minutes| *minutes > 0),
        })
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> &QuizId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn skill(&self) -> Skill {
        self.skill
    }

    #[must_use]
    pub fn part(&self) -> u32 {
        self.part
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> Option<u32> {
        self.time_limit_minutes
    }

    /// Listing view of this quiz.
    #[must_use]
    pub fn summary(&self) -> QuizSummary {
        QuizSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            skill: self.skill,
            part: self.part,
            question_count: self.questions.len(),
            time_limit_minutes: self.time_limit_minutes,
        }
    }
}

/// Catalog entry shown when browsing quizzes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSummary {
    pub id: QuizId,
    pub title: String,
    pub description: String,
    pub skill: Skill,
    pub part: u32,
    pub question_count: usize,
    pub time_limit_minutes: Option<u32>,
}

/// Catalog filter. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuizFilter {
    pub skill: Option<Skill>,
    pub part: Option<u32>,
}

impl QuizFilter {
    #[must_use]
    pub fn skill(skill: Skill) -> Self {
        Self {
            skill: Some(skill),
            part: None,
        }
    }

    #[must_use]
    pub fn with_part(mut self, part: u32) -> Self {
        self.part = Some(part);
        self
    }

    #[must_use]
    pub fn matches(&self, summary: &QuizSummary) -> bool {
        self.skill.is_none_or(|skill| skill == summary.skill)
            && self.part.is_none_or(|part| part == summary.part)
    }
}
