use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{AssessmentId, QuestionId};
use crate::model::question::Question;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssessmentError {
    #[error("assessment title cannot be empty")]
    EmptyTitle,

    #[error("assessment duration must be > 0 seconds")]
    InvalidDuration,

    #[error("duplicate question id within assessment: {0}")]
    DuplicateQuestionId(QuestionId),
}

//
// ─── ASSESSMENT DEFINITION ─────────────────────────────────────────────────────
//

/// A timed multiple-choice assessment drawn from the question bank.
///
/// The question order is the canonical presentation and navigation order; a
/// session never reorders it. An empty question list is representable here
/// (the bank may hold assessments that are still being authored) and is
/// rejected when a session is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentDefinition {
    id: AssessmentId,
    title: String,
    questions: Vec<Question>,
    duration_seconds: u32,
}

impl AssessmentDefinition {
    /// Build a validated assessment definition.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::EmptyTitle` if the title is blank,
    /// `AssessmentError::InvalidDuration` if the duration is zero, and
    /// `AssessmentError::DuplicateQuestionId` if two questions share an id.
    pub fn new(
        id: AssessmentId,
        title: impl Into<String>,
        questions: Vec<Question>,
        duration_seconds: u32,
    ) -> Result<Self, AssessmentError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(AssessmentError::EmptyTitle);
        }
        if duration_seconds == 0 {
            return Err(AssessmentError::InvalidDuration);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id().clone()) {
                return Err(AssessmentError::DuplicateQuestionId(question.id().clone()));
            }
        }

        Ok(Self {
            id,
            title,
            questions,
            duration_seconds,
        })
    }

    #[must_use]
    pub fn id(&self) -> AssessmentId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Questions in canonical presentation order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Looks a question up by id.
    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn contains_question(&self, id: &QuestionId) -> bool {
        self.question(id).is_some()
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
