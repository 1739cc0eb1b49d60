use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Errors raised while constructing a question.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("a question needs at least two options, got {0}")]
    TooFewOptions(usize),

    #[error("correct answer {0} is not one of the question's options")]
    CorrectAnswerNotAnOption(OptionKey),
}

//
// ─── OPTION KEY ────────────────────────────────────────────────────────────────
//

/// Key of one answer option within a question (typically `"a"`..`"d"`).
///
/// Keys compare case-sensitively; scoring matches on the key, never on the
/// option text behind it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionKey(String);

impl OptionKey {
    /// Creates a new `OptionKey`
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OptionKey({})", self.0)
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question, immutable once loaded.
///
/// Options are kept in a sorted map so iteration order is stable for
/// presentation and serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: BTreeMap<OptionKey, String>,
    correct_answer: OptionKey,
    explanation: Option<String>,
    subject: String,
}

impl Question {
    /// Build a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyText` if the text is blank,
    /// `QuestionError::TooFewOptions` for fewer than two options, and
    /// `QuestionError::CorrectAnswerNotAnOption` if `correct_answer` is not a
    /// key of the option map.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: BTreeMap<OptionKey, String>,
        correct_answer: OptionKey,
        explanation: Option<String>,
        subject: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions(options.len()));
        }
        if !options.contains_key(&correct_answer) {
            return Err(QuestionError::CorrectAnswerNotAnOption(correct_answer));
        }

        Ok(Self {
            id,
            text,
            options,
            correct_answer,
            explanation,
            subject: subject.into(),
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Option keys and texts in stable (sorted) order.
    #[must_use]
    pub fn options(&self) -> &BTreeMap<OptionKey, String> {
        &self.options
    }

    /// Returns the text behind an option key, if the key exists.
    #[must_use]
    pub fn option_text(&self, key: &OptionKey) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn has_option(&self, key: &OptionKey) -> bool {
        self.options.contains_key(key)
    }

    #[must_use]
    pub fn correct_answer(&self) -> &OptionKey {
        &self.correct_answer
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
