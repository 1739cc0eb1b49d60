use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;
use crate::model::question::OptionKey;

//
// ─── PER-QUESTION OUTCOME ──────────────────────────────────────────────────────
//

/// Verdict for one question inside a graded result.
///
/// `chosen_option` is `None` for an unanswered question; unanswered always
/// grades as incorrect. Field names follow the serialized contract consumed
/// by results UIs and the history store, so renames here are breaking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub chosen_option: Option<OptionKey>,
    pub correct: bool,
    pub explanation: Option<String>,
}

//
// ─── ASSESSMENT RESULT ─────────────────────────────────────────────────────────
//

/// Graded outcome of one submitted session, immutable once produced.
///
/// `outcomes` holds one entry per question of the assessment, in the
/// assessment's canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    total_questions: u32,
    correct_count: u32,
    outcomes: Vec<QuestionOutcome>,
}

impl AssessmentResult {
    /// Assemble a result from pre-graded outcomes.
    ///
    /// Intended for the scorer and for storage rehydration; `correct_count`
    /// is recomputed from the outcomes so the two can never disagree.
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<QuestionOutcome>) -> Self {
        let total_questions = u32::try_from(outcomes.len()).unwrap_or(u32::MAX);
        let correct_count = u32::try_from(outcomes.iter().filter(|o| o.correct).count())
            .unwrap_or(u32::MAX);
        Self {
            total_questions,
            correct_count,
            outcomes,
        }
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    /// Per-question outcomes in the assessment's canonical order.
    #[must_use]
    pub fn outcomes(&self) -> &[QuestionOutcome] {
        &self.outcomes
    }

    /// Score as a rounded percentage, 0 for an empty result.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percentage(&self) -> u32 {
        if self.total_questions == 0 {
            return 0;
        }
        let ratio = f64::from(self.correct_count) / f64::from(self.total_questions);
        (ratio * 100.0).round() as u32
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
