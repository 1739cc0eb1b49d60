//! Deterministic grading of an answer map against a question list.

use std::collections::HashMap;

use crate::model::{AssessmentResult, OptionKey, Question, QuestionId, QuestionOutcome};

/// Grade `answers` against `questions`.
///
/// Pure and referentially transparent: identical inputs always produce a
/// structurally identical [`AssessmentResult`]. One outcome is emitted per
/// question, in the given (canonical) order. A question absent from the
/// answer map is unanswered and grades as incorrect; correctness is a
/// case-sensitive equality check on the option key, never on option text.
#[must_use]
pub fn score(
    questions: &[Question],
    answers: &HashMap<QuestionId, OptionKey>,
) -> AssessmentResult {
    let outcomes = questions
        .iter()
        .map(|question| {
            let chosen = answers.get(question.id()).cloned();
            let correct = chosen.as_ref() == Some(question.correct_answer());
            QuestionOutcome {
                question_id: question.id().clone(),
                chosen_option: chosen,
                correct,
                explanation: question.explanation().map(str::to_owned),
            }
        })
        .collect();

    AssessmentResult::from_outcomes(outcomes)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
