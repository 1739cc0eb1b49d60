use chrono::{DateTime, Utc};
use std::sync::Arc;

use exam_core::model::{
    AssessmentDefinition, AssessmentId, AssessmentResult, CandidateId, OptionKey, SessionId,
};
use storage::repository::{ResultRepository, ResultRow};

use crate::error::ExamServiceError;

/// Storage identifier for a persisted result.
///
/// NOTE: This is currently `i64` to match `SQLite` row IDs.
pub type ResultId = i64;

/// Formats a remaining-seconds budget as `MM:SS` for a countdown header.
///
/// Minutes are not capped at 59, so a 90-minute budget renders as `90:00`.
#[must_use]
pub fn format_remaining(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

//
// ─── RESULT VIEW ───────────────────────────────────────────────────────────────
//

/// One question of a graded result, joined with the question text and option
/// texts for a results screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeView {
    pub question_text: String,
    pub subject: String,
    pub chosen_option: Option<OptionKey>,
    pub chosen_text: Option<String>,
    pub correct_answer: OptionKey,
    pub correct_text: String,
    pub correct: bool,
    pub explanation: Option<String>,
}

/// Presentation-agnostic view of a graded result.
///
/// This is intentionally **not** a UI view-model:
/// - no pre-formatted strings beyond the joined texts
/// - no localization assumptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    pub title: String,
    pub total_questions: u32,
    pub correct_count: u32,
    pub percentage: u32,
    pub outcomes: Vec<OutcomeView>,
}

impl ResultView {
    /// Join a graded result with the definition it was graded against.
    ///
    /// Outcomes originate from the definition's own question list, so every
    /// outcome resolves; one that does not (a caller mixing definitions) is
    /// dropped rather than rendered half-empty.
    #[must_use]
    pub fn from_parts(definition: &AssessmentDefinition, result: &AssessmentResult) -> Self {
        let outcomes = result
            .outcomes()
            .iter()
            .filter_map(|outcome| {
                let question = definition.question(&outcome.question_id)?;
                let chosen_text = outcome
                    .chosen_option
                    .as_ref()
                    .and_then(|key| question.option_text(key))
                    .map(str::to_owned);
                Some(OutcomeView {
                    question_text: question.text().to_owned(),
                    subject: question.subject().to_owned(),
                    chosen_option: outcome.chosen_option.clone(),
                    chosen_text,
                    correct_answer: question.correct_answer().clone(),
                    correct_text: question
                        .option_text(question.correct_answer())
                        .unwrap_or_default()
                        .to_owned(),
                    correct: outcome.correct,
                    explanation: outcome.explanation.clone(),
                })
            })
            .collect();

        Self {
            title: definition.title().to_owned(),
            total_questions: result.total_questions(),
            correct_count: result.correct_count(),
            percentage: result.percentage(),
            outcomes,
        }
    }
}

//
// ─── RESULT HISTORY ────────────────────────────────────────────────────────────
//

/// Compact list entry for a candidate's past results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultListItem {
    pub id: ResultId,
    pub session_id: SessionId,
    pub assessment_id: AssessmentId,
    pub completed_at: DateTime<Utc>,

    pub total_questions: u32,
    pub correct_count: u32,
    pub percentage: u32,
}

impl ResultListItem {
    #[must_use]
    pub fn from_row(row: &ResultRow) -> Self {
        let record = &row.record;
        Self {
            id: row.id,
            session_id: record.session_id,
            assessment_id: record.assessment_id,
            completed_at: record.completed_at,
            total_questions: record.result.total_questions(),
            correct_count: record.result.correct_count(),
            percentage: record.result.percentage(),
        }
    }
}

/// Read-side facade over the persisted results history.
#[derive(Clone)]
pub struct ResultHistoryService {
    results: Arc<dyn ResultRepository>,
}

impl ResultHistoryService {
    #[must_use]
    pub fn new(results: Arc<dyn ResultRepository>) -> Self {
        Self { results }
    }

    /// Load a candidate's most recent results, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` on repository failures.
    pub async fn list_recent(
        &self,
        candidate: &CandidateId,
        limit: u32,
    ) -> Result<Vec<ResultListItem>, ExamServiceError> {
        let rows = self
            .results
            .list_results_for_candidate(candidate, limit)
            .await?;
        Ok(rows.iter().map(ResultListItem::from_row).collect())
    }

    /// Load one persisted result by id.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` on repository failures, including
    /// `StorageError::NotFound`.
    pub async fn get(
        &self,
        id: ResultId,
    ) -> Result<storage::repository::ResultRecord, ExamServiceError> {
        Ok(self.results.get_result(id).await?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{Question, QuestionId};
    use exam_core::scorer;
    use std::collections::{BTreeMap, HashMap};

    fn build_question(id: &str, correct: &str) -> Question {
        let options: BTreeMap<_, _> = [
            (OptionKey::new("a"), "Paris".to_string()),
            (OptionKey::new("b"), "Berlin".to_string()),
        ]
        .into_iter()
        .collect();
        Question::new(
            QuestionId::new(id),
            format!("Question {id}"),
            options,
            OptionKey::new(correct),
            Some("Capitals again.".to_string()),
            "geography",
        )
        .unwrap()
    }

    fn build_definition() -> AssessmentDefinition {
        AssessmentDefinition::new(
            AssessmentId::new(1),
            "Geography Mock",
            vec![build_question("q1", "a"), build_question("q2", "b")],
            600,
        )
        .unwrap()
    }

    #[test]
    fn formats_remaining_time_as_mm_ss() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(59), "00:59");
        assert_eq!(format_remaining(60), "01:00");
        assert_eq!(format_remaining(3600), "60:00");
        assert_eq!(format_remaining(5400), "90:00");
    }

    #[test]
    fn result_view_joins_texts_and_verdicts() {
        let definition = build_definition();
        let answers: HashMap<_, _> = [(QuestionId::new("q1"), OptionKey::new("b"))]
            .into_iter()
            .collect();
        let result = scorer::score(definition.questions(), &answers);

        let view = ResultView::from_parts(&definition, &result);

        assert_eq!(view.title, "Geography Mock");
        assert_eq!(view.total_questions, 2);
        assert_eq!(view.correct_count, 0);
        assert_eq!(view.percentage, 0);

        let first = &view.outcomes[0];
        assert_eq!(first.chosen_text.as_deref(), Some("Berlin"));
        assert_eq!(first.correct_text, "Paris");
        assert!(!first.correct);

        let second = &view.outcomes[1];
        assert_eq!(second.chosen_option, None);
        assert_eq!(second.chosen_text, None);
        assert_eq!(second.correct_text, "Berlin");
    }
}
