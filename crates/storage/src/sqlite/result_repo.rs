use sqlx::Row;

use exam_core::model::{
    AssessmentResult, CandidateId, OptionKey, QuestionId, QuestionOutcome, SessionId,
};

use super::{
    SqliteRepository,
    mapping::{assessment_id_from_i64, id_i64, ser, u32_from_i64},
};
use crate::repository::{ResultRecord, ResultRepository, ResultRow, StorageError};

impl SqliteRepository {
    async fn load_outcomes(&self, result_id: i64) -> Result<Vec<QuestionOutcome>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT question_id, chosen_option, correct, explanation
                FROM result_outcomes
                WHERE result_id = ?1
                ORDER BY position
            ",
        )
        .bind(result_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let question_id: String = row.try_get("question_id").map_err(ser)?;
            let chosen: Option<String> = row.try_get("chosen_option").map_err(ser)?;
            outcomes.push(QuestionOutcome {
                question_id: QuestionId::new(question_id),
                chosen_option: chosen.map(OptionKey::new),
                correct: row.try_get("correct").map_err(ser)?,
                explanation: row.try_get("explanation").map_err(ser)?,
            });
        }
        Ok(outcomes)
    }

    async fn map_result_row(
        &self,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<ResultRow, StorageError> {
        let id: i64 = row.try_get("id").map_err(ser)?;
        let session_id: String = row.try_get("session_id").map_err(ser)?;
        let session_id: SessionId = session_id.parse().map_err(ser)?;
        let candidate_id: String = row.try_get("candidate_id").map_err(ser)?;
        let assessment_id =
            assessment_id_from_i64(row.try_get::<i64, _>("assessment_id").map_err(ser)?)?;
        let completed_at = row.try_get("completed_at").map_err(ser)?;
        let total_questions = u32_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?;
        let correct_count = u32_from_i64(
            "correct_count",
            row.try_get::<i64, _>("correct_count").map_err(ser)?,
        )?;

        let outcomes = self.load_outcomes(id).await?;
        let result = AssessmentResult::from_outcomes(outcomes);
        if result.total_questions() != total_questions
            || result.correct_count() != correct_count
        {
            return Err(StorageError::Serialization(format!(
                "result {id} counts do not match its outcomes"
            )));
        }

        Ok(ResultRow::new(
            id,
            ResultRecord {
                session_id,
                candidate_id: CandidateId::new(candidate_id),
                assessment_id,
                completed_at,
                result,
            },
        ))
    }
}

#[async_trait::async_trait]
impl ResultRepository for SqliteRepository {
    async fn append_result(&self, record: &ResultRecord) -> Result<i64, StorageError> {
        let assessment_id = id_i64("assessment_id", record.assessment_id.value())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let res = sqlx::query(
            r"
                INSERT INTO results (
                    session_id, candidate_id, assessment_id,
                    total_questions, correct_count, completed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(record.session_id.to_string())
        .bind(record.candidate_id.as_str())
        .bind(assessment_id)
        .bind(i64::from(record.result.total_questions()))
        .bind(i64::from(record.result.correct_count()))
        .bind(record.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let result_id = res.last_insert_rowid();

        for (position, outcome) in record.result.outcomes().iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("position overflow".to_string()))?;

            sqlx::query(
                r"
                    INSERT INTO result_outcomes (
                        result_id, position, question_id,
                        chosen_option, correct, explanation
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(result_id)
            .bind(position)
            .bind(outcome.question_id.as_str())
            .bind(outcome.chosen_option.as_ref().map(OptionKey::as_str))
            .bind(outcome.correct)
            .bind(outcome.explanation.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result_id)
    }

    async fn get_result(&self, id: i64) -> Result<ResultRecord, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, session_id, candidate_id, assessment_id,
                       total_questions, correct_count, completed_at
                FROM results
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        Ok(self.map_result_row(&row).await?.record)
    }

    async fn list_results_for_candidate(
        &self,
        candidate: &CandidateId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, session_id, candidate_id, assessment_id,
                       total_questions, correct_count, completed_at
                FROM results
                WHERE candidate_id = ?1
                ORDER BY completed_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(candidate.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.map_result_row(&row).await?);
        }
        Ok(out)
    }
}
