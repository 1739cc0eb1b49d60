use sqlx::Row;
use std::collections::HashMap;

use exam_core::model::{AssessmentDefinition, AssessmentId, Question};

use super::{
    SqliteRepository,
    mapping::{assessment_id_from_i64, id_i64, ser, u32_from_i64},
};
use crate::repository::{AssessmentRepository, QuestionRecord, StorageError};

impl SqliteRepository {
    async fn load_questions(
        &self,
        assessment_id: i64,
    ) -> Result<Vec<Question>, StorageError> {
        let option_rows = sqlx::query(
            r"
                SELECT question_id, option_key, option_text
                FROM question_options
                WHERE assessment_id = ?1
                ORDER BY question_id, option_key
            ",
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut options_by_question: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for row in option_rows {
            let question_id: String = row.try_get("question_id").map_err(ser)?;
            let key: String = row.try_get("option_key").map_err(ser)?;
            let text: String = row.try_get("option_text").map_err(ser)?;
            options_by_question
                .entry(question_id)
                .or_default()
                .push((key, text));
        }

        let question_rows = sqlx::query(
            r"
                SELECT id, text, correct_answer, explanation, subject
                FROM questions
                WHERE assessment_id = ?1
                ORDER BY position
            ",
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions = Vec::with_capacity(question_rows.len());
        for row in question_rows {
            let id: String = row.try_get("id").map_err(ser)?;
            let record = QuestionRecord {
                options: options_by_question.remove(&id).unwrap_or_default(),
                id,
                text: row.try_get("text").map_err(ser)?,
                correct_answer: row.try_get("correct_answer").map_err(ser)?,
                explanation: row.try_get("explanation").map_err(ser)?,
                subject: row.try_get("subject").map_err(ser)?,
            };
            questions.push(record.into_question().map_err(ser)?);
        }

        Ok(questions)
    }

    async fn get_assessment_inner(
        &self,
        id: i64,
    ) -> Result<AssessmentDefinition, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, title, duration_seconds
                FROM assessments
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        let assessment_id = assessment_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
        let title: String = row.try_get("title").map_err(ser)?;
        let duration_seconds = u32_from_i64(
            "duration_seconds",
            row.try_get::<i64, _>("duration_seconds").map_err(ser)?,
        )?;

        let questions = self.load_questions(id).await?;

        AssessmentDefinition::new(assessment_id, title, questions, duration_seconds)
            .map_err(ser)
    }
}

#[async_trait::async_trait]
impl AssessmentRepository for SqliteRepository {
    async fn upsert_assessment(
        &self,
        assessment: &AssessmentDefinition,
    ) -> Result<(), StorageError> {
        let assessment_id = id_i64("assessment_id", assessment.id().value())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
                INSERT INTO assessments (id, title, duration_seconds)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    duration_seconds = excluded.duration_seconds
            ",
        )
        .bind(assessment_id)
        .bind(assessment.title())
        .bind(i64::from(assessment.duration_seconds()))
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Replace the question list wholesale; options cascade.
        sqlx::query("DELETE FROM questions WHERE assessment_id = ?1")
            .bind(assessment_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for (position, question) in assessment.questions().iter().enumerate() {
            let record = QuestionRecord::from_question(question);
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("position overflow".to_string()))?;

            sqlx::query(
                r"
                    INSERT INTO questions (
                        assessment_id, id, position, text,
                        correct_answer, explanation, subject
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )
            .bind(assessment_id)
            .bind(&record.id)
            .bind(position)
            .bind(&record.text)
            .bind(&record.correct_answer)
            .bind(record.explanation.as_deref())
            .bind(&record.subject)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

            for (key, text) in &record.options {
                sqlx::query(
                    r"
                        INSERT INTO question_options (
                            assessment_id, question_id, option_key, option_text
                        )
                        VALUES (?1, ?2, ?3, ?4)
                    ",
                )
                .bind(assessment_id)
                .bind(&record.id)
                .bind(key)
                .bind(text)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn get_assessment(
        &self,
        id: AssessmentId,
    ) -> Result<AssessmentDefinition, StorageError> {
        let assessment_id = id_i64("assessment_id", id.value())?;
        self.get_assessment_inner(assessment_id).await
    }

    async fn list_assessments(&self) -> Result<Vec<AssessmentDefinition>, StorageError> {
        let rows = sqlx::query("SELECT id FROM assessments ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            out.push(self.get_assessment_inner(id).await?);
        }
        Ok(out)
    }
}
