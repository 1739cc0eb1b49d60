use chrono::Utc;

use exam_core::model::{AssessmentId, CandidateId};

use super::{SqliteRepository, mapping::id_i64};
use crate::repository::{EntitlementRepository, StorageError};

#[async_trait::async_trait]
impl EntitlementRepository for SqliteRepository {
    async fn grant(
        &self,
        candidate: &CandidateId,
        assessment: AssessmentId,
    ) -> Result<(), StorageError> {
        let assessment_id = id_i64("assessment_id", assessment.value())?;

        // Granting twice is fine; the first grant's timestamp wins.
        sqlx::query(
            r"
                INSERT INTO entitlements (candidate_id, assessment_id, granted_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(candidate_id, assessment_id) DO NOTHING
            ",
        )
        .bind(candidate.as_str())
        .bind(assessment_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn is_entitled(
        &self,
        candidate: &CandidateId,
        assessment: AssessmentId,
    ) -> Result<bool, StorageError> {
        let assessment_id = id_i64("assessment_id", assessment.value())?;

        let row = sqlx::query(
            r"
                SELECT 1
                FROM entitlements
                WHERE candidate_id = ?1 AND assessment_id = ?2
            ",
        )
        .bind(candidate.as_str())
        .bind(assessment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(row.is_some())
    }
}
