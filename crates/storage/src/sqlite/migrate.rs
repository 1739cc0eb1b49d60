use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (assessments with questions and options,
/// entitlements, results with per-question outcomes, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS assessments (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    duration_seconds INTEGER NOT NULL CHECK (duration_seconds > 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    assessment_id INTEGER NOT NULL,
                    id TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    text TEXT NOT NULL,
                    correct_answer TEXT NOT NULL,
                    explanation TEXT,
                    subject TEXT NOT NULL,
                    PRIMARY KEY (assessment_id, id),
                    FOREIGN KEY (assessment_id) REFERENCES assessments(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS question_options (
                    assessment_id INTEGER NOT NULL,
                    question_id TEXT NOT NULL,
                    option_key TEXT NOT NULL,
                    option_text TEXT NOT NULL,
                    PRIMARY KEY (assessment_id, question_id, option_key),
                    FOREIGN KEY (assessment_id, question_id)
                        REFERENCES questions(assessment_id, id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS entitlements (
                    candidate_id TEXT NOT NULL,
                    assessment_id INTEGER NOT NULL,
                    granted_at TEXT NOT NULL,
                    PRIMARY KEY (candidate_id, assessment_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS results (
                    id INTEGER PRIMARY KEY,
                    session_id TEXT NOT NULL,
                    candidate_id TEXT NOT NULL,
                    assessment_id INTEGER NOT NULL,
                    total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    completed_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS result_outcomes (
                    result_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    question_id TEXT NOT NULL,
                    chosen_option TEXT,
                    correct INTEGER NOT NULL CHECK (correct IN (0, 1)),
                    explanation TEXT,
                    PRIMARY KEY (result_id, position),
                    FOREIGN KEY (result_id) REFERENCES results(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_assessment_position
                    ON questions(assessment_id, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_results_candidate_completed
                    ON results (candidate_id, completed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
