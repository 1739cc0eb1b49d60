use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use exam_core::model::{
    AssessmentDefinition, AssessmentId, AssessmentResult, CandidateId, OptionKey, Question,
    QuestionError, QuestionId, SessionId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape for a question.
///
/// This mirrors the domain `Question` so repositories can serialize and
/// rehydrate rows without leaking storage concerns into the domain layer;
/// rehydration re-runs domain validation.
#[derive(Debug, Clone)]
pub struct QuestionRecord {
    pub id: String,
    pub text: String,
    pub options: Vec<(String, String)>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub subject: String,
}

impl QuestionRecord {
    #[must_use]
    pub fn from_question(question: &Question) -> Self {
        Self {
            id: question.id().as_str().to_owned(),
            text: question.text().to_owned(),
            options: question
                .options()
                .iter()
                .map(|(key, text)| (key.as_str().to_owned(), text.clone()))
                .collect(),
            correct_answer: question.correct_answer().as_str().to_owned(),
            explanation: question.explanation().map(str::to_owned),
            subject: question.subject().to_owned(),
        }
    }

    /// Convert the record back into a domain `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the stored row violates a domain invariant
    /// (e.g. a correct answer pointing at a deleted option).
    pub fn into_question(self) -> Result<Question, QuestionError> {
        let options: BTreeMap<OptionKey, String> = self
            .options
            .into_iter()
            .map(|(key, text)| (OptionKey::new(key), text))
            .collect();
        Question::new(
            QuestionId::new(self.id),
            self.text,
            options,
            OptionKey::new(self.correct_answer),
            self.explanation,
            self.subject,
        )
    }
}

/// Terminal result record handed to the results history once a session
/// reaches its submitted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub session_id: SessionId,
    pub candidate_id: CandidateId,
    pub assessment_id: AssessmentId,
    pub completed_at: DateTime<Utc>,
    pub result: AssessmentResult,
}

/// A persisted result together with its storage row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub id: i64,
    pub record: ResultRecord,
}

impl ResultRow {
    #[must_use]
    pub fn new(id: i64, record: ResultRecord) -> Self {
        Self { id, record }
    }
}

/// Repository contract for the question bank.
#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    /// Persist or update an assessment and its question list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the assessment cannot be stored.
    async fn upsert_assessment(
        &self,
        assessment: &AssessmentDefinition,
    ) -> Result<(), StorageError>;

    /// Fetch an assessment by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_assessment(
        &self,
        id: AssessmentId,
    ) -> Result<AssessmentDefinition, StorageError>;

    /// List all assessments, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn list_assessments(&self) -> Result<Vec<AssessmentDefinition>, StorageError>;
}

/// Repository contract for per-candidate entitlement facts.
///
/// This replaces the original system's process-global payment flag: the
/// purchase flow records a grant here, and session start consumes the
/// boolean fact.
#[async_trait]
pub trait EntitlementRepository: Send + Sync {
    /// Record that a candidate may start an assessment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the grant cannot be stored.
    async fn grant(
        &self,
        candidate: &CandidateId,
        assessment: AssessmentId,
    ) -> Result<(), StorageError>;

    /// Whether a candidate may start an assessment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn is_entitled(
        &self,
        candidate: &CandidateId,
        assessment: AssessmentId,
    ) -> Result<bool, StorageError>;
}

/// Repository contract for the results history.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Append a terminal result, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the result cannot be stored.
    async fn append_result(&self, record: &ResultRecord) -> Result<i64, StorageError>;

    /// Fetch a persisted result by row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, id: i64) -> Result<ResultRecord, StorageError>;

    /// List a candidate's persisted results, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn list_results_for_candidate(
        &self,
        candidate: &CandidateId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    assessments: Arc<Mutex<HashMap<AssessmentId, AssessmentDefinition>>>,
    entitlements: Arc<Mutex<HashSet<(CandidateId, AssessmentId)>>>,
    results: Arc<Mutex<Vec<ResultRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssessmentRepository for InMemoryRepository {
    async fn upsert_assessment(
        &self,
        assessment: &AssessmentDefinition,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .assessments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(assessment.id(), assessment.clone());
        Ok(())
    }

    async fn get_assessment(
        &self,
        id: AssessmentId,
    ) -> Result<AssessmentDefinition, StorageError> {
        let guard = self
            .assessments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_assessments(&self) -> Result<Vec<AssessmentDefinition>, StorageError> {
        let guard = self
            .assessments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut all: Vec<_> = guard.values().cloned().collect();
        all.sort_by_key(AssessmentDefinition::id);
        Ok(all)
    }
}

#[async_trait]
impl EntitlementRepository for InMemoryRepository {
    async fn grant(
        &self,
        candidate: &CandidateId,
        assessment: AssessmentId,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .entitlements
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((candidate.clone(), assessment));
        Ok(())
    }

    async fn is_entitled(
        &self,
        candidate: &CandidateId,
        assessment: AssessmentId,
    ) -> Result<bool, StorageError> {
        let guard = self
            .entitlements
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.contains(&(candidate.clone(), assessment)))
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn append_result(&self, record: &ResultRecord) -> Result<i64, StorageError> {
        let mut guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.push(record.clone());
        i64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("row id overflow".to_string()))
    }

    async fn get_result(&self, id: i64) -> Result<ResultRecord, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let index = usize::try_from(id - 1).map_err(|_| StorageError::NotFound)?;
        guard.get(index).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_results_for_candidate(
        &self,
        candidate: &CandidateId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<_> = guard
            .iter()
            .enumerate()
            .filter(|(_, record)| &record.candidate_id == candidate)
            .filter_map(|(index, record)| {
                let id = i64::try_from(index + 1).ok()?;
                Some(ResultRow::new(id, record.clone()))
            })
            .collect();
        rows.sort_by(|a, b| {
            (b.record.completed_at, b.id).cmp(&(a.record.completed_at, a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

/// Aggregates the three repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub assessments: Arc<dyn AssessmentRepository>,
    pub entitlements: Arc<dyn EntitlementRepository>,
    pub results: Arc<dyn ResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let assessments: Arc<dyn AssessmentRepository> = Arc::new(repo.clone());
        let entitlements: Arc<dyn EntitlementRepository> = Arc::new(repo.clone());
        let results: Arc<dyn ResultRepository> = Arc::new(repo);
        Self {
            assessments,
            entitlements,
            results,
        }
    }
}
