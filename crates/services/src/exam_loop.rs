use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use exam_core::model::{AssessmentId, AssessmentResult, CandidateId};
use exam_core::{Clock, Session};
use storage::repository::{
    AssessmentRepository, EntitlementRepository, ResultRecord, ResultRepository,
};

use crate::error::ExamServiceError;
use crate::ticker::{ExamSessionHandle, SessionTicker};

/// Outcome of submitting a session: the graded result and the id of its
/// persisted history row.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedResult {
    pub result: AssessmentResult,
    pub result_id: i64,
}

/// Orchestrates session start, submission, and result persistence.
#[derive(Clone)]
pub struct ExamLoopService {
    clock: Clock,
    assessments: Arc<dyn AssessmentRepository>,
    entitlements: Arc<dyn EntitlementRepository>,
    results: Arc<dyn ResultRepository>,
}

impl ExamLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        assessments: Arc<dyn AssessmentRepository>,
        entitlements: Arc<dyn EntitlementRepository>,
        results: Arc<dyn ResultRepository>,
    ) -> Self {
        Self {
            clock,
            assessments,
            entitlements,
            results,
        }
    }

    /// Start a new session for the given candidate and assessment.
    ///
    /// Loads the definition from the question bank, consults the entitlement
    /// store, and hands the boolean fact to the engine; the engine itself
    /// never sees the store. The caller is responsible for driving ticks
    /// (see [`ExamLoopService::start_session_ticking`] for the wall-clock
    /// variant).
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` on repository failures and
    /// `ExamServiceError::Session` when the engine rejects the start
    /// (`NotEntitled`, `EmptyAssessment`).
    pub async fn start_session(
        &self,
        candidate: &CandidateId,
        assessment_id: AssessmentId,
    ) -> Result<Session, ExamServiceError> {
        let assessment = self.assessments.get_assessment(assessment_id).await?;
        let entitled = self.entitlements.is_entitled(candidate, assessment_id).await?;

        let session = Session::start(assessment, candidate.clone(), entitled, self.clock.now())?;
        info!(
            session = %session.id(),
            assessment = %assessment_id,
            duration_seconds = session.remaining_seconds(),
            "session started"
        );
        Ok(session)
    }

    /// Start a session and attach a 1 Hz wall-clock ticker to it.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ExamLoopService::start_session`].
    pub async fn start_session_ticking(
        &self,
        candidate: &CandidateId,
        assessment_id: AssessmentId,
    ) -> Result<ExamSessionHandle, ExamServiceError> {
        let session = self.start_session(candidate, assessment_id).await?;
        let session = Arc::new(Mutex::new(session));
        let ticker = SessionTicker::spawn(Arc::clone(&session), self.clock);
        Ok(ExamSessionHandle::new(session, ticker))
    }

    /// Submit the session and persist its result to the history.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Session` with `SessionNotActive` if the
    /// session was already submitted (including by timeout — use
    /// [`ExamLoopService::finalize_result`] for that path), and
    /// `ExamServiceError::Storage` if the append fails after submission; in
    /// that case the session holds its result and `finalize_result` can
    /// retry the append.
    pub async fn submit_session(
        &self,
        session: &mut Session,
    ) -> Result<SubmittedResult, ExamServiceError> {
        let result = session.submit(self.clock.now())?.clone();
        info!(
            session = %session.id(),
            correct = result.correct_count(),
            total = result.total_questions(),
            "session submitted"
        );

        let result_id = self.append_result(session).await?;
        Ok(SubmittedResult { result, result_id })
    }

    /// Persist the result of an already-submitted session.
    ///
    /// Covers two paths: a session force-submitted by the countdown (the
    /// ticker cannot reach the repositories), and a retry after a transient
    /// storage failure in [`ExamLoopService::submit_session`]. Idempotent:
    /// once a row id is recorded on the session, it is returned as is.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::NotSubmitted` if the session is still
    /// active, and `ExamServiceError::Storage` if persistence fails.
    pub async fn finalize_result(
        &self,
        session: &mut Session,
    ) -> Result<i64, ExamServiceError> {
        if let Some(id) = session.result_row_id() {
            return Ok(id);
        }
        if session.is_active() {
            return Err(ExamServiceError::NotSubmitted);
        }
        self.append_result(session).await
    }

    async fn append_result(&self, session: &mut Session) -> Result<i64, ExamServiceError> {
        let (result, submitted_at) = match (session.result(), session.submitted_at()) {
            (Some(result), Some(at)) => (result.clone(), at),
            _ => return Err(ExamServiceError::NotSubmitted),
        };

        let record = ResultRecord {
            session_id: session.id(),
            candidate_id: session.candidate_id().clone(),
            assessment_id: session.assessment().id(),
            completed_at: submitted_at,
            result,
        };
        let result_id = self.results.append_result(&record).await?;
        session.set_result_row_id(result_id);
        debug!(session = %session.id(), result_id, "result persisted");
        Ok(result_id)
    }
}
