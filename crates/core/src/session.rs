use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::model::{
    AssessmentDefinition, AssessmentResult, CandidateId, OptionKey, Question, QuestionId,
    SessionId,
};
use crate::scorer;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Precondition violations raised by session commands.
///
/// None of these are transient: a failed command leaves the session exactly
/// as it was, and retrying without fixing the caller changes nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("candidate is not entitled to start this assessment")]
    NotEntitled,

    #[error("assessment has no questions")]
    EmptyAssessment,

    #[error("session is no longer active")]
    SessionNotActive,

    #[error("question {0} is not part of this assessment")]
    UnknownQuestion(QuestionId),

    #[error("option {key} is not an option of question {question}")]
    UnknownOption { question: QuestionId, key: OptionKey },

    #[error("question index {index} is outside 0..{count}")]
    IndexOutOfRange { index: usize, count: usize },
}

//
// ─── STATUS & PROGRESS ─────────────────────────────────────────────────────────
//

/// Lifecycle state of a session. `Submitted` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Submitted,
}

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub unanswered: usize,
    pub is_complete: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One candidate's single continuous attempt at one assessment.
///
/// The session owns the countdown, the answer map, and the one-way
/// transition into `Submitted`. Commands are synchronous and all-or-nothing;
/// the tick cadence is the only asynchronous boundary, and [`Session::tick`]
/// tolerates late deliveries after termination. Hosts that issue commands
/// from more than one task must serialize them externally (e.g. a mutex per
/// session).
pub struct Session {
    id: SessionId,
    candidate_id: CandidateId,
    assessment: AssessmentDefinition,
    current_index: usize,
    answers: HashMap<QuestionId, OptionKey>,
    remaining_seconds: u32,
    status: SessionStatus,
    result: Option<AssessmentResult>,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    result_row_id: Option<i64>,
}

impl Session {
    /// Start a new attempt.
    ///
    /// The entitlement fact comes from the (external) purchase flow; the
    /// engine only consumes the boolean. `started_at` should come from the
    /// caller's clock to keep time deterministic in tests.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotEntitled` if the entitlement was not
    /// granted, and `SessionError::EmptyAssessment` if the assessment has no
    /// questions.
    pub fn start(
        assessment: AssessmentDefinition,
        candidate_id: CandidateId,
        entitlement_granted: bool,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if !entitlement_granted {
            return Err(SessionError::NotEntitled);
        }
        if assessment.question_count() == 0 {
            return Err(SessionError::EmptyAssessment);
        }

        let remaining_seconds = assessment.duration_seconds();
        Ok(Self {
            id: SessionId::generate(),
            candidate_id,
            assessment,
            current_index: 0,
            answers: HashMap::new(),
            remaining_seconds,
            status: SessionStatus::Active,
            result: None,
            started_at,
            submitted_at: None,
            result_row_id: None,
        })
    }

    // ── accessors ──

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn candidate_id(&self) -> &CandidateId {
        &self.candidate_id
    }

    #[must_use]
    pub fn assessment(&self) -> &AssessmentDefinition {
        &self.assessment
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The question at the current navigation index.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.assessment.questions().get(self.current_index)
    }

    /// The recorded answer for a question, if any.
    #[must_use]
    pub fn answer_for(&self, question_id: &QuestionId) -> Option<&OptionKey> {
        self.answers.get(question_id)
    }

    #[must_use]
    pub fn answers(&self) -> &HashMap<QuestionId, OptionKey> {
        &self.answers
    }

    /// Present once the session is submitted; immutable afterwards.
    #[must_use]
    pub fn result(&self) -> Option<&AssessmentResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// Storage row id of the persisted result, once appended.
    ///
    /// NOTE: This is currently `i64` to match `SQLite` row IDs.
    #[must_use]
    pub fn result_row_id(&self) -> Option<i64> {
        self.result_row_id
    }

    pub fn set_result_row_id(&mut self, id: i64) {
        self.result_row_id = Some(id);
    }

    /// Returns a summary of the current answering progress.
    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.assessment.question_count();
        let answered = self.answers.len();
        SessionProgress {
            total,
            answered,
            unanswered: total.saturating_sub(answered),
            is_complete: self.status == SessionStatus::Submitted,
        }
    }

    // ── commands ──

    /// Record or overwrite the answer for a question.
    ///
    /// At most one answer per question is kept; selecting a new option
    /// replaces the previous one. Neither the navigation index nor the
    /// countdown is touched.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionNotActive` after submission,
    /// `SessionError::UnknownQuestion` for an id outside the assessment, and
    /// `SessionError::UnknownOption` for a key the question does not offer.
    pub fn select_answer(
        &mut self,
        question_id: &QuestionId,
        option_key: OptionKey,
    ) -> Result<(), SessionError> {
        self.ensure_active()?;

        let question = self
            .assessment
            .question(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))?;
        if !question.has_option(&option_key) {
            return Err(SessionError::UnknownOption {
                question: question_id.clone(),
                key: option_key,
            });
        }

        self.answers.insert(question_id.clone(), option_key);
        Ok(())
    }

    /// Jump to a question by index.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionNotActive` after submission and
    /// `SessionError::IndexOutOfRange` outside `[0, question_count)`.
    pub fn go_to(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_active()?;

        let count = self.assessment.question_count();
        if index >= count {
            return Err(SessionError::IndexOutOfRange { index, count });
        }
        self.current_index = index;
        Ok(())
    }

    /// Advance to the next question; a no-op at the last index.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionNotActive` after submission.
    pub fn next(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        if self.current_index + 1 < self.assessment.question_count() {
            self.current_index += 1;
        }
        Ok(())
    }

    /// Step back to the previous question; a no-op at index 0.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionNotActive` after submission.
    pub fn previous(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.current_index = self.current_index.saturating_sub(1);
        Ok(())
    }

    /// Consume one second of the budget; forces submission at zero.
    ///
    /// Invoked once per elapsed second by the tick source. A tick against a
    /// terminal session is silently ignored: the tick source may have one
    /// delivery in flight when the session submits, and that race must never
    /// surface as an error. Returns the post-tick status so a driver knows
    /// when to stop delivering.
    pub fn tick(&mut self, now: DateTime<Utc>) -> SessionStatus {
        if self.status != SessionStatus::Active {
            return self.status;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.finish(now);
        }
        self.status
    }

    /// Submit the attempt and grade it.
    ///
    /// Unanswered questions grade as incorrect, never as an error.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionNotActive` if the session was already
    /// submitted; a second submission is a caller bug, not a no-op. The
    /// forced-timeout path and this command can never both fire: whichever
    /// runs first wins the single `Submitted` transition.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<&AssessmentResult, SessionError> {
        self.ensure_active()?;
        self.finish(now);
        // finish() always sets the result before flipping the status.
        self.result.as_ref().ok_or(SessionError::SessionNotActive)
    }

    // The single place the Active -> Submitted transition happens.
    fn finish(&mut self, now: DateTime<Utc>) {
        let result = scorer::score(self.assessment.questions(), &self.answers);
        self.result = Some(result);
        self.submitted_at = Some(now);
        self.status = SessionStatus::Submitted;
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.status == SessionStatus::Active {
            Ok(())
        } else {
            Err(SessionError::SessionNotActive)
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("assessment_id", &self.assessment.id())
            .field("current_index", &self.current_index)
            .field("answers_len", &self.answers.len())
            .field("remaining_seconds", &self.remaining_seconds)
            .field("status", &self.status)
            .field("started_at", &self.started_at)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssessmentId;
    use crate::time::fixed_now;
    use std::collections::BTreeMap;

    fn build_question(id: &str, correct: &str) -> Question {
        let options: BTreeMap<_, _> = [
            (OptionKey::new("a"), "Option A".to_string()),
            (OptionKey::new("b"), "Option B".to_string()),
            (OptionKey::new("c"), "Option C".to_string()),
        ]
        .into_iter()
        .collect();
        Question::new(
            QuestionId::new(id),
            format!("Question {id}"),
            options,
            OptionKey::new(correct),
            None,
            "general",
        )
        .unwrap()
    }

    fn build_assessment(question_ids: &[&str], duration_seconds: u32) -> AssessmentDefinition {
        let questions = question_ids
            .iter()
            .map(|id| build_question(id, "a"))
            .collect();
        AssessmentDefinition::new(AssessmentId::new(1), "Mock Test", questions, duration_seconds)
            .unwrap()
    }

    fn start(assessment: AssessmentDefinition) -> Session {
        Session::start(
            assessment,
            CandidateId::new("cand-1"),
            true,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn start_requires_entitlement() {
        let err = Session::start(
            build_assessment(&["q1"], 60),
            CandidateId::new("cand-1"),
            false,
            fixed_now(),
        )
        .unwrap_err();

        assert!(matches!(err, SessionError::NotEntitled));
    }

    #[test]
    fn start_rejects_empty_assessment() {
        let assessment =
            AssessmentDefinition::new(AssessmentId::new(1), "Draft", Vec::new(), 60).unwrap();
        let err = Session::start(assessment, CandidateId::new("cand-1"), true, fixed_now())
            .unwrap_err();

        assert!(matches!(err, SessionError::EmptyAssessment));
    }

    #[test]
    fn fresh_session_starts_at_the_beginning() {
        let session = start(build_assessment(&["q1", "q2"], 90));

        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.remaining_seconds(), 90);
        assert!(session.answers().is_empty());
        assert!(session.result().is_none());
    }

    #[test]
    fn select_answer_overwrites_never_appends() {
        let mut session = start(build_assessment(&["q1", "q2"], 60));
        let q1 = QuestionId::new("q1");

        session.select_answer(&q1, OptionKey::new("b")).unwrap();
        session.select_answer(&q1, OptionKey::new("c")).unwrap();

        assert_eq!(session.answers().len(), 1);
        assert_eq!(session.answer_for(&q1), Some(&OptionKey::new("c")));
    }

    #[test]
    fn selecting_the_same_answer_twice_is_idempotent() {
        let mut session = start(build_assessment(&["q1"], 60));
        let q1 = QuestionId::new("q1");

        session.select_answer(&q1, OptionKey::new("b")).unwrap();
        session.select_answer(&q1, OptionKey::new("b")).unwrap();

        assert_eq!(session.answer_for(&q1), Some(&OptionKey::new("b")));
        assert_eq!(session.answers().len(), 1);
    }

    #[test]
    fn select_answer_rejects_unknown_question_and_option() {
        let mut session = start(build_assessment(&["q1"], 60));

        let err = session
            .select_answer(&QuestionId::new("q9"), OptionKey::new("a"))
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownQuestion(_)));

        let err = session
            .select_answer(&QuestionId::new("q1"), OptionKey::new("z"))
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownOption { .. }));

        // failed commands leave the answer map untouched
        assert!(session.answers().is_empty());
    }

    #[test]
    fn navigation_moves_and_bounds_checks() {
        let mut session = start(build_assessment(&["q1", "q2", "q3"], 60));

        session.go_to(2).unwrap();
        assert_eq!(session.current_index(), 2);

        let err = session.go_to(3).unwrap_err();
        assert!(matches!(
            err,
            SessionError::IndexOutOfRange { index: 3, count: 3 }
        ));
        assert_eq!(session.current_index(), 2);
    }

    #[test]
    fn next_and_previous_clamp_at_the_edges() {
        let mut session = start(build_assessment(&["q1", "q2", "q3", "q4", "q5"], 60));

        session.previous().unwrap();
        assert_eq!(session.current_index(), 0);

        session.go_to(4).unwrap();
        session.next().unwrap();
        assert_eq!(session.current_index(), 4);

        session.previous().unwrap();
        assert_eq!(session.current_index(), 3);
        session.next().unwrap();
        assert_eq!(session.current_index(), 4);
    }

    #[test]
    fn countdown_is_monotonic_and_never_negative() {
        let mut session = start(build_assessment(&["q1"], 3));
        let mut previous = session.remaining_seconds();

        for _ in 0..10 {
            session.tick(fixed_now());
            let remaining = session.remaining_seconds();
            assert!(remaining <= previous);
            previous = remaining;
        }
        assert_eq!(session.remaining_seconds(), 0);
    }

    #[test]
    fn exactly_the_budgeted_ticks_force_submission() {
        let mut session = start(build_assessment(&["q1"], 3));

        assert_eq!(session.tick(fixed_now()), SessionStatus::Active);
        assert_eq!(session.tick(fixed_now()), SessionStatus::Active);
        assert_eq!(session.tick(fixed_now()), SessionStatus::Submitted);

        assert_eq!(session.remaining_seconds(), 0);
        let result = session.result().unwrap().clone();

        // a late 4th tick is silently ignored and alters nothing
        assert_eq!(session.tick(fixed_now()), SessionStatus::Submitted);
        assert_eq!(session.result(), Some(&result));
        assert_eq!(session.remaining_seconds(), 0);
    }

    #[test]
    fn forced_submission_grades_recorded_answers() {
        let mut session = start(build_assessment(&["q1", "q2"], 2));
        session
            .select_answer(&QuestionId::new("q1"), OptionKey::new("a"))
            .unwrap();

        session.tick(fixed_now());
        session.tick(fixed_now());

        let result = session.result().unwrap();
        assert_eq!(result.total_questions(), 2);
        assert_eq!(result.correct_count(), 1);
    }

    #[test]
    fn at_most_one_submission() {
        let mut session = start(build_assessment(&["q1"], 60));

        session.submit(fixed_now()).unwrap();
        let err = session.submit(fixed_now()).unwrap_err();
        assert!(matches!(err, SessionError::SessionNotActive));
    }

    #[test]
    fn manual_submit_wins_the_race_against_a_late_tick() {
        let mut session = start(build_assessment(&["q1"], 60));
        session.submit(fixed_now()).unwrap();
        let result = session.result().unwrap().clone();

        // in-flight timer callback lands after submission
        assert_eq!(session.tick(fixed_now()), SessionStatus::Submitted);
        assert_eq!(session.result(), Some(&result));
        assert_eq!(session.remaining_seconds(), 60);
    }

    #[test]
    fn submitted_session_rejects_every_command_except_tick() {
        let mut session = start(build_assessment(&["q1", "q2"], 60));
        session.submit(fixed_now()).unwrap();

        assert!(matches!(
            session.select_answer(&QuestionId::new("q1"), OptionKey::new("a")),
            Err(SessionError::SessionNotActive)
        ));
        assert!(matches!(session.go_to(1), Err(SessionError::SessionNotActive)));
        assert!(matches!(session.next(), Err(SessionError::SessionNotActive)));
        assert!(matches!(
            session.previous(),
            Err(SessionError::SessionNotActive)
        ));
    }

    #[test]
    fn submit_scores_the_partially_answered_sheet() {
        let mut session = start(build_assessment(&["q1", "q2"], 60));
        session
            .select_answer(&QuestionId::new("q1"), OptionKey::new("a"))
            .unwrap();

        let result = session.submit(fixed_now()).unwrap();
        assert_eq!(result.total_questions(), 2);
        assert_eq!(result.correct_count(), 1);
        assert_eq!(result.outcomes()[1].chosen_option, None);
        assert!(!result.outcomes()[1].correct);

        assert_eq!(session.submitted_at(), Some(fixed_now()));
    }

    #[test]
    fn progress_tracks_answer_count_not_position() {
        let mut session = start(build_assessment(&["q1", "q2", "q3"], 60));
        session
            .select_answer(&QuestionId::new("q2"), OptionKey::new("b"))
            .unwrap();
        session.go_to(2).unwrap();

        let progress = session.progress();
        assert_eq!(progress.total, 3);
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.unanswered, 2);
        assert!(!progress.is_complete);
    }
}
