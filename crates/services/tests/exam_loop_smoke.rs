use std::collections::BTreeMap;
use std::sync::Arc;

use exam_core::model::{
    AssessmentDefinition, AssessmentId, CandidateId, OptionKey, Question, QuestionId,
};
use exam_core::time::fixed_now;
use services::{Clock, ExamLoopService, ExamServiceError, ResultHistoryService, SessionError};
use storage::repository::{AssessmentRepository, EntitlementRepository, InMemoryRepository};

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

async fn seed(repo: &InMemoryRepository, candidate: &CandidateId) -> AssessmentId {
    let assessment = AssessmentDefinition::new(
        AssessmentId::new(1),
        "Smoke Mock Test",
        vec![build_question("q1", "b"), build_question("q2", "a")],
        3600,
    )
    .unwrap();
    repo.upsert_assessment(&assessment).await.unwrap();
    repo.grant(candidate, assessment.id()).await.unwrap();
    assessment.id()
}

fn build_service(repo: &InMemoryRepository) -> ExamLoopService {
    ExamLoopService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    )
}

#[tokio::test]
async fn full_attempt_persists_a_result() {
    let repo = InMemoryRepository::new();
    let candidate = CandidateId::new("cand-1");
    let assessment_id = seed(&repo, &candidate).await;
    let service = build_service(&repo);

    let mut session = service.start_session(&candidate, assessment_id).await.unwrap();
    assert_eq!(session.remaining_seconds(), 3600);

    session
        .select_answer(&QuestionId::new("q1"), OptionKey::new("b"))
        .unwrap();
    session.next().unwrap();
    assert_eq!(session.current_index(), 1);

    let submitted = service.submit_session(&mut session).await.unwrap();
    assert_eq!(submitted.result.total_questions(), 2);
    assert_eq!(submitted.result.correct_count(), 1);
    assert_eq!(session.result_row_id(), Some(submitted.result_id));

    let history = ResultHistoryService::new(Arc::new(repo.clone()));
    let items = history.list_recent(&candidate, 10).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, submitted.result_id);
    assert_eq!(items[0].session_id, session.id());
    assert_eq!(items[0].correct_count, 1);
    assert_eq!(items[0].percentage, 50);

    let record = history.get(submitted.result_id).await.unwrap();
    assert_eq!(record.result, submitted.result);
    assert_eq!(record.completed_at, fixed_now());
}

#[tokio::test]
async fn start_is_gated_on_entitlement() {
    let repo = InMemoryRepository::new();
    let candidate = CandidateId::new("cand-1");
    let assessment_id = seed(&repo, &candidate).await;
    let service = build_service(&repo);

    let stranger = CandidateId::new("cand-2");
    let err = service.start_session(&stranger, assessment_id).await.unwrap_err();
    assert!(matches!(
        err,
        ExamServiceError::Session(SessionError::NotEntitled)
    ));
}

#[tokio::test]
async fn start_fails_for_a_missing_assessment() {
    let repo = InMemoryRepository::new();
    let candidate = CandidateId::new("cand-1");
    seed(&repo, &candidate).await;
    let service = build_service(&repo);

    let err = service
        .start_session(&candidate, AssessmentId::new(99))
        .await
        .unwrap_err();
    assert!(matches!(err, ExamServiceError::Storage(_)));
}

#[tokio::test]
async fn second_submission_is_rejected_but_finalize_is_idempotent() {
    let repo = InMemoryRepository::new();
    let candidate = CandidateId::new("cand-1");
    let assessment_id = seed(&repo, &candidate).await;
    let service = build_service(&repo);

    let mut session = service.start_session(&candidate, assessment_id).await.unwrap();
    let submitted = service.submit_session(&mut session).await.unwrap();

    let err = service.submit_session(&mut session).await.unwrap_err();
    assert!(matches!(
        err,
        ExamServiceError::Session(SessionError::SessionNotActive)
    ));

    // finalize after the fact hands back the already-persisted row
    let id = service.finalize_result(&mut session).await.unwrap();
    assert_eq!(id, submitted.result_id);

    let history = ResultHistoryService::new(Arc::new(repo.clone()));
    assert_eq!(history.list_recent(&candidate, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn finalize_requires_a_submitted_session() {
    let repo = InMemoryRepository::new();
    let candidate = CandidateId::new("cand-1");
    let assessment_id = seed(&repo, &candidate).await;
    let service = build_service(&repo);

    let mut session = service.start_session(&candidate, assessment_id).await.unwrap();
    let err = service.finalize_result(&mut session).await.unwrap_err();
    assert!(matches!(err, ExamServiceError::NotSubmitted));
}
