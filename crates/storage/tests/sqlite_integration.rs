use std::collections::{BTreeMap, HashMap};

use exam_core::model::{
    AssessmentDefinition, AssessmentId, CandidateId, OptionKey, Question, QuestionId, SessionId,
};
use exam_core::scorer;
use exam_core::time::fixed_now;
use storage::repository::{
    AssessmentRepository, EntitlementRepository, ResultRecord, ResultRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn build_question(id: &str, correct: &str) -> Question {
    let options: BTreeMap<_, _> = [
        (OptionKey::new("a"), "Option A".to_string()),
        (OptionKey::new("b"), "Option B".to_string()),
        (OptionKey::new("c"), "Option C".to_string()),
        (OptionKey::new("d"), "Option D".to_string()),
    ]
    .into_iter()
    .collect();
    Question::new(
        QuestionId::new(id),
        format!("Question {id}"),
        options,
        OptionKey::new(correct),
        Some(format!("The answer is {correct}.")),
        "history",
    )
    .unwrap()
}

fn build_assessment(id: u64) -> AssessmentDefinition {
    AssessmentDefinition::new(
        AssessmentId::new(id),
        format!("Mock Test {id}"),
        vec![build_question("q1", "b"), build_question("q2", "a")],
        3600,
    )
    .unwrap()
}

#[tokio::test]
async fn round_trips_an_assessment_with_questions_and_options() {
    let repo = connect("memdb_assessment_roundtrip").await;
    let assessment = build_assessment(1);

    repo.upsert_assessment(&assessment).await.unwrap();
    let fetched = repo.get_assessment(assessment.id()).await.unwrap();

    assert_eq!(fetched, assessment);
    assert_eq!(fetched.questions()[0].option_text(&OptionKey::new("d")), Some("Option D"));
}

#[tokio::test]
async fn upsert_replaces_the_question_list() {
    let repo = connect("memdb_upsert_replace").await;
    let assessment = build_assessment(1);
    repo.upsert_assessment(&assessment).await.unwrap();

    let trimmed = AssessmentDefinition::new(
        assessment.id(),
        "Mock Test 1 (revised)",
        vec![build_question("q3", "c")],
        1800,
    )
    .unwrap();
    repo.upsert_assessment(&trimmed).await.unwrap();

    let fetched = repo.get_assessment(assessment.id()).await.unwrap();
    assert_eq!(fetched.title(), "Mock Test 1 (revised)");
    assert_eq!(fetched.question_count(), 1);
    assert_eq!(fetched.questions()[0].id(), &QuestionId::new("q3"));
    assert_eq!(fetched.duration_seconds(), 1800);
}

#[tokio::test]
async fn lists_assessments_in_id_order() {
    let repo = connect("memdb_list_order").await;
    repo.upsert_assessment(&build_assessment(2)).await.unwrap();
    repo.upsert_assessment(&build_assessment(1)).await.unwrap();

    let all = repo.list_assessments().await.unwrap();
    let ids: Vec<_> = all.iter().map(|a| a.id().value()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn entitlement_grant_round_trips() {
    let repo = connect("memdb_entitlements").await;
    let candidate = CandidateId::new("cand-1");

    assert!(!repo
        .is_entitled(&candidate, AssessmentId::new(1))
        .await
        .unwrap());

    repo.grant(&candidate, AssessmentId::new(1)).await.unwrap();
    // granting twice must not fail
    repo.grant(&candidate, AssessmentId::new(1)).await.unwrap();

    assert!(repo
        .is_entitled(&candidate, AssessmentId::new(1))
        .await
        .unwrap());
    assert!(!repo
        .is_entitled(&CandidateId::new("cand-2"), AssessmentId::new(1))
        .await
        .unwrap());
}

#[tokio::test]
async fn persists_and_reloads_a_graded_result() {
    let repo = connect("memdb_result_roundtrip").await;
    let assessment = build_assessment(1);

    let answers: HashMap<_, _> = [(QuestionId::new("q1"), OptionKey::new("b"))]
        .into_iter()
        .collect();
    let graded = scorer::score(assessment.questions(), &answers);

    let record = ResultRecord {
        session_id: SessionId::generate(),
        candidate_id: CandidateId::new("cand-1"),
        assessment_id: assessment.id(),
        completed_at: fixed_now(),
        result: graded.clone(),
    };

    let id = repo.append_result(&record).await.unwrap();
    let fetched = repo.get_result(id).await.unwrap();

    assert_eq!(fetched, record);
    assert_eq!(fetched.result.correct_count(), 1);
    assert_eq!(fetched.result.outcomes()[1].chosen_option, None);

    let missing = repo.get_result(id + 1).await;
    assert!(matches!(missing, Err(StorageError::NotFound)));
}

#[tokio::test]
async fn lists_a_candidates_results_newest_first() {
    let repo = connect("memdb_result_list").await;
    let assessment = build_assessment(1);
    let candidate = CandidateId::new("cand-1");
    let graded = scorer::score(assessment.questions(), &HashMap::new());

    for offset in 0..3_i64 {
        let record = ResultRecord {
            session_id: SessionId::generate(),
            candidate_id: candidate.clone(),
            assessment_id: assessment.id(),
            completed_at: fixed_now() + chrono::Duration::minutes(offset),
            result: graded.clone(),
        };
        repo.append_result(&record).await.unwrap();
    }

    let rows = repo
        .list_results_for_candidate(&candidate, 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].record.completed_at > rows[2].record.completed_at);

    let none = repo
        .list_results_for_candidate(&CandidateId::new("cand-2"), 10)
        .await
        .unwrap();
    assert!(none.is_empty());
}
