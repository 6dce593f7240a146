use plan_sync::mutation::{EngineOptions, Intent};
use plan_sync::plans::{ArtifactSetsEditor, TeamsEditor};
use plan_sync::remote::BatchRequest;
use plan_sync::types::{ArtifactSetPlan, TeamPlan};

use super::support::{plan, settle, Harness};

fn with_sets(sets: Vec<ArtifactSetPlan>) -> Harness {
    let mut p = plan("p1", 1);
    p.artifact_sets_plans = sets;
    Harness::new(vec![p])
}

fn set_entry(id: &str, sets: &[&str]) -> ArtifactSetPlan {
    ArtifactSetPlan {
        id: id.into(),
        character_plan: "p1".into(),
        artifact_sets: sets.iter().map(|s| s.to_string()).collect(),
        created: None,
        updated: None,
    }
}

fn committed_sets(h: &Harness) -> Vec<Vec<String>> {
    h.plans
        .get("p1")
        .unwrap()
        .artifact_sets_plans
        .into_iter()
        .map(|e| e.artifact_sets)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn split_and_merge_back_to_a_single_set() {
    let h = with_sets(vec![set_entry("a1", &["gladiator"])]);
    let sets = ArtifactSetsEditor::new("p1", h.services(), EngineOptions::default());

    let entry = sets.engine().records()[0].record.clone();
    assert_eq!(sets.split(&entry, "wanderer").unwrap(), Intent::Staged);
    settle().await;
    assert_eq!(committed_sets(&h), vec![vec!["gladiator", "wanderer"]]);

    let entry = sets.engine().records()[0].record.clone();
    assert!(sets.split(&entry, "noblesse").is_err(), "a 2+2 split is full");
    sets.remove_set(&entry, "gladiator").unwrap();
    settle().await;
    assert_eq!(committed_sets(&h), vec![vec!["wanderer"]]);

    let batches = h.remote.batches();
    assert_eq!(batches.len(), 2);
    match &batches[1][..] {
        [BatchRequest::Update { id, body, .. }] => {
            assert_eq!(id, "a1");
            assert_eq!(body["artifactSets"], serde_json::json!(["wanderer"]));
        }
        other => panic!("unexpected batch: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn removing_the_only_set_deletes_the_entry() {
    let h = with_sets(vec![set_entry("a1", &["gladiator"]), set_entry("a2", &["emblem"])]);
    let sets = ArtifactSetsEditor::new("p1", h.services(), EngineOptions::default());

    let entry = sets.engine().records()[0].record.clone();
    assert!(sets.remove_set(&entry, "emblem").is_err());
    assert_eq!(sets.remove_set(&entry, "gladiator").unwrap(), Intent::Staged);
    settle().await;

    assert!(matches!(
        &h.remote.batches()[0][..],
        [BatchRequest::Delete { id, .. }] if id == "a1"
    ));
    assert_eq!(committed_sets(&h), vec![vec!["emblem"]]);
}

#[tokio::test(start_paused = true)]
async fn a_set_cannot_pair_with_itself() {
    let h = with_sets(vec![set_entry("a1", &["gladiator"])]);
    let sets = ArtifactSetsEditor::new("p1", h.services(), EngineOptions::default());

    let entry = sets.engine().records()[0].record.clone();
    assert!(sets.split(&entry, "gladiator").is_err());
    settle().await;
    assert!(h.remote.batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn created_entry_takes_the_server_id() {
    let h = with_sets(vec![]);
    let sets = ArtifactSetsEditor::new("p1", h.services(), EngineOptions::default());

    sets.create("emblem");
    let optimistic = sets.engine().records();
    assert_eq!(optimistic.len(), 1);
    assert!(optimistic[0].is_optimistic);
    settle().await;

    match &h.remote.batches()[0][..] {
        [BatchRequest::Create { body, .. }] => {
            assert!(body.get("id").is_none());
            assert_eq!(body["characterPlan"], "p1");
        }
        other => panic!("unexpected batch: {other:?}"),
    }
    let committed = h.plans.get("p1").unwrap().artifact_sets_plans;
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].id, "srv0");
    assert!(!sets.engine().records()[0].is_optimistic);
}

#[tokio::test(start_paused = true)]
async fn editors_of_one_plan_report_independently() {
    let mut p = plan("p1", 1);
    p.team_plans.push(TeamPlan {
        id: "t1".into(),
        character_plan: "p1".into(),
        characters: vec!["bennett".into()],
        created: None,
        updated: None,
    });
    p.artifact_sets_plans.push(set_entry("a1", &["gladiator"]));
    let h = Harness::new(vec![p]);
    h.remote.on_batch(|requests| {
        if requests.iter().any(|r| r.collection() == "teamPlans") {
            Err(plan_sync::RemoteError::new(500, "Something went wrong."))
        } else {
            Ok(super::support::echo(requests))
        }
    });
    let teams = TeamsEditor::new("p1", "char-p1", h.services(), EngineOptions::default());
    let sets = ArtifactSetsEditor::new("p1", h.services(), EngineOptions::default());

    let team = teams.engine().records()[0].record.clone();
    teams.add_member(&team, "xingqiu").unwrap();
    let entry = sets.engine().records()[0].record.clone();
    sets.split(&entry, "wanderer").unwrap();
    assert!(h.registry.status("p1").is_pending);
    settle().await;

    let status = h.registry.status("p1");
    assert!(status.is_error);
    assert!(!status.is_pending);
    assert_eq!(committed_sets(&h), vec![vec!["gladiator", "wanderer"]]);

    drop(teams);
    assert_eq!(h.registry.status("p1"), Default::default());
}
