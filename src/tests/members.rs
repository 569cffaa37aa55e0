use crate::members::{BackendJson, MemberStore};
use crate::tests::{build_update, member, project};

fn test_store(dir: &tempfile::TempDir) -> BackendJson {
    BackendJson::load(dir.path().to_str().unwrap()).unwrap()
}

#[test]
fn test_merge_new_is_append_only_and_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir);

    let batch = vec![
        member("rec1", "Ada", &["AI"], None),
        member("rec2", "Grace", &["Sales"], None),
    ];

    assert_eq!(store.merge_new(batch.clone()).unwrap(), 2);
    assert_eq!(store.total(), 2);

    // re-syncing the same batch adds nothing
    assert_eq!(store.merge_new(batch).unwrap(), 0);
    assert_eq!(store.total(), 2);

    // an already-cached member keeps its original data
    let changed = member("rec1", "Ada Updated", &[], None);
    assert_eq!(store.merge_new(vec![changed]).unwrap(), 0);
    assert_eq!(store.get("rec1").unwrap().name, "Ada");
}

#[test]
fn test_merge_new_skips_in_batch_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir);

    let batch = vec![
        member("rec1", "Ada", &[], None),
        member("rec1", "Ada Again", &[], None),
    ];

    assert_eq!(store.merge_new(batch).unwrap(), 1);
    assert_eq!(store.get("rec1").unwrap().name, "Ada");
}

#[test]
fn test_cache_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = test_store(&dir);
        store
            .merge_new(vec![member("rec1", "Ada", &["AI"], Some(vec![1.0, 0.0]))])
            .unwrap();
    }

    let reloaded = test_store(&dir);
    assert_eq!(reloaded.total(), 1);

    let ada = reloaded.get("rec1").unwrap();
    assert_eq!(ada.name, "Ada");
    assert_eq!(ada.skills, vec!["AI"]);
    assert_eq!(ada.embedding, Some(vec![1.0, 0.0]));
}

#[test]
fn test_malformed_cache_entries_are_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let raw = serde_json::json!([
        { "id": "rec1", "name": "Ada" },
        { "id": "rec2" },
        { "id": "rec3", "name": 42 },
        "not even an object",
        { "id": "rec4", "name": "Grace", "embedding": "oops" },
    ]);
    std::fs::write(
        dir.path().join("members.json"),
        serde_json::to_vec(&raw).unwrap(),
    )
    .unwrap();

    let store = test_store(&dir);
    assert_eq!(store.total(), 1);
    assert!(store.get("rec1").is_some());
}

#[test]
fn test_unreadable_cache_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("members.json"), b"definitely not json").unwrap();

    let store = test_store(&dir);
    assert_eq!(store.total(), 0);
}

#[test]
fn test_skills_are_distinct_and_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir);

    store
        .merge_new(vec![
            member("rec1", "Ada", &["Sales", "AI"], None),
            member("rec2", "Grace", &["AI", "Ops"], None),
        ])
        .unwrap();

    assert_eq!(store.skills(), vec!["AI", "Ops", "Sales"]);
}

#[test]
fn test_update_cards_flatten_projects() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir);

    let mut first = build_update("rec1", "finished the mill", None);
    first.customers_talked_to = "5".to_string();

    let mut ada = member("rec1", "Ada", &[], None);
    ada.projects = vec![
        project(
            "Analytical Engine",
            vec![first, build_update("rec1", "punched cards", None)],
        ),
        project("Notes", vec![build_update("rec1", "translated memoir", None)]),
    ];
    store.merge_new(vec![ada]).unwrap();

    let cards = store.update_cards();
    assert_eq!(cards.len(), 3);
    assert!(cards.iter().all(|c| c.member_name == "Ada"));
    assert_eq!(cards[0].project_name, "Analytical Engine");
    assert_eq!(cards[0].text, "finished the mill");
    assert_eq!(cards[0].customers_talked_to, "5");
    assert_eq!(cards[2].project_name, "Notes");
}

#[test]
fn test_wipe_database_clears_cache_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir);

    store
        .merge_new(vec![member("rec1", "Ada", &[], None)])
        .unwrap();
    assert!(dir.path().join("members.json").exists());

    let store = store.wipe_database();
    assert_eq!(store.total(), 0);
    assert!(!dir.path().join("members.json").exists());

    let reloaded = test_store(&dir);
    assert_eq!(reloaded.total(), 0);
}
