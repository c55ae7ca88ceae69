//! Behavior of the sync controller against an in-memory store.

mod common;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use uuid::Uuid;

use common::{FakeStore, Harness, Op};
use learnbuddy_core::generate::GenerationKind;
use learnbuddy_core::{GenerationError, NoticeLevel, StoreError, SyncError, Task, ValidationError};

fn seeded(descriptions: &[(&str, bool)]) -> Vec<Task> {
    let now = Utc::now();
    descriptions
        .iter()
        .enumerate()
        .map(|(i, (d, completed))| {
            let created_at = now - ChronoDuration::seconds(i as i64 + 1);
            let mut t = Task::new(Uuid::new_v4(), *d, created_at);
            t.completed = *completed;
            t
        })
        .collect()
}

async fn loaded(store: std::sync::Arc<FakeStore>) -> Harness {
    let mut h = Harness::new(store);
    h.controller.load().await.unwrap();
    h.drain_notices();
    h
}

fn errors(notices: &[learnbuddy_core::Notice]) -> usize {
    notices.iter().filter(|n| n.level == NoticeLevel::Error).count()
}

// ---------------------------------------------------------------------------
// Adding tasks
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn add_task_confirms_stored_id_and_clears_new_flag() {
    let h = loaded(FakeStore::assigning_ids()).await;
    let first = h.controller.add_task("Read the book").await.unwrap();
    let task = h.controller.add_task("  Learn recursion ").await.unwrap();

    assert_eq!(task.description, "Learn recursion");
    assert!(task.is_new);
    assert!(h.store.get(task.id).is_some(), "tree must carry the stored id");

    let tasks = h.controller.tasks().await;
    assert_eq!(tasks[0].id, task.id);
    assert_eq!(tasks[1].id, first.id);

    tokio::time::sleep(Duration::from_millis(650)).await;
    tokio::task::yield_now().await;
    assert!(h.controller.tasks().await.iter().all(|t| !t.is_new));
    assert_eq!(h.controller.pending_new_flags(), 0);
}

#[tokio::test]
async fn blank_description_never_reaches_store() {
    let mut h = loaded(FakeStore::new()).await;
    let err = h.controller.add_task("   ").await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(ValidationError::BlankDescription)));
    assert_eq!(h.store.calls(Op::Create), 0);
    assert!(h.controller.tasks().await.is_empty());

    let notices = h.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Info);
}

#[tokio::test]
async fn failed_add_is_rolled_back_with_one_notice() {
    let mut h = loaded(FakeStore::new()).await;
    h.store.fail(Op::Create);

    let err = h.controller.add_task("Doomed").await.unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::Backend(_))));
    assert!(h.controller.tasks().await.is_empty());
    assert_eq!(errors(&h.drain_notices()), 1);
}

// ---------------------------------------------------------------------------
// Task updates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn learn_recursion_subtasks_follow_their_parent() {
    let h = loaded(FakeStore::assigning_ids()).await;
    let task = h.controller.add_task("Learn recursion").await.unwrap();

    let base = h
        .controller
        .add_subtask(task.id, "base case")
        .await
        .unwrap()
        .unwrap();
    let rec = h
        .controller
        .add_subtask(task.id, "recursive case")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        h.controller.toggle_subtask_complete(task.id, rec.id).await.unwrap(),
        Some(true)
    );

    let tree = h.controller.snapshot().await;
    let in_tree = tree.get(task.id).unwrap();
    assert_eq!(in_tree.subtasks.len(), 2);
    assert_eq!(in_tree.subtasks[0].id, base.id);
    assert!(!in_tree.subtasks[0].completed);
    assert!(in_tree.subtasks[1].completed);
    assert!(in_tree.subtasks.iter().all(|s| s.parent_id == task.id));
    assert!(tree.integrity_violations().is_empty());

    let stored = h.store.get(task.id).unwrap();
    assert_eq!(stored.subtasks, in_tree.subtasks);

    assert!(h.controller.delete_subtask(task.id, base.id).await.unwrap());
    assert_eq!(h.store.get(task.id).unwrap().subtasks.len(), 1);
}

#[tokio::test]
async fn failed_toggle_restores_task() {
    let store = FakeStore::new();
    store.seed(seeded(&[("a", false), ("b", false)]));
    let mut h = loaded(store).await;
    let before = h.controller.snapshot().await;
    let id = before.tasks()[0].id;

    h.store.fail(Op::Update);
    assert!(h.controller.toggle_complete(id).await.is_err());
    assert_eq!(h.controller.snapshot().await, before);
    assert_eq!(errors(&h.drain_notices()), 1);
}

#[tokio::test]
async fn failed_subtask_add_restores_parent() {
    let store = FakeStore::new();
    store.seed(seeded(&[("a", false)]));
    let h = loaded(store).await;
    let before = h.controller.snapshot().await;
    let id = before.tasks()[0].id;

    h.store.fail(Op::Update);
    assert!(h.controller.add_subtask(id, "sub").await.is_err());
    assert_eq!(h.controller.snapshot().await, before);
}

#[tokio::test]
async fn negative_story_points_are_rejected_without_store_call() {
    let store = FakeStore::new();
    store.seed(seeded(&[("a", false)]));
    let h = loaded(store).await;
    let id = h.controller.tasks().await[0].id;
    assert!(h.controller.set_story_points(id, 5).await.unwrap());
    let before = h.controller.snapshot().await;
    let updates = h.store.calls(Op::Update);

    let err = h.controller.set_story_points(id, -1).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(ValidationError::InvalidStoryPoints(_))));
    let err = h.controller.set_story_points_input(id, "2.5").await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    assert_eq!(h.controller.snapshot().await, before);
    assert_eq!(h.store.calls(Op::Update), updates);
    assert_eq!(h.store.get(id).unwrap().story_points, 5);
}

#[tokio::test]
async fn unknown_task_is_a_quiet_no_op() {
    let h = loaded(FakeStore::new()).await;
    let ghost = Uuid::new_v4();
    assert_eq!(h.controller.toggle_complete(ghost).await.unwrap(), None);
    assert!(!h.controller.delete_task(ghost).await.unwrap());
    assert_eq!(h.controller.add_subtask(ghost, "x").await.unwrap(), None);
    assert_eq!(h.store.calls(Op::Update) + h.store.calls(Op::Delete), 0);
}

#[tokio::test(start_paused = true)]
async fn same_task_story_points_reach_store_in_order() {
    let store = FakeStore::new();
    store.seed(seeded(&[("a", false)]));
    let h = loaded(store).await;
    let id = h.controller.tasks().await[0].id;
    h.store.suspend_updates(Duration::from_millis(200));

    let first = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.set_story_points(id, 3).await }
    });
    // Wait until the first intent is applied and parked in the store.
    while h.controller.tasks().await[0].story_points != 3 {
        tokio::task::yield_now().await;
    }
    let second = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.set_story_points(id, 8).await }
    });

    assert!(first.await.unwrap().unwrap());
    assert!(second.await.unwrap().unwrap());

    assert_eq!(h.controller.tasks().await[0].story_points, 8);
    assert_eq!(h.store.get(id).unwrap().story_points, 8);
    let sent: Vec<Option<u32>> = h.store.updates().iter().map(|p| p.story_points).collect();
    assert_eq!(sent, vec![Some(3), Some(8)]);
}

#[tokio::test(start_paused = true)]
async fn failed_update_keeps_new_flag_timer() {
    let h = loaded(FakeStore::new()).await;
    let task = h.controller.add_task("fresh").await.unwrap();
    assert!(task.is_new);

    // The store outlives the new-flag delay, then fails.
    h.store.suspend_updates(Duration::from_secs(1));
    h.store.fail(Op::Update);
    assert!(h.controller.toggle_complete(task.id).await.is_err());

    let restored = h.controller.tasks().await;
    assert!(restored[0].is_new, "rollback restores the pre-intent task");
    assert!(!restored[0].completed);
    assert_eq!(h.controller.pending_new_flags(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;
    assert!(!h.controller.tasks().await[0].is_new);
    assert_eq!(h.controller.pending_new_flags(), 0);
}

// ---------------------------------------------------------------------------
// Deleting
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn delete_cancels_new_flag_timer() {
    let h = loaded(FakeStore::new()).await;
    let task = h.controller.add_task("short lived").await.unwrap();
    assert_eq!(h.controller.pending_new_flags(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.controller.delete_task(task.id).await.unwrap());
    assert_eq!(h.controller.pending_new_flags(), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.controller.tasks().await.is_empty());
    assert!(h.store.get(task.id).is_none());
}

#[tokio::test]
async fn failed_delete_reinserts_at_same_position() {
    let store = FakeStore::new();
    store.seed(seeded(&[("a", false), ("b", false), ("c", false)]));
    let h = loaded(store).await;
    let before = h.controller.snapshot().await;
    let middle = before.tasks()[1].id;

    h.store.fail(Op::Delete);
    assert!(h.controller.delete_task(middle).await.is_err());
    assert_eq!(h.controller.snapshot().await, before);
}

#[tokio::test]
async fn delete_all_completed_removes_three_of_five() {
    let store = FakeStore::new();
    store.seed(seeded(&[
        ("a", true),
        ("b", false),
        ("c", true),
        ("d", false),
        ("e", true),
    ]));
    let h = loaded(store).await;

    assert_eq!(h.controller.delete_all_completed().await.unwrap(), 3);
    let left = h.controller.snapshot().await;
    assert_eq!(left.len(), 2);
    assert_eq!(left.completed().count(), 0);
    assert_eq!(h.store.tasks().len(), 2);
}

#[tokio::test]
async fn failed_delete_all_completed_restores_everything() {
    let store = FakeStore::new();
    store.seed(seeded(&[("a", true), ("b", false), ("c", true)]));
    let mut h = loaded(store).await;
    let before = h.controller.snapshot().await;

    h.store.fail(Op::BulkDelete);
    assert!(h.controller.delete_all_completed().await.is_err());
    assert_eq!(h.controller.snapshot().await, before);
    assert_eq!(errors(&h.drain_notices()), 1);
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn estimate_effort_sets_story_points() {
    let store = FakeStore::new();
    store.seed(seeded(&[("Learn recursion", false)]));
    let mut h = loaded(store).await;
    let id = h.controller.tasks().await[0].id;

    h.backend.reply(json!({
        "storyPoints": 3,
        "justification": "Base and recursive cases plus practice problems."
    }));
    let est = h.controller.estimate_effort(id).await.unwrap().unwrap();
    assert_eq!(est.story_points, 3);
    assert_eq!(h.controller.tasks().await[0].story_points, 3);
    assert_eq!(h.store.get(id).unwrap().story_points, 3);

    let requests = h.backend.requests();
    assert_eq!(requests[0].kind, GenerationKind::EstimateEffort);
    assert_eq!(requests[0].input["taskDescription"], "Learn recursion");

    let notices = h.drain_notices();
    assert!(notices.iter().any(|n| n.message.contains("practice problems")));
}

#[tokio::test]
async fn bad_estimate_changes_nothing() {
    let store = FakeStore::new();
    store.seed(seeded(&[("x", false)]));
    let mut h = loaded(store).await;
    let id = h.controller.tasks().await[0].id;
    let before = h.controller.snapshot().await;

    h.backend.reply(json!({"storyPoints": 2.5, "justification": "half"}));
    let err = h.controller.estimate_effort(id).await.unwrap_err();
    assert!(matches!(err, SyncError::Generation(GenerationError::Invalid { .. })));

    h.backend.reply_nothing();
    let err = h.controller.estimate_effort(id).await.unwrap_err();
    assert!(matches!(err, SyncError::Generation(GenerationError::NoOutput { .. })));

    assert_eq!(h.controller.snapshot().await, before);
    assert_eq!(h.store.calls(Op::Update), 0);
    assert_eq!(errors(&h.drain_notices()), 2);
}

#[tokio::test(start_paused = true)]
async fn estimate_for_task_deleted_mid_generation_is_dropped() {
    let store = FakeStore::new();
    store.seed(seeded(&[("Learn recursion", false)]));
    let mut h = loaded(store).await;
    let id = h.controller.tasks().await[0].id;

    h.backend.suspend(Duration::from_secs(1));
    h.backend.reply(json!({"storyPoints": 5, "justification": "Several practice sets."}));
    let estimate = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.estimate_effort(id).await }
    });
    while h.backend.requests().is_empty() {
        tokio::task::yield_now().await;
    }
    assert!(h.controller.delete_task(id).await.unwrap());

    assert!(estimate.await.unwrap().unwrap().is_none());
    assert_eq!(h.store.calls(Op::Update), 0);
    assert!(h.controller.tasks().await.is_empty());
    let notices = h.drain_notices();
    assert!(notices.iter().all(|n| n.title != "Effort estimated"));
    assert_eq!(errors(&notices), 0);
}

#[tokio::test]
async fn suggestion_requires_tasks() {
    let mut h = loaded(FakeStore::new()).await;
    let err = h.controller.suggest_organization().await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(ValidationError::NoTasks)));
    assert!(h.backend.requests().is_empty());
    assert_eq!(h.drain_notices()[0].level, NoticeLevel::Info);
}

#[tokio::test]
async fn suggestion_sends_descriptions_and_leaves_tree() {
    let store = FakeStore::new();
    store.seed(seeded(&[("newest", false), ("oldest", false)]));
    let h = loaded(store).await;
    let before = h.controller.snapshot().await;

    h.backend.reply(json!({"suggestion": "Do the oldest first."}));
    let s = h.controller.suggest_organization().await.unwrap();
    assert_eq!(s, "Do the oldest first.");
    assert_eq!(h.backend.requests()[0].input, json!({"tasks": ["newest", "oldest"]}));
    assert_eq!(h.controller.snapshot().await, before);
}

#[tokio::test]
async fn blank_goal_never_calls_backend() {
    let h = loaded(FakeStore::new()).await;
    let err = h.controller.generate_pathway("  ").await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(ValidationError::BlankLearningGoal)));
    assert!(h.backend.requests().is_empty());
}

fn learn_go_reply() -> serde_json::Value {
    json!({
        "pathwayTitle": "Go Fundamentals",
        "steps": [
            {"taskDescription": "Install Go", "subtasks": ["Download", "Set PATH"]},
            {"taskDescription": "Write hello world"},
            {"taskDescription": "Learn goroutines", "subtasks": ["Channels"]}
        ]
    })
}

#[tokio::test(start_paused = true)]
async fn learn_go_pathway_lands_on_top_in_order() {
    let store = FakeStore::assigning_ids();
    store.seed(seeded(&[("existing", false)]));
    let h = loaded(store).await;

    h.backend.reply(learn_go_reply());
    let pathway = h.controller.generate_pathway("Learn Go").await.unwrap();
    assert_eq!(pathway.steps.len(), 3);
    assert_eq!(h.controller.tasks().await.len(), 1, "generation alone must not add tasks");

    let added = h.controller.add_pathway(&pathway).await.unwrap();
    assert_eq!(added.len(), 3);
    assert_eq!(h.store.calls(Op::BulkCreate), 1);

    let tree = h.controller.snapshot().await;
    let order: Vec<&str> = tree.tasks().iter().map(|t| t.description.as_str()).collect();
    assert_eq!(order, vec!["Install Go", "Write hello world", "Learn goroutines", "existing"]);
    assert!(tree.tasks()[..3].iter().all(|t| t.is_new && !t.completed));
    assert_eq!(tree.tasks()[0].subtasks.len(), 2);
    assert!(tree.tasks()[1].subtasks.is_empty());
    assert!(tree.integrity_violations().is_empty());

    // Stored ids and a newest-first reload agree with the tree.
    for task in &tree.tasks()[..3] {
        assert_eq!(h.store.get(task.id).unwrap().subtasks, task.subtasks);
    }
    h.controller.load().await.unwrap();
    let reloaded: Vec<String> = h
        .controller
        .tasks()
        .await
        .into_iter()
        .map(|t| t.description)
        .collect();
    assert_eq!(reloaded, order);
}

#[tokio::test]
async fn failed_pathway_insert_restores_tree_exactly() {
    let store = FakeStore::new();
    store.seed(seeded(&[("a", false), ("b", true)]));
    let mut h = loaded(store).await;
    let before = h.controller.snapshot().await;

    h.backend.reply(learn_go_reply());
    let pathway = h.controller.generate_pathway("Learn Go").await.unwrap();
    h.drain_notices();

    h.store.fail(Op::BulkCreate);
    let err = h.controller.add_pathway(&pathway).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert_eq!(h.controller.snapshot().await, before);
    assert_eq!(h.store.tasks().len(), 2);
    assert_eq!(errors(&h.drain_notices()), 1);
}

#[tokio::test]
async fn short_pathway_insert_is_rolled_back() {
    let store = FakeStore::assigning_ids();
    store.seed(seeded(&[("a", false)]));
    let mut h = loaded(store).await;
    let before = h.controller.snapshot().await;

    h.backend.reply(learn_go_reply());
    let pathway = h.controller.generate_pathway("Learn Go").await.unwrap();
    h.drain_notices();

    h.store.drop_last_bulk_row();
    let err = h.controller.add_pathway(&pathway).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::Backend(_))));
    assert_eq!(h.controller.snapshot().await, before);
    assert_eq!(h.controller.pending_new_flags(), 0);

    let notices = h.drain_notices();
    assert_eq!(errors(&notices), 1);
    assert!(notices.iter().all(|n| n.title != "Pathway added"));
}

#[tokio::test]
async fn empty_pathway_is_a_no_op() {
    let h = loaded(FakeStore::new()).await;
    h.backend.reply(json!({"pathwayTitle": "Nothing", "steps": []}));
    let pathway = h.controller.generate_pathway("nothing").await.unwrap();
    assert!(h.controller.add_pathway(&pathway).await.unwrap().is_empty());
    assert_eq!(h.store.calls(Op::BulkCreate), 0);
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_load_leaves_empty_tree() {
    let store = FakeStore::new();
    store.seed(seeded(&[("a", false)]));
    store.fail(Op::List);
    let mut h = Harness::new(store);

    assert!(h.controller.load().await.is_err());
    assert!(h.controller.tasks().await.is_empty());
    assert_eq!(errors(&h.drain_notices()), 1);
}

#[tokio::test]
async fn load_is_newest_first() {
    let store = FakeStore::new();
    let mut tasks = seeded(&[("newest", false), ("middle", false), ("oldest", false)]);
    tasks.reverse();
    store.seed(tasks);
    let h = loaded(store).await;
    let order: Vec<String> = h
        .controller
        .tasks()
        .await
        .into_iter()
        .map(|t| t.description)
        .collect();
    assert_eq!(order, vec!["newest", "middle", "oldest"]);
}
