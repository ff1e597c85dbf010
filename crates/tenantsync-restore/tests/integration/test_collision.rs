//! Collision resolution when restoring single files

use std::sync::Arc;

use tenantsync_core::count::CounterKey;
use tenantsync_core::domain::CollisionPolicy;
use tenantsync_core::fault::FailurePolicy;
use tenantsync_restore::{ItemOutcome, RestoreCaches};

use crate::common::*;

const ROOT: &str = "d1-root";

/// A drive `d1` whose root already holds `existing`, indexed in the caches
async fn setup(existing: &[(&str, bool)]) -> (Arc<FakeTarget>, Arc<RestoreCaches>, Vec<String>) {
    let target = FakeTarget::new().with_drive("d1", "Documents");
    let ids = existing
        .iter()
        .map(|(name, is_folder)| target.seed(ROOT, name, *is_folder))
        .collect();

    let caches = Arc::new(RestoreCaches::new());
    caches.populate(target.as_ref(), OWNER).await.unwrap();
    caches
        .populate_collision_keys(target.as_ref(), "d1", ROOT)
        .await
        .unwrap();

    (target, caches, ids)
}

#[tokio::test]
async fn test_no_collision_creates_item() {
    let (target, caches, _) = setup(&[]).await;
    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let outcome = restorer
        .restore_file(&ctx, "d1", ROOT, "notes.txt", b"hi")
        .await
        .unwrap();

    assert!(matches!(outcome, ItemOutcome::Restored(ref info) if info.name == "notes.txt"));
    assert_eq!(
        target.posts(),
        vec![("notes.txt".to_string(), false, CollisionPolicy::Copy)]
    );
    assert!(target.deletes().is_empty());
    assert_eq!(ctx.counter.get(CounterKey::NewItemCreated), 1);
}

#[tokio::test]
async fn test_skip_never_creates_or_deletes() {
    let (target, caches, _) = setup(&[("report.docx", false)]).await;
    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let outcome = restorer
        .restore_file(&ctx, "d1", ROOT, "report.docx", b"new")
        .await
        .unwrap();

    assert_eq!(outcome, ItemOutcome::Skipped);
    assert!(target.posts().is_empty());
    assert!(target.deletes().is_empty());
    assert_eq!(ctx.counter.get(CounterKey::CollisionSkip), 1);
    assert_eq!(ctx.counter.get(CounterKey::NewItemCreated), 0);
}

#[tokio::test]
async fn test_collision_keys_ignore_case() {
    let (target, caches, _) = setup(&[("Report.DOCX", false)]).await;
    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let outcome = restorer
        .restore_file(&ctx, "d1", ROOT, "report.docx", b"new")
        .await
        .unwrap();

    assert_eq!(outcome, ItemOutcome::Skipped);
    assert!(target.posts().is_empty());
}

#[tokio::test]
async fn test_replace_deletes_once_then_creates_once() {
    let (target, caches, ids) = setup(&[("report.docx", false)]).await;
    let restorer = restorer(&target, &caches, config(CollisionPolicy::Replace));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let outcome = restorer
        .restore_file(&ctx, "d1", ROOT, "report.docx", b"new")
        .await
        .unwrap();

    let ItemOutcome::Restored(created) = outcome else {
        panic!("expected a restored item");
    };

    assert_eq!(target.deletes(), vec![ids[0].clone()]);
    assert_eq!(
        target.posts(),
        vec![("report.docx".to_string(), false, CollisionPolicy::Copy)]
    );
    assert_eq!(created.name, "report.docx");
    assert_eq!(target.content(&created.id), Some(b"new".to_vec()));
    assert_eq!(target.children(ROOT).len(), 1);
    assert_eq!(ctx.counter.get(CounterKey::CollisionReplace), 1);
    assert_eq!(ctx.counter.get(CounterKey::NewItemCreated), 0);
}

#[tokio::test]
async fn test_replace_tolerates_already_deleted_item() {
    let (target, caches, ids) = setup(&[("report.docx", false)]).await;
    target.vanish(&ids[0]);

    let restorer = restorer(&target, &caches, config(CollisionPolicy::Replace));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let outcome = restorer
        .restore_file(&ctx, "d1", ROOT, "report.docx", b"new")
        .await
        .unwrap();

    assert!(matches!(outcome, ItemOutcome::Restored(_)));
    assert_eq!(target.deletes().len(), 1);
    assert_eq!(target.posts().len(), 1);
    assert_eq!(ctx.counter.get(CounterKey::CollisionReplace), 1);
    assert!(ctx.bus.recovered().is_empty());
}

#[tokio::test]
async fn test_copy_creates_once_and_never_deletes() {
    let (target, caches, _) = setup(&[("report.docx", false)]).await;
    let restorer = restorer(&target, &caches, config(CollisionPolicy::Copy));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    restorer
        .restore_file(&ctx, "d1", ROOT, "report.docx", b"new")
        .await
        .unwrap();

    assert!(target.deletes().is_empty());
    assert_eq!(target.posts().len(), 1);

    let names: Vec<_> = target.children(ROOT).into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["report.docx", "report.docx 1"]);
    assert_eq!(ctx.counter.get(CounterKey::NewItemCreated), 1);
}

#[tokio::test]
async fn test_replace_leaves_colliding_folder_alone() {
    let (target, caches, _) = setup(&[("archive", true)]).await;
    let restorer = restorer(&target, &caches, config(CollisionPolicy::Replace));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    restorer
        .restore_file(&ctx, "d1", ROOT, "archive", b"file")
        .await
        .unwrap();

    assert!(target.deletes().is_empty());
    let names: Vec<_> = target.children(ROOT).into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["archive", "archive 1"]);
    assert_eq!(ctx.counter.get(CounterKey::NewItemCreated), 1);
    assert_eq!(ctx.counter.get(CounterKey::CollisionReplace), 0);
}

#[tokio::test]
async fn test_created_items_join_the_collision_index() {
    let (target, caches, _) = setup(&[]).await;
    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let first = restorer
        .restore_file(&ctx, "d1", ROOT, "a.txt", b"1")
        .await
        .unwrap();
    let second = restorer
        .restore_file(&ctx, "d1", ROOT, "a.txt", b"2")
        .await
        .unwrap();

    assert!(matches!(first, ItemOutcome::Restored(_)));
    assert_eq!(second, ItemOutcome::Skipped);
    assert_eq!(target.posts().len(), 1);
}
