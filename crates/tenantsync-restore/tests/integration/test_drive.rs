//! Restore cache population and destination drive materialization

use std::sync::Arc;

use tenantsync_core::count::CounterKey;
use tenantsync_core::domain::{CollisionPolicy, DrivePath};
use tenantsync_core::fault::FailurePolicy;
use tenantsync_restore::{RestoreCaches, RestoreError};

use crate::common::*;

fn drive_path(drive_id: &str) -> DrivePath {
    DrivePath::from_path(&drive_folder(drive_id, "folder")).unwrap()
}

#[tokio::test]
async fn test_populate_empty_owner() {
    let target = FakeTarget::new();
    let caches = RestoreCaches::new();

    caches.populate(target.as_ref(), OWNER).await.unwrap();

    assert!(caches.drive_by_id("d1").is_none());
    assert_eq!(target.calls(), vec![Call::ListDrives]);
}

#[tokio::test]
async fn test_populate_caches_drives_with_roots() {
    let target = FakeTarget::new()
        .with_drive("d1", "Documents")
        .with_drive("d2", "Archive");
    let caches = RestoreCaches::new();

    caches.populate(target.as_ref(), OWNER).await.unwrap();

    let d1 = caches.drive_by_id("d1").unwrap();
    assert_eq!(d1.name, "Documents");
    assert_eq!(d1.root_folder_id, "d1-root");
    assert_eq!(caches.drive_by_name("Archive").unwrap().id, "d2");
}

#[tokio::test]
async fn test_populate_fails_on_drive_listing_error() {
    let target = FakeTarget::new().with_failing_list();
    let caches = RestoreCaches::new();

    let err = caches.populate(target.as_ref(), OWNER).await.unwrap_err();
    assert!(matches!(err, RestoreError::Remote { .. }));
}

#[tokio::test]
async fn test_existing_drive_id_is_reused() {
    let target = FakeTarget::new().with_drive("d1", "Documents");
    let caches = Arc::new(RestoreCaches::new());
    caches.populate(target.as_ref(), OWNER).await.unwrap();

    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let drive = restorer
        .ensure_drive_exists(&ctx, &drive_path("d1"), OWNER, "Fallback")
        .await
        .unwrap();

    assert_eq!(drive.id, "d1");
    assert!(target.post_drives().is_empty());
}

#[tokio::test]
async fn test_drive_with_backed_up_name_is_adopted() {
    let target = FakeTarget::new().with_drive("d-new", "Documents");
    let caches = Arc::new(RestoreCaches::with_backup_drive_names([("d-old", "Documents")]));
    caches.populate(target.as_ref(), OWNER).await.unwrap();

    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let drive = restorer
        .ensure_drive_exists(&ctx, &drive_path("d-old"), OWNER, "Fallback")
        .await
        .unwrap();

    assert_eq!(drive.id, "d-new");
    assert!(target.post_drives().is_empty());
    assert_eq!(ctx.counter.get(CounterKey::NewDriveCreated), 0);
}

#[tokio::test]
async fn test_missing_drive_is_recreated_with_backed_up_name() {
    let target = FakeTarget::new();
    let caches = Arc::new(RestoreCaches::with_backup_drive_names([("d-old", "Archive")]));
    caches.populate(target.as_ref(), OWNER).await.unwrap();

    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let drive = restorer
        .ensure_drive_exists(&ctx, &drive_path("d-old"), OWNER, "Fallback")
        .await
        .unwrap();

    assert_eq!(drive.name, "Archive");
    assert_eq!(target.post_drives(), vec!["Archive"]);
    assert_eq!(caches.drive_by_id(&drive.id).unwrap().name, "Archive");
    assert_eq!(caches.drive_by_name("Archive").unwrap().id, drive.id);
    assert_eq!(drive.root_folder_id, format!("{}-root", drive.id));
    assert_eq!(ctx.counter.get(CounterKey::NewDriveCreated), 1);
}

#[tokio::test]
async fn test_unknown_drive_uses_fallback_name() {
    let target = FakeTarget::new();
    let caches = Arc::new(RestoreCaches::new());

    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let drive = restorer
        .ensure_drive_exists(&ctx, &drive_path("d-old"), OWNER, "Fallback")
        .await
        .unwrap();

    assert_eq!(drive.name, "Fallback");
}

#[tokio::test]
async fn test_name_conflicts_retry_with_numeric_suffix() {
    let target = FakeTarget::new()
        .with_reserved_drive_name("Archive")
        .with_reserved_drive_name("Archive 1");
    let caches = Arc::new(RestoreCaches::with_backup_drive_names([("d-old", "Archive")]));

    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let drive = restorer
        .ensure_drive_exists(&ctx, &drive_path("d-old"), OWNER, "Fallback")
        .await
        .unwrap();

    assert_eq!(target.post_drives(), vec!["Archive", "Archive 1", "Archive 2"]);
    assert_eq!(drive.name, "Archive 2");
    assert_eq!(caches.drive_by_name("Archive 2").unwrap().id, drive.id);
}

#[tokio::test]
async fn test_other_creation_errors_are_fatal() {
    let target = FakeTarget::new().with_failing_post_drive();
    let caches = Arc::new(RestoreCaches::new());

    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let err = restorer
        .ensure_drive_exists(&ctx, &drive_path("d-old"), OWNER, "Fallback")
        .await
        .unwrap_err();

    assert!(matches!(err, RestoreError::Remote { .. }));
    assert_eq!(target.post_drives().len(), 1);
}

#[tokio::test]
async fn test_configured_drive_takes_precedence() {
    let target = FakeTarget::new()
        .with_drive("d1", "Documents")
        .with_drive("d2", "Target");
    let caches = Arc::new(RestoreCaches::new());
    caches.populate(target.as_ref(), OWNER).await.unwrap();

    let mut cfg = config(CollisionPolicy::Skip);
    cfg.drive = "Target".into();
    let restorer = restorer(&target, &caches, cfg);
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let drive = restorer
        .ensure_drive_exists(&ctx, &drive_path("d1"), OWNER, "Target")
        .await
        .unwrap();

    assert_eq!(drive.id, "d2");
    assert!(target.post_drives().is_empty());
}
