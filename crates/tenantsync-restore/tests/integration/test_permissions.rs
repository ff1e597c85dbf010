//! Permission and link-share restore

use std::sync::Arc;

use tenantsync_core::config::RestoreConfig;
use tenantsync_core::domain::CollisionPolicy;
use tenantsync_core::fault::FailurePolicy;
use tenantsync_core::ports::{PermissionGrant, Recipient};
use tenantsync_restore::{RestoreCaches, RestoreCollection, StoredItem};

use crate::common::*;

const READ_P1: &str = r#"{"id":"p1","roles":["read"],"entityId":"u1"}"#;
const LINK_L1: &str =
    r#"{"id":"l1","link":{"scope":"users","type":"edit","webUrl":"https://share/l1"},"entities":[{"id":"e1"}]}"#;

fn with_permissions() -> RestoreConfig {
    let mut cfg = config(CollisionPolicy::Skip);
    cfg.include_permissions = true;
    cfg
}

/// A v6 collection with folder metadata `dirmeta` and one file per
/// `(id, metadata)`
fn collection(rel: &str, dirmeta: &str, files: &[(&str, String)]) -> RestoreCollection {
    let mut items = vec![StoredItem::new(".dirmeta", dirmeta)];
    for (id, meta) in files {
        items.push(StoredItem::new(format!("{id}.data"), "content"));
        items.push(StoredItem::new(format!("{id}.meta"), meta.as_bytes()));
    }
    RestoreCollection::new(drive_folder("d1", rel), items)
}

fn file_meta(name: &str, sharing: &str) -> String {
    format!(r#"{{"fileName":"{name}",{sharing}}}"#)
}

async fn populated(target: &Arc<FakeTarget>) -> Arc<RestoreCaches> {
    let caches = Arc::new(RestoreCaches::new());
    caches.populate(target.as_ref(), OWNER).await.unwrap();
    caches
}

fn child_id(target: &FakeTarget, parent_id: &str, name: &str) -> String {
    target
        .children(parent_id)
        .into_iter()
        .find(|c| c.name == name)
        .unwrap()
        .id
}

#[tokio::test]
async fn test_items_sharing_a_removed_permission_use_the_remapped_id() {
    let target = FakeTarget::new().with_drive("d1", "Documents");
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, with_permissions());
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let team = collection(
        "team",
        &format!(r#"{{"permissions":[{READ_P1}]}}"#),
        &[
            ("1", file_meta("a.txt", r#""permissions":[]"#)),
            ("2", file_meta("b.txt", r#""permissions":[]"#)),
        ],
    );
    let metrics = restorer.restore_collection(&ctx, &team).await.unwrap();
    assert_eq!(metrics.successes, 2);

    let folder_id = child_id(&target, "d1-root", "team");
    assert_eq!(
        target.permission_posts(),
        vec![(
            folder_id.clone(),
            PermissionGrant {
                roles: vec!["read".into()],
                recipient: Recipient::ObjectId("u1".into()),
                expiration: None,
            }
        )]
    );

    let new_id = caches.permission_id("p1").unwrap();
    assert_ne!(new_id, "p1");

    let mut deletes = target.permission_deletes();
    deletes.sort();
    let mut expected = vec![
        (child_id(&target, &folder_id, "a.txt"), new_id.clone()),
        (child_id(&target, &folder_id, "b.txt"), new_id),
    ];
    expected.sort();
    assert_eq!(deletes, expected);
    assert!(ctx.bus.recovered().is_empty());
}

#[tokio::test]
async fn test_subfolder_drops_parent_permission_by_remapped_id() {
    let target = FakeTarget::new().with_drive("d1", "Documents");
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, with_permissions());
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let team = collection("team", &format!(r#"{{"permissions":[{READ_P1}]}}"#), &[]);
    let sub = collection(
        "team/sub",
        r#"{"permissions":[]}"#,
        &[("1", file_meta("c.txt", r#""sharingMode":"inherited""#))],
    );
    restorer.restore_collection(&ctx, &team).await.unwrap();
    restorer.restore_collection(&ctx, &sub).await.unwrap();

    let team_id = child_id(&target, "d1-root", "team");
    let sub_id = child_id(&target, &team_id, "sub");
    assert_eq!(
        target.permission_deletes(),
        vec![(sub_id, caches.permission_id("p1").unwrap())]
    );
    // the inherited file made no sharing calls of its own
    assert_eq!(target.permission_posts().len(), 1);
}

#[tokio::test]
async fn test_owner_and_site_group_grants_are_not_posted() {
    let target = FakeTarget::new().with_drive("d1", "Documents");
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, with_permissions());
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let perms = r#""permissions":[
        {"id":"o","roles":["owner"],"entityId":"u1"},
        {"id":"m","roles":["owner","write"],"entityId":"u2"},
        {"id":"s","roles":["read"],"entityId":"4","entityType":"siteGroup"},
        {"id":"e","roles":["read"],"email":"old@example.com"}
    ]"#;
    let root = collection("", "{}", &[("1", file_meta("a.txt", perms))]);
    restorer.restore_collection(&ctx, &root).await.unwrap();

    let grants: Vec<_> = target
        .permission_posts()
        .into_iter()
        .map(|(_, g)| (g.roles, g.recipient))
        .collect();
    assert_eq!(
        grants,
        vec![
            (vec!["write".to_string()], Recipient::ObjectId("u2".into())),
            (vec!["read".to_string()], Recipient::Email("old@example.com".into())),
        ]
    );
    assert!(caches.permission_id("o").is_none());
    assert!(caches.permission_id("m").is_some());
}

#[tokio::test]
async fn test_inherited_items_make_no_sharing_calls() {
    let target = FakeTarget::new().with_drive("d1", "Documents");
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, with_permissions());
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let meta = file_meta(
        "a.txt",
        &format!(r#""sharingMode":"inherited","permissions":[{READ_P1}]"#),
    );
    let root = collection("", "{}", &[("1", meta)]);
    restorer.restore_collection(&ctx, &root).await.unwrap();

    assert!(target.permission_posts().is_empty());
    assert!(target.link_posts().is_empty());
}

#[tokio::test]
async fn test_permissions_are_ignored_unless_included() {
    let target = FakeTarget::new().with_drive("d1", "Documents");
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, config(CollisionPolicy::Skip));
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let team = collection(
        "team",
        &format!(r#"{{"permissions":[{READ_P1}]}}"#),
        &[("1", file_meta("a.txt", &format!(r#""permissions":[{READ_P1}]"#)))],
    );
    restorer.restore_collection(&ctx, &team).await.unwrap();

    assert!(target.permission_posts().is_empty());
    assert!(caches.permission_id("p1").is_none());
}

#[tokio::test]
async fn test_unresolved_recipient_is_skipped() {
    let target = FakeTarget::new()
        .with_drive("d1", "Documents")
        .with_unresolved_recipient("ghost");
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, with_permissions());
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let perms = r#""permissions":[{"id":"g","roles":["read"],"entityId":"ghost"}]"#;
    let root = collection("", "{}", &[("1", file_meta("a.txt", perms))]);
    let metrics = restorer.restore_collection(&ctx, &root).await.unwrap();

    assert_eq!(metrics.successes, 1);
    assert_eq!(target.permission_posts().len(), 1);
    assert!(caches.permission_id("g").is_none());
    assert!(ctx.bus.recovered().is_empty());
}

#[tokio::test]
async fn test_failed_grant_is_recoverable() {
    let target = FakeTarget::new()
        .with_drive("d1", "Documents")
        .with_failing_permissions();
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, with_permissions());
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let root = collection(
        "",
        "{}",
        &[("1", file_meta("a.txt", &format!(r#""permissions":[{READ_P1}]"#)))],
    );
    let metrics = restorer.restore_collection(&ctx, &root).await.unwrap();

    assert_eq!(metrics.successes, 1);
    assert_eq!(ctx.bus.recovered_with_label("restore_permission").len(), 1);
    assert!(ctx.bus.finalize().is_some());
}

#[tokio::test]
async fn test_removing_a_permission_that_was_never_restored_fails_the_item() {
    let target = FakeTarget::new()
        .with_drive("d1", "Documents")
        .with_unresolved_recipient("ghost");
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, with_permissions());
    let ctx = context(FailurePolicy::BestEffort);

    let team = collection(
        "team",
        r#"{"permissions":[{"id":"g","roles":["read"],"entityId":"ghost"}]}"#,
        &[("1", file_meta("a.txt", r#""permissions":[]"#))],
    );
    let metrics = restorer.restore_collection(&ctx, &team).await.unwrap();

    assert_eq!(metrics.successes, 0);
    assert!(target.permission_deletes().is_empty());
    let failed = ctx.bus.recovered_with_label("restore_item");
    assert_eq!(failed.len(), 1);
    assert!(failed[0].to_string().contains("no restored permission for g"));
}

#[tokio::test]
async fn test_link_shares_are_restored_and_remapped() {
    let target = FakeTarget::new().with_drive("d1", "Documents");
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, with_permissions());
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let protected = r#"{"id":"l2","link":{"scope":"anonymous","type":"view","webUrl":"https://share/l2"},"entities":[{"id":"e2"}],"hasPassword":true}"#;
    let meta = file_meta("a.txt", &format!(r#""linkShares":[{LINK_L1},{protected}]"#));
    let root = collection("", "{}", &[("1", meta)]);
    restorer.restore_collection(&ctx, &root).await.unwrap();

    let links = target.link_posts();
    assert_eq!(links.len(), 1);
    let (_, link) = &links[0];
    assert_eq!(link.link_type, "edit");
    assert_eq!(link.scope, "users");
    assert_eq!(link.recipients, vec!["e1".to_string()]);
    assert_eq!(link.retain_inherited, Some(true));

    assert!(caches.link_share_id("l1").is_some());
    assert!(caches.link_share_id("l2").is_none());
}

#[tokio::test]
async fn test_dropping_an_inherited_link_resets_sharing() {
    let target = FakeTarget::new().with_drive("d1", "Documents");
    let caches = populated(&target).await;
    let restorer = restorer(&target, &caches, with_permissions());
    let ctx = context(FailurePolicy::FailAfterRecovery);

    let team = collection(
        "team",
        &format!(r#"{{"permissions":[{READ_P1}],"linkShares":[{LINK_L1}]}}"#),
        &[(
            "1",
            file_meta("a.txt", &format!(r#""permissions":[{READ_P1}],"linkShares":[]"#)),
        )],
    );
    restorer.restore_collection(&ctx, &team).await.unwrap();

    let folder_id = child_id(&target, "d1-root", "team");
    let file_id = child_id(&target, &folder_id, "a.txt");

    let file_links: Vec<_> = target
        .link_posts()
        .into_iter()
        .filter(|(item, _)| *item == file_id)
        .map(|(_, link)| link)
        .collect();
    assert_eq!(file_links.len(), 1);
    assert_eq!(file_links[0].scope, "users");
    assert!(file_links[0].recipients.is_empty());
    assert_eq!(file_links[0].retain_inherited, Some(false));

    // the throwaway link is deleted again, the inherited grant is not
    let deletes = target.permission_deletes();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].0, file_id);
    assert!(deletes[0].1.starts_with("link-"));

    // the reset dropped the inherited grant, so it is granted again
    let file_grants: Vec<_> = target
        .permission_posts()
        .into_iter()
        .filter(|(item, _)| *item == file_id)
        .collect();
    assert_eq!(file_grants.len(), 1);
    assert!(ctx.bus.recovered().is_empty());
}
