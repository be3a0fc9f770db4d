//! Runs the store contract against a real Postgres.
//!
//! `DATABASE_URL=postgres://… cargo test -- --ignored`

use groups_server::db;
use groups_server::store::{
    ArticleStore, GroupFilter, GroupQuery, GroupStore, Pagination, PgStore, StoreError,
};
use groups_shared::{Article, Group};
use uuid::Uuid;

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::create_pool(&url, 2).await.expect("pool");
    db::apply_schema(&pool).await.expect("schema");
    PgStore::new(pool)
}

fn subtree(id: Uuid) -> GroupQuery {
    GroupQuery {
        filter: GroupFilter {
            ancestor: Some(id),
            ..Default::default()
        },
        pagination: Pagination {
            limit: None,
            skip: 0,
        },
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn add_child_does_not_duplicate() {
    let store = store().await;
    let root = Group::new("pg-root".into(), None, vec![]);
    let child = Group::new("pg-child".into(), Some(root.id), root.path_for_child());
    store.insert_group(&root).await.unwrap();
    store.insert_group(&child).await.unwrap();

    store.add_child(root.id, child.id).await.unwrap();
    store.add_child(root.id, child.id).await.unwrap();

    let stored = store.find_group(root.id).await.unwrap().unwrap();
    assert_eq!(stored.children, vec![child.id]);

    store.remove_child(root.id, child.id).await.unwrap();
    let stored = store.find_group(root.id).await.unwrap().unwrap();
    assert!(stored.children.is_empty());

    assert_eq!(store.delete_descendants(root.id).await.unwrap(), 1);
    assert!(store.delete_group(root.id).await.unwrap());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn rebase_rewrites_the_moved_prefix() {
    let store = store().await;
    let old_root = Group::new("pg-old".into(), None, vec![]);
    let new_root = Group::new("pg-new".into(), None, vec![]);
    let mut moved = Group::new("pg-moved".into(), Some(old_root.id), old_root.path_for_child());
    let leaf = Group::new("pg-leaf".into(), Some(moved.id), moved.path_for_child());
    for group in [&old_root, &new_root, &moved, &leaf] {
        store.insert_group(group).await.unwrap();
    }

    moved.parent = Some(new_root.id);
    moved.ancestors = new_root.path_for_child();
    assert!(store.update_group(&moved).await.unwrap());
    let rebased = store
        .rebase_descendants(moved.id, &moved.ancestors)
        .await
        .unwrap();

    assert_eq!(rebased, 1);
    let leaf = store.find_group(leaf.id).await.unwrap().unwrap();
    assert_eq!(leaf.ancestors, vec![new_root.id, moved.id]);

    let (groups, total) = store.list_groups(&subtree(new_root.id)).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(groups.len(), 2);
    assert_eq!(store.list_groups(&subtree(old_root.id)).await.unwrap().1, 0);

    assert_eq!(store.delete_descendants(new_root.id).await.unwrap(), 2);
    assert!(store.delete_group(new_root.id).await.unwrap());
    assert!(store.delete_group(old_root.id).await.unwrap());
    assert!(store.find_group(moved.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn duplicate_slug_is_reported() {
    let store = store().await;
    let slug = format!("pg-{}", Uuid::new_v4());
    let first = Article::new(slug.clone(), "First".into(), None);
    let second = Article::new(slug.clone(), "Second".into(), None);
    store.insert_article(&first).await.unwrap();

    let err = store.insert_article(&second).await.unwrap_err();

    assert!(matches!(err, StoreError::Duplicate { field: "slug", .. }));
    assert!(store.delete_article(first.id).await.unwrap());
}
