//! Group hierarchy maintenance.
//!
//! `parent` is authoritative. `children` and `ancestors` are caches kept in
//! step with it by the three mutating operations below:
//!
//! - a group's `ancestors` is its parent's `ancestors` followed by the parent
//!   id, or empty for a root;
//! - a group's id is in its parent's `children`, and nowhere else;
//! - removing a group removes every group that lists it as an ancestor.
//!
//! The store only offers per-document writes, so each operation is a fixed
//! sequence of them. Mutations are serialized through one async lock so two
//! requests from this process never interleave their steps. A failure part way
//! through leaves the earlier writes in place and is logged.

use std::sync::Arc;

use chrono::Utc;
use groups_shared::api::{CreateGroupRequest, UpdateGroupRequest};
use groups_shared::Group;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::GroupError;
use crate::store::{GroupQuery, GroupStore, StoreResult};
use crate::validation::{required, ValidationErrors};

#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn GroupStore>,
    writes: Arc<Mutex<()>>,
}

fn validate_name(name: &str) -> Result<String, ValidationErrors> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationErrors::single(
            Group::MODEL_NAME,
            required("name"),
        ));
    }
    Ok(name.to_string())
}

// For writes after the first one of an operation.
fn partial<T>(result: StoreResult<T>, operation: &'static str, id: Uuid) -> Result<T, GroupError> {
    result.map_err(|err| {
        tracing::error!(
            group_id = %id,
            operation,
            error = ?err,
            "Group {} failed part way, earlier writes were kept",
            operation
        );
        GroupError::Store(err)
    })
}

impl GroupService {
    pub fn new(store: Arc<dyn GroupStore>) -> Self {
        Self {
            store,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Group, GroupError> {
        self.store
            .find_group(id)
            .await?
            .ok_or(GroupError::NotFound(id))
    }

    pub async fn list(&self, query: &GroupQuery) -> Result<(Vec<Group>, u64), GroupError> {
        Ok(self.store.list_groups(query).await?)
    }

    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Group>, GroupError> {
        Ok(self.store.find_groups(ids).await?)
    }

    pub async fn create(&self, req: CreateGroupRequest) -> Result<Group, GroupError> {
        let name = validate_name(&req.name)?;

        let _guard = self.writes.lock().await;
        let ancestors = self.ancestors_under(None, req.parent).await?;
        let group = Group::new(name, req.parent, ancestors);

        self.store.insert_group(&group).await?;
        if let Some(parent) = group.parent {
            partial(self.store.add_child(parent, group.id).await, "create", group.id)?;
        }

        tracing::info!(group_id = %group.id, parent = ?group.parent, "Created group");
        Ok(group)
    }

    pub async fn update(&self, id: Uuid, req: UpdateGroupRequest) -> Result<Group, GroupError> {
        let name = req.name.as_deref().map(validate_name).transpose()?;

        let _guard = self.writes.lock().await;
        let mut group = self.get(id).await?;
        let old_parent = group.parent;
        let old_ancestors = group.ancestors.clone();

        let new_parent = req.parent.unwrap_or(old_parent);
        let ancestors = self.ancestors_under(Some(id), new_parent).await?;

        if let Some(name) = name {
            group.name = name;
        }
        group.parent = new_parent;
        group.ancestors = ancestors;
        group.updated_at = Utc::now();

        if !self.store.update_group(&group).await? {
            return Err(GroupError::NotFound(id));
        }

        if new_parent != old_parent {
            if let Some(old_parent) = old_parent {
                partial(self.store.remove_child(old_parent, id).await, "update", id)?;
            }
            if let Some(new_parent) = new_parent {
                partial(self.store.add_child(new_parent, id).await, "update", id)?;
            }
        }

        if group.ancestors != old_ancestors {
            let rebased = partial(
                self.store.rebase_descendants(id, &group.ancestors).await,
                "update",
                id,
            )?;
            tracing::debug!(group_id = %id, rebased, "Rewrote descendant ancestors");
        }

        tracing::info!(
            group_id = %id,
            from = ?old_parent,
            to = ?new_parent,
            "Updated group"
        );
        Ok(group)
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), GroupError> {
        let _guard = self.writes.lock().await;
        let group = self.get(id).await?;

        if let Some(parent) = group.parent {
            self.store.remove_child(parent, id).await?;
        }
        let descendants = partial(self.store.delete_descendants(id).await, "remove", id)?;
        partial(self.store.delete_group(id).await, "remove", id)?;

        tracing::info!(group_id = %id, descendants, "Removed group");
        Ok(())
    }

    /// Validates `parent` as the parent of `id` (`None` for a group not yet
    /// created) and returns the `ancestors` the group must carry under it.
    async fn ancestors_under(
        &self,
        id: Option<Uuid>,
        parent: Option<Uuid>,
    ) -> Result<Vec<Uuid>, GroupError> {
        let Some(parent_id) = parent else {
            return Ok(Vec::new());
        };
        if id == Some(parent_id) {
            return Err(GroupError::SelfParent);
        }

        let parent = self
            .store
            .find_group(parent_id)
            .await?
            .ok_or(GroupError::ParentNotFound(parent_id))?;

        if let Some(id) = id {
            if parent.ancestors.contains(&id) {
                return Err(GroupError::Cycle {
                    id,
                    parent: parent_id,
                });
            }
        }

        Ok(parent.path_for_child())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::store::{ListQuery, MemoryStore, Pagination, StoreError};

    fn service() -> GroupService {
        GroupService::new(Arc::new(MemoryStore::new()))
    }

    async fn create(service: &GroupService, name: &str, parent: Option<Uuid>) -> Group {
        service
            .create(CreateGroupRequest {
                name: name.to_string(),
                parent,
            })
            .await
            .unwrap()
    }

    async fn reparent(service: &GroupService, id: Uuid, parent: Option<Uuid>) -> Result<Group, GroupError> {
        service
            .update(
                id,
                UpdateGroupRequest {
                    name: None,
                    parent: Some(parent),
                },
            )
            .await
    }

    #[tokio::test]
    async fn ancestors_follow_the_path_from_the_root() {
        let service = service();
        let root = create(&service, "root", None).await;
        let child = create(&service, "child", Some(root.id)).await;
        let grandchild = create(&service, "grandchild", Some(child.id)).await;

        assert!(root.ancestors.is_empty());
        assert_eq!(child.ancestors, vec![root.id]);
        assert_eq!(grandchild.ancestors, vec![root.id, child.id]);
    }

    #[tokio::test]
    async fn create_registers_child_with_parent() {
        let service = service();
        let parent = create(&service, "parent", None).await;
        let child = create(&service, "child", Some(parent.id)).await;

        let parent = service.get(parent.id).await.unwrap();
        assert_eq!(parent.children, vec![child.id]);
        assert!(child.children.is_empty());
    }

    #[tokio::test]
    async fn create_trims_and_requires_name() {
        let service = service();
        let group = create(&service, "  spaced  ", None).await;
        assert_eq!(group.name, "spaced");

        let err = service
            .create(CreateGroupRequest {
                name: "   ".into(),
                parent: None,
            })
            .await
            .unwrap_err();
        match err {
            GroupError::Validation(errors) => assert_eq!(errors.errors()[0].path, "name"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_parent() {
        let service = service();
        let missing = Uuid::new_v4();

        let err = service
            .create(CreateGroupRequest {
                name: "orphan".into(),
                parent: Some(missing),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GroupError::ParentNotFound(id) if id == missing));
        let (groups, total) = service.list(&ListQuery::default()).await.unwrap();
        assert!(groups.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn update_rejects_self_parent() {
        let service = service();
        let group = create(&service, "group", None).await;

        let err = reparent(&service, group.id, Some(group.id)).await.unwrap_err();

        assert!(matches!(err, GroupError::SelfParent));
        assert_eq!(service.get(group.id).await.unwrap().parent, None);
    }

    #[tokio::test]
    async fn update_rejects_unknown_parent() {
        let service = service();
        let group = create(&service, "group", None).await;

        let err = reparent(&service, group.id, Some(Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(matches!(err, GroupError::ParentNotFound(_)));
    }

    #[tokio::test]
    async fn update_rejects_moving_under_own_descendant() {
        let service = service();
        let a = create(&service, "a", None).await;
        let b = create(&service, "b", Some(a.id)).await;
        let c = create(&service, "c", Some(b.id)).await;

        let err = reparent(&service, a.id, Some(c.id)).await.unwrap_err();

        assert!(matches!(err, GroupError::Cycle { id, parent } if id == a.id && parent == c.id));
        let a = service.get(a.id).await.unwrap();
        assert_eq!(a.parent, None);
        assert_eq!(a.children, vec![b.id]);
    }

    #[tokio::test]
    async fn reparent_moves_child_between_parents() {
        let service = service();
        let p1 = create(&service, "p1", None).await;
        let p2 = create(&service, "p2", None).await;
        let child = create(&service, "child", Some(p1.id)).await;

        let moved = reparent(&service, child.id, Some(p2.id)).await.unwrap();

        assert_eq!(moved.parent, Some(p2.id));
        assert_eq!(moved.ancestors, vec![p2.id]);
        assert!(service.get(p1.id).await.unwrap().children.is_empty());
        assert_eq!(service.get(p2.id).await.unwrap().children, vec![child.id]);
    }

    #[tokio::test]
    async fn reparent_rewrites_descendant_ancestors() {
        let service = service();
        let a = create(&service, "a", None).await;
        let b = create(&service, "b", Some(a.id)).await;
        let c = create(&service, "c", Some(b.id)).await;
        let d = create(&service, "d", Some(c.id)).await;
        let r2 = create(&service, "r2", None).await;

        reparent(&service, b.id, Some(r2.id)).await.unwrap();

        assert_eq!(service.get(b.id).await.unwrap().ancestors, vec![r2.id]);
        assert_eq!(service.get(c.id).await.unwrap().ancestors, vec![r2.id, b.id]);
        assert_eq!(
            service.get(d.id).await.unwrap().ancestors,
            vec![r2.id, b.id, c.id]
        );
    }

    #[tokio::test]
    async fn moving_to_root_clears_ancestors() {
        let service = service();
        let a = create(&service, "a", None).await;
        let b = create(&service, "b", Some(a.id)).await;
        let c = create(&service, "c", Some(b.id)).await;

        let b = reparent(&service, b.id, None).await.unwrap();

        assert_eq!(b.parent, None);
        assert!(b.ancestors.is_empty());
        assert!(service.get(a.id).await.unwrap().children.is_empty());
        assert_eq!(service.get(c.id).await.unwrap().ancestors, vec![b.id]);
    }

    #[tokio::test]
    async fn rename_keeps_position() {
        let service = service();
        let parent = create(&service, "parent", None).await;
        let child = create(&service, "child", Some(parent.id)).await;

        let renamed = service
            .update(
                child.id,
                UpdateGroupRequest {
                    name: Some(" renamed ".into()),
                    parent: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(renamed.name, "renamed");
        assert_eq!(renamed.parent, Some(parent.id));
        assert_eq!(renamed.ancestors, vec![parent.id]);
        assert_eq!(service.get(parent.id).await.unwrap().children, vec![child.id]);
    }

    #[tokio::test]
    async fn update_missing_group_is_not_found() {
        let service = service();
        let err = service
            .update(Uuid::new_v4(), UpdateGroupRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GroupError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_cascades_to_subtree() {
        let service = service();
        let p = create(&service, "p", None).await;
        let c1 = create(&service, "c1", Some(p.id)).await;
        let c2 = create(&service, "c2", Some(c1.id)).await;
        let other = create(&service, "other", None).await;

        service.remove(p.id).await.unwrap();

        for id in [p.id, c1.id, c2.id] {
            assert!(matches!(service.get(id).await, Err(GroupError::NotFound(_))));
        }
        assert!(service.get(other.id).await.is_ok());
    }

    #[tokio::test]
    async fn remove_detaches_from_parent() {
        let service = service();
        let p = create(&service, "p", None).await;
        let keep = create(&service, "keep", Some(p.id)).await;
        let gone = create(&service, "gone", Some(p.id)).await;

        service.remove(gone.id).await.unwrap();

        assert_eq!(service.get(p.id).await.unwrap().children, vec![keep.id]);
    }

    #[tokio::test]
    async fn remove_missing_group_is_not_found() {
        let err = service().remove(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, GroupError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_pages_but_counts_everything() {
        let service = service();
        for name in ["a", "b", "c"] {
            create(&service, name, None).await;
        }

        let query = GroupQuery {
            pagination: Pagination {
                limit: Some(1),
                skip: 0,
            },
            ..ListQuery::default()
        };
        let (groups, total) = service.list(&query).await.unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(total, 3);
    }

    async fn assert_forest_consistent(service: &GroupService) {
        let query = GroupQuery {
            pagination: Pagination {
                limit: None,
                skip: 0,
            },
            ..ListQuery::default()
        };
        let (groups, _) = service.list(&query).await.unwrap();
        let by_id: std::collections::HashMap<Uuid, &Group> =
            groups.iter().map(|group| (group.id, group)).collect();

        for group in &groups {
            match group.parent {
                Some(parent_id) => {
                    let parent = by_id[&parent_id];
                    assert_eq!(group.ancestors, parent.path_for_child(), "{}", group.name);
                    assert_eq!(
                        parent.children.iter().filter(|id| **id == group.id).count(),
                        1,
                        "{} listed once under {}",
                        group.name,
                        parent.name
                    );
                }
                None => assert!(group.ancestors.is_empty(), "{}", group.name),
            }
            for child_id in &group.children {
                assert_eq!(by_id[child_id].parent, Some(group.id));
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutations_keep_the_forest_consistent() {
        let service = service();
        let a = create(&service, "a", None).await;
        let b = create(&service, "b", None).await;

        let mut movers = Vec::new();
        for i in 0..8 {
            let child = create(&service, &format!("child-{i}"), Some(a.id)).await;
            create(&service, &format!("grandchild-{i}"), Some(child.id)).await;
            movers.push(child);
        }
        let doomed: Vec<Group> = [
            create(&service, "doomed-0", Some(a.id)).await,
            create(&service, "doomed-1", Some(a.id)).await,
        ]
        .into();

        let mut tasks = tokio::task::JoinSet::new();
        for child in &movers {
            // Two moves of the same group race each other
            for parent in [b.id, a.id] {
                let service = service.clone();
                let id = child.id;
                tasks.spawn(async move { reparent(&service, id, Some(parent)).await.map(|_| ()) });
            }
        }
        for i in 0..4 {
            let service = service.clone();
            let parent = a.id;
            tasks.spawn(async move {
                service
                    .create(CreateGroupRequest {
                        name: format!("new-{i}"),
                        parent: Some(parent),
                    })
                    .await
                    .map(|_| ())
            });
        }
        for group in &doomed {
            let service = service.clone();
            let id = group.id;
            tasks.spawn(async move { service.remove(id).await });
        }

        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_forest_consistent(&service).await;
        let a = service.get(a.id).await.unwrap();
        let b = service.get(b.id).await.unwrap();
        assert_eq!(a.children.len() + b.children.len(), movers.len() + 4);
        for group in &doomed {
            assert!(matches!(service.get(group.id).await, Err(GroupError::NotFound(_))));
        }
    }

    /// Fails `add_child` on demand.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_add_child: AtomicBool,
    }

    #[async_trait]
    impl GroupStore for FlakyStore {
        async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>> {
            self.inner.find_group(id).await
        }
        async fn find_groups(&self, ids: &[Uuid]) -> StoreResult<Vec<Group>> {
            self.inner.find_groups(ids).await
        }
        async fn list_groups(&self, query: &GroupQuery) -> StoreResult<(Vec<Group>, u64)> {
            self.inner.list_groups(query).await
        }
        async fn insert_group(&self, group: &Group) -> StoreResult<()> {
            self.inner.insert_group(group).await
        }
        async fn update_group(&self, group: &Group) -> StoreResult<bool> {
            self.inner.update_group(group).await
        }
        async fn add_child(&self, parent: Uuid, child: Uuid) -> StoreResult<()> {
            if self.fail_add_child.load(Ordering::SeqCst) {
                return Err(StoreError::Internal(anyhow::anyhow!("connection lost")));
            }
            self.inner.add_child(parent, child).await
        }
        async fn remove_child(&self, parent: Uuid, child: Uuid) -> StoreResult<()> {
            self.inner.remove_child(parent, child).await
        }
        async fn rebase_descendants(&self, id: Uuid, prefix: &[Uuid]) -> StoreResult<u64> {
            self.inner.rebase_descendants(id, prefix).await
        }
        async fn delete_descendants(&self, id: Uuid) -> StoreResult<u64> {
            self.inner.delete_descendants(id).await
        }
        async fn delete_group(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_group(id).await
        }
    }

    #[tokio::test]
    async fn failure_after_insert_keeps_the_created_group() {
        let store = Arc::new(FlakyStore::default());
        let service = GroupService::new(store.clone());
        let parent = create(&service, "parent", None).await;

        store.fail_add_child.store(true, Ordering::SeqCst);
        let err = service
            .create(CreateGroupRequest {
                name: "child".into(),
                parent: Some(parent.id),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GroupError::Store(_)));

        let query = GroupQuery {
            filter: crate::store::GroupFilter {
                parent: Some(Some(parent.id)),
                ..Default::default()
            },
            ..ListQuery::default()
        };
        let (children, _) = service.list(&query).await.unwrap();
        assert_eq!(children.len(), 1);
        assert!(service.get(parent.id).await.unwrap().children.is_empty());
    }
}
