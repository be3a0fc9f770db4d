use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node in the group forest.
///
/// `children` and `ancestors` are denormalized from `parent` and are only
/// ever written by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub parent: Option<Uuid>,
    #[serde(default)]
    pub children: Vec<Uuid>,
    /// Root-to-parent path, the direct parent last.
    #[serde(default)]
    pub ancestors: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub const MODEL_NAME: &'static str = "Group";

    /// Fields a client may write. Everything else in a payload is dropped.
    pub const WRITABLE_FIELDS: &'static [&'static str] = &["name", "parent"];

    /// Fields a list request may filter on.
    pub const FILTER_FIELDS: &'static [&'static str] = &["name", "parent", "ancestor"];

    /// Fields holding group ids, which `populate` can expand.
    pub const REFERENCE_FIELDS: &'static [&'static str] = &["parent", "children", "ancestors"];

    pub fn new(name: String, parent: Option<Uuid>, ancestors: Vec<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            parent,
            children: Vec::new(),
            ancestors,
            created_at: now,
            updated_at: now,
        }
    }

    /// The `ancestors` value a direct child of this group must carry.
    pub fn path_for_child(&self) -> Vec<Uuid> {
        let mut path = self.ancestors.clone();
        path.push(self.id);
        path
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_path_appends_own_id() {
        let root = Group::new("root".into(), None, vec![]);
        let child = Group::new("child".into(), Some(root.id), root.path_for_child());

        assert_eq!(child.ancestors, vec![root.id]);
        assert_eq!(child.path_for_child(), vec![root.id, child.id]);
        assert!(root.is_root());
        assert!(!child.is_root());
    }

    #[test]
    fn serializes_timestamps_in_camel_case() {
        let group = Group::new("root".into(), None, vec![]);
        let value = serde_json::to_value(&group).unwrap();

        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
        assert_eq!(value["parent"], serde_json::Value::Null);
        assert_eq!(value["children"], serde_json::json!([]));
    }
}
