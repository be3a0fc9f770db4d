use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub const MODEL_NAME: &'static str = "Article";
    pub const WRITABLE_FIELDS: &'static [&'static str] = &["slug", "title", "body"];
    pub const FILTER_FIELDS: &'static [&'static str] = &["slug", "title"];

    pub fn new(slug: String, title: String, body: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug,
            title,
            body,
            created_at: now,
            updated_at: now,
        }
    }
}
