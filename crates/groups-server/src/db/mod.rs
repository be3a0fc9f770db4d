use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub type DbPool = PgPool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS groups (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        parent UUID NULL REFERENCES groups (id),
        children UUID[] NOT NULL DEFAULT '{}',
        ancestors UUID[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT groups_parent_not_self CHECK (parent IS NULL OR parent <> id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS groups_name_idx ON groups (name)",
    "CREATE INDEX IF NOT EXISTS groups_parent_idx ON groups (parent)",
    "CREATE INDEX IF NOT EXISTS groups_ancestors_idx ON groups USING GIN (ancestors)",
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id UUID PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        body TEXT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Creates the tables and indexes if they are missing.
pub async fn apply_schema(pool: &DbPool) -> anyhow::Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("Database schema is up to date");

    Ok(())
}
