use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

use crate::config::DatabaseConfig;
use crate::supabase::SupabaseClient;

/// Table holding one row per published article
pub const NEWS_TABLE: &str = "news";

#[derive(Debug, Clone, FromRow, Deserialize)]
pub struct Article {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<String>,
}

/// An article produced by the feed importer, not yet stored
#[derive(Debug, Clone, Serialize)]
pub struct NewArticle {
    pub title: String,
    pub content: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

/// Hosted databases hand out either numeric or uuid keys.
pub(crate) fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("unexpected id value: {}", other))),
    }
}

/// Handle to the article store. Built once at startup and shared with the handlers.
pub enum Database {
    Sqlite(SqlitePool),
    Supabase(SupabaseClient),
}

impl Database {
    /// Opens a SQLite database
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Database::Sqlite(pool))
    }

    pub fn supabase(client: SupabaseClient) -> Self {
        Database::Supabase(client)
    }

    pub async fn connect(config: DatabaseConfig) -> anyhow::Result<Self> {
        match config {
            DatabaseConfig::Sqlite { url } => {
                let db = Self::new(&url).await?;
                db.initialize().await?;
                Ok(db)
            }
            DatabaseConfig::Supabase { url, service_key } => {
                Ok(Self::supabase(SupabaseClient::new(&url, service_key)?))
            }
        }
    }

    /// Creates the local schema. The hosted schema is managed elsewhere.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        let Database::Sqlite(pool) = self else {
            return Ok(());
        };

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT,
                category TEXT,
                image_url TEXT,
                source_url TEXT UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_news_created
            ON news(created_at DESC)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_article(&self, id: &str) -> anyhow::Result<Option<Article>> {
        match self {
            Database::Sqlite(pool) => {
                let article = sqlx::query_as::<_, Article>(
                    r#"
                    SELECT CAST(id AS TEXT) AS id, title, content, category, image_url, created_at
                    FROM news
                    WHERE CAST(id AS TEXT) = ?
                    "#,
                )
                .bind(id)
                .fetch_optional(pool)
                .await?;
                Ok(article)
            }
            Database::Supabase(client) => client.get_article(id).await,
        }
    }

    pub async fn article_exists(&self, source_url: &str) -> anyhow::Result<bool> {
        match self {
            Database::Sqlite(pool) => {
                let count: (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM news WHERE source_url = ?")
                        .bind(source_url)
                        .fetch_one(pool)
                        .await?;
                Ok(count.0 > 0)
            }
            Database::Supabase(client) => client.article_exists(source_url).await,
        }
    }

    /// Stores an article and returns its new identifier
    pub async fn insert_article(&self, article: &NewArticle) -> anyhow::Result<String> {
        match self {
            Database::Sqlite(pool) => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO news (title, content, category, image_url, source_url, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&article.title)
                .bind(&article.content)
                .bind(&article.category)
                .bind(&article.image_url)
                .bind(&article.source_url)
                .bind(article.created_at.to_rfc3339())
                .execute(pool)
                .await?;
                Ok(result.last_insert_rowid().to_string())
            }
            Database::Supabase(client) => client.insert_article(article).await,
        }
    }
}
