use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use tp_core::{Article, ArticleFilter, ArticleStorage, Error, ExtractedArticle, Result, User, UserStorage};
use tracing::info;

use crate::StorageBackend;

pub const DEFAULT_DB_PATH: &str = "data/timstapaper.db";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT UNIQUE NOT NULL,
        name TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        url TEXT NOT NULL,
        title TEXT,
        content TEXT,
        excerpt TEXT,
        image_url TEXT,
        is_archived INTEGER NOT NULL DEFAULT 0,
        is_favorite INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users (id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_user_id ON articles(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_articles_created_at ON articles(created_at)",
    // Add future migrations here
];

pub struct SqliteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl StorageBackend for SqliteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be writable at the configured --database path"
    }
}

impl SqliteStorage {
    /// Opens (creating if needed) the database file and runs migrations.
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(db_error("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }
        info!(path = %db_path.display(), "Database schema initialized");

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| Error::Database(format!("{}: {}", context, e))
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse date {}: {}", raw, e)))
}

fn row_to_article(row: &SqliteRow) -> Result<Article> {
    let get_err = db_error("Failed to read article row");
    Ok(Article {
        id: row.try_get("id").map_err(&get_err)?,
        user_id: row.try_get("user_id").map_err(&get_err)?,
        url: row.try_get("url").map_err(&get_err)?,
        title: row.try_get("title").map_err(&get_err)?,
        content: row.try_get("content").map_err(&get_err)?,
        excerpt: row.try_get("excerpt").map_err(&get_err)?,
        image_url: row.try_get("image_url").map_err(&get_err)?,
        is_archived: row.try_get("is_archived").map_err(&get_err)?,
        is_favorite: row.try_get("is_favorite").map_err(&get_err)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(&get_err)?)?,
    })
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let get_err = db_error("Failed to read user row");
    Ok(User {
        id: row.try_get("id").map_err(&get_err)?,
        email: row.try_get("email").map_err(&get_err)?,
        name: row.try_get("name").map_err(&get_err)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(&get_err)?)?,
    })
}

#[async_trait]
impl ArticleStorage for SqliteStorage {
    async fn create_article(&self, user_id: i64, url: &str, extracted: &ExtractedArticle) -> Result<Article> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (user_id, url, title, content, excerpt, image_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(url)
        .bind(&extracted.title)
        .bind(&extracted.content)
        .bind(&extracted.excerpt)
        .bind(extracted.image_url.as_deref())
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to store article"))?;

        let id = result.last_insert_rowid();
        self.get_article(id, user_id)
            .await?
            .ok_or(Error::NotFound(id))
    }

    async fn get_article(&self, id: i64, user_id: i64) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get article"))?;

        row.as_ref().map(row_to_article).transpose()
    }

    async fn list_articles(&self, user_id: i64, filter: ArticleFilter) -> Result<Vec<Article>> {
        let condition = match filter {
            ArticleFilter::All => "is_archived = 0",
            ArticleFilter::Favorites => "is_archived = 0 AND is_favorite = 1",
            ArticleFilter::Archived => "is_archived = 1",
        };
        let sql = format!(
            "SELECT * FROM articles WHERE user_id = ? AND {} ORDER BY created_at DESC, id DESC",
            condition
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list articles"))?;

        rows.iter().map(row_to_article).collect()
    }

    async fn toggle_favorite(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET is_favorite = CASE WHEN is_favorite = 1 THEN 0 ELSE 1 END
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to toggle favorite"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn toggle_archive(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET is_archived = CASE WHEN is_archived = 1 THEN 0 ELSE 1 END
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to toggle archive"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_article(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete article"))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStorage for SqliteStorage {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, created_at FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get user"))?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn create_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        let created_at = Utc::now();
        let result = sqlx::query("INSERT INTO users (email, name, created_at) VALUES (?, ?, ?)")
            .bind(email)
            .bind(name)
            .bind(timestamp(created_at))
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to create user"))?;

        Ok(User {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            name: name.map(str::to_string),
            created_at: parse_timestamp(&timestamp(created_at))?,
        })
    }

    async fn get_or_create_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        let result = sqlx::query(
            "INSERT INTO users (email, name, created_at) VALUES (?, ?, ?) ON CONFLICT(email) DO NOTHING",
        )
        .bind(email)
        .bind(name)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create user"))?;

        let user = self
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| Error::Database(format!("User vanished after insert: {}", email)))?;
        if result.rows_affected() > 0 {
            info!(user_id = user.id, email = %user.email, "Created new user");
        }
        Ok(user)
    }
}
