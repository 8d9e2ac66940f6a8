use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tp_core::{Article, ArticleFilter, ArticleStorage, Error, ExtractedArticle, Result, User, UserStorage};
use tracing::info;

use crate::StorageBackend;

#[derive(Debug, Default)]
struct MemoryStore {
    last_article_id: i64,
    last_user_id: i64,
    articles: Vec<Article>,
    users: Vec<User>,
}

impl MemoryStore {
    fn owned_mut(&mut self, id: i64, user_id: i64) -> Option<&mut Article> {
        self.articles.iter_mut().find(|a| a.id == id && a.user_id == user_id)
    }

    fn insert_user(&mut self, email: &str, name: Option<&str>) -> User {
        self.last_user_id += 1;
        let user = User {
            id: self.last_user_id,
            email: email.to_string(),
            name: name.map(str::to_string),
            created_at: Utc::now(),
        };
        self.users.push(user.clone());
        user
    }
}

/// Process-local storage, lost on exit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should always be available"
    }
}

#[async_trait]
impl ArticleStorage for MemoryStorage {
    async fn create_article(&self, user_id: i64, url: &str, extracted: &ExtractedArticle) -> Result<Article> {
        let mut store = self.store.write().await;
        store.last_article_id += 1;
        let article = Article {
            id: store.last_article_id,
            user_id,
            url: url.to_string(),
            title: Some(extracted.title.clone()),
            content: Some(extracted.content.clone()),
            excerpt: Some(extracted.excerpt.clone()),
            image_url: extracted.image_url.clone(),
            is_archived: false,
            is_favorite: false,
            created_at: Utc::now(),
        };
        store.articles.push(article.clone());
        Ok(article)
    }

    async fn get_article(&self, id: i64, user_id: i64) -> Result<Option<Article>> {
        let store = self.store.read().await;
        Ok(store
            .articles
            .iter()
            .find(|a| a.id == id && a.user_id == user_id)
            .cloned())
    }

    async fn list_articles(&self, user_id: i64, filter: ArticleFilter) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        let mut articles: Vec<Article> = store
            .articles
            .iter()
            .filter(|a| a.user_id == user_id && filter.matches(a.is_archived, a.is_favorite))
            .cloned()
            .collect();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(articles)
    }

    async fn toggle_favorite(&self, id: i64, user_id: i64) -> Result<bool> {
        let mut store = self.store.write().await;
        Ok(match store.owned_mut(id, user_id) {
            Some(article) => {
                article.is_favorite = !article.is_favorite;
                true
            }
            None => false,
        })
    }

    async fn toggle_archive(&self, id: i64, user_id: i64) -> Result<bool> {
        let mut store = self.store.write().await;
        Ok(match store.owned_mut(id, user_id) {
            Some(article) => {
                article.is_archived = !article.is_archived;
                true
            }
            None => false,
        })
    }

    async fn delete_article(&self, id: i64, user_id: i64) -> Result<bool> {
        let mut store = self.store.write().await;
        let before = store.articles.len();
        store.articles.retain(|a| !(a.id == id && a.user_id == user_id));
        Ok(store.articles.len() < before)
    }
}

#[async_trait]
impl UserStorage for MemoryStorage {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let store = self.store.read().await;
        Ok(store.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        let mut store = self.store.write().await;
        if store.users.iter().any(|u| u.email == email) {
            return Err(Error::Storage(format!("User already exists: {}", email)));
        }
        Ok(store.insert_user(email, name))
    }

    async fn get_or_create_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        let mut store = self.store.write().await;
        if let Some(user) = store.users.iter().find(|u| u.email == email) {
            return Ok(user.clone());
        }
        let user = store.insert_user(email, name);
        info!(user_id = user.id, email = %user.email, "Created new user");
        Ok(user)
    }
}
