use async_trait::async_trait;
use crate::types::{Article, ArticleFilter, ExtractedArticle, User};
use crate::Result;

/// Owner-scoped persistence for saved articles.
///
/// Every lookup and mutation takes the owner id; an article belonging to
/// someone else behaves exactly like a missing one.
#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Store a freshly extracted article for `user_id`
    async fn create_article(&self, user_id: i64, url: &str, extracted: &ExtractedArticle) -> Result<Article>;

    /// Fetch a single article
    async fn get_article(&self, id: i64, user_id: i64) -> Result<Option<Article>>;

    /// List articles, newest first
    async fn list_articles(&self, user_id: i64, filter: ArticleFilter) -> Result<Vec<Article>>;

    /// Flip the favorite flag. Returns false if nothing matched.
    async fn toggle_favorite(&self, id: i64, user_id: i64) -> Result<bool>;

    /// Flip the archived flag. Returns false if nothing matched.
    async fn toggle_archive(&self, id: i64, user_id: i64) -> Result<bool>;

    /// Returns false if nothing matched.
    async fn delete_article(&self, id: i64, user_id: i64) -> Result<bool>;
}

#[async_trait]
pub trait UserStorage: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn create_user(&self, email: &str, name: Option<&str>) -> Result<User>;

    /// Entry point for every authenticated request.
    ///
    /// This default is a read then an insert; backends serving concurrent
    /// requests override it with a single atomic step.
    async fn get_or_create_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        match self.get_user_by_email(email).await? {
            Some(user) => Ok(user),
            None => {
                let user = self.create_user(email, name).await?;
                tracing::info!(user_id = user.id, email = %user.email, "Created new user");
                Ok(user)
            }
        }
    }
}

/// Everything the web layer needs from one backend.
pub trait Storage: ArticleStorage + UserStorage {}

impl<T: ArticleStorage + UserStorage> Storage for T {}
