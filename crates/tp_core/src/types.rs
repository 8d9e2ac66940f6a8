use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of characters of content kept in an excerpt before the ellipsis.
pub const EXCERPT_LENGTH: usize = 200;

/// Excerpt used when a page could be reached in principle but nothing usable came back.
pub const EXTRACTION_FAILED_EXCERPT: &str = "Failed to extract content";

/// Title used when no host can be recovered from the submitted URL.
pub const INVALID_URL_TITLE: &str = "Invalid URL";

/// Builds the preview shown in article lists.
///
/// Counts characters rather than bytes so multi-byte text never splits.
pub fn make_excerpt(content: &str) -> String {
    match content.char_indices().nth(EXCERPT_LENGTH) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// What the extraction pipeline hands to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedArticle {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub image_url: Option<String>,
}

impl ExtractedArticle {
    /// A successfully extracted page. The excerpt is always derived from `content`.
    pub fn new(title: impl Into<String>, content: impl Into<String>, image_url: Option<String>) -> Self {
        let content = content.into();
        Self {
            title: title.into(),
            excerpt: make_excerpt(&content),
            content,
            image_url: image_url.filter(|url| !url.trim().is_empty()),
        }
    }

    /// A placeholder saved in place of real content. `reason` ends up in the excerpt.
    pub fn degraded(title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: String::new(),
            excerpt: reason.into(),
            image_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub image_url: Option<String>,
    pub is_archived: bool,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Which slice of a user's reading list to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleFilter {
    /// Everything not archived.
    #[default]
    All,
    /// Favorites that are not archived.
    Favorites,
    Archived,
}

impl ArticleFilter {
    /// Whether an article with the given flags belongs in this view.
    pub fn matches(self, is_archived: bool, is_favorite: bool) -> bool {
        match self {
            ArticleFilter::All => !is_archived,
            ArticleFilter::Favorites => !is_archived && is_favorite,
            ArticleFilter::Archived => is_archived,
        }
    }
}

impl FromStr for ArticleFilter {
    type Err = std::convert::Infallible;

    /// Unknown filters fall back to `All`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "favorites" => ArticleFilter::Favorites,
            "archived" => ArticleFilter::Archived,
            _ => ArticleFilter::All,
        })
    }
}

impl fmt::Display for ArticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArticleFilter::All => "all",
            ArticleFilter::Favorites => "favorites",
            ArticleFilter::Archived => "archived",
        };
        f.write_str(name)
    }
}

/// Desired flag states. `None` leaves a flag untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleUpdate {
    pub is_archived: Option<bool>,
    pub is_favorite: Option<bool>,
}

impl ArticleUpdate {
    pub fn needs_favorite_toggle(&self, article: &Article) -> bool {
        self.is_favorite.is_some_and(|wanted| wanted != article.is_favorite)
    }

    pub fn needs_archive_toggle(&self, article: &Article) -> bool {
        self.is_archived.is_some_and(|wanted| wanted != article.is_archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(is_archived: bool, is_favorite: bool) -> Article {
        Article {
            id: 1,
            user_id: 1,
            url: "https://example.com".to_string(),
            title: None,
            content: None,
            excerpt: None,
            image_url: None,
            is_archived,
            is_favorite,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_excerpt_truncates_long_content() {
        let excerpt = make_excerpt(&"A".repeat(300));
        assert_eq!(excerpt.len(), 203);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_excerpt_keeps_short_content() {
        assert_eq!(make_excerpt("Short content"), "Short content");
        let exact = "B".repeat(200);
        assert_eq!(make_excerpt(&exact), exact);
    }

    #[test]
    fn test_excerpt_counts_characters() {
        let excerpt = make_excerpt(&"é".repeat(250));
        assert_eq!(excerpt.chars().count(), 203);
        assert!(excerpt.starts_with("éé"));
    }

    #[test]
    fn test_extracted_article_drops_blank_image() {
        let article = ExtractedArticle::new("Title", "Body", Some("  ".to_string()));
        assert_eq!(article.image_url, None);
        assert_eq!(article.excerpt, "Body");
    }

    #[test]
    fn test_degraded_article() {
        let article = ExtractedArticle::degraded("example.com", EXTRACTION_FAILED_EXCERPT);
        assert!(article.content.is_empty());
        assert_eq!(article.excerpt, "Failed to extract content");
        assert_eq!(article.image_url, None);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("favorites".parse::<ArticleFilter>().unwrap(), ArticleFilter::Favorites);
        assert_eq!("Archived".parse::<ArticleFilter>().unwrap(), ArticleFilter::Archived);
        assert_eq!("whatever".parse::<ArticleFilter>().unwrap(), ArticleFilter::All);
    }

    #[test]
    fn test_filter_matches() {
        assert!(ArticleFilter::All.matches(false, true));
        assert!(!ArticleFilter::All.matches(true, false));
        assert!(ArticleFilter::Favorites.matches(false, true));
        assert!(!ArticleFilter::Favorites.matches(true, true));
        assert!(ArticleFilter::Archived.matches(true, false));
    }

    #[test]
    fn test_update_only_toggles_changed_flags() {
        let current = article(false, true);
        let update = ArticleUpdate { is_archived: Some(true), is_favorite: Some(true) };
        assert!(update.needs_archive_toggle(&current));
        assert!(!update.needs_favorite_toggle(&current));
        assert!(!ArticleUpdate::default().needs_archive_toggle(&current));
    }
}
