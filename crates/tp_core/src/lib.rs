pub mod error;
pub mod logging;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use storage::{ArticleStorage, Storage, UserStorage};
pub use types::{
    make_excerpt, Article, ArticleFilter, ArticleUpdate, ExtractedArticle, User,
    EXCERPT_LENGTH, EXTRACTION_FAILED_EXCERPT, INVALID_URL_TITLE,
};
