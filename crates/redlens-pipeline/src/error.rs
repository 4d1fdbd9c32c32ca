use redlens_crawler::CrawlerError;
use redlens_db::DbError;
use thiserror::Error;

/// Errors from pipeline operations that report failure to the caller.
/// Batch collection never returns these; see [`crate::CollectionStats`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("crawler error: {0}")]
    Crawler(#[from] CrawlerError),

    #[error("blogger '{0}' not found")]
    UnknownBlogger(String),
}
