pub mod rewriter;
pub mod feed_service;
pub mod download_service;

pub use rewriter::{download_url, EntryFilter, FeedRewriter, RewriteOptions, ShortsFilter};
pub use feed_service::FeedService;
pub use download_service::DownloadResolver;
