pub mod traits;
pub mod rss_bridge;
pub mod ytdlp;

pub use traits::{ExtractionError, ExtractionParams, FeedUpstream, MediaExtractor};
pub use rss_bridge::RssBridge;
pub use ytdlp::YtDlp;
