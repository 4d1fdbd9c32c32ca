pub mod artifact;
pub mod config_guard;
pub mod error;
pub mod normalize;
pub mod parse;
pub mod request;
pub mod runner;
pub mod types;

pub use artifact::{find_freshest_artifact, list_artifacts, load_records, ArtifactKind};
pub use config_guard::ConfigPatchGuard;
pub use error::{ArtifactError, CrawlerError, NormalizeError};
pub use normalize::{extract_bloggers, fans_by_user, normalize_note};
pub use parse::parse_count;
pub use request::{CrawlMode, CrawlRequest};
pub use runner::{Crawler, MediaCrawler};
pub use types::{RawCount, RawCreator, RawNote};
