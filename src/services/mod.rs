pub mod archive;
pub mod cache;
pub mod lifecycle;
pub mod parser;
pub mod refresh;
pub mod render;

pub use cache::PublishedCache;
pub use lifecycle::PoolStatsService;
pub use refresh::{RefreshLoop, RefreshStats};
