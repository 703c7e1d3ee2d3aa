pub mod pool;
pub mod summary;

pub use pool::{PoolRecord, PoolStatsSnapshot};
pub use summary::PoolSummary;
