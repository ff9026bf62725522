// src/lib.rs
// Public library surface for integration tests (and the binary).

pub mod api;
pub mod cache;
pub mod config;
pub mod limits;
pub mod metrics;
pub mod providers;
pub mod thumbs;
pub mod types;
pub mod urlnorm;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::cache::FeedCache;
pub use crate::providers::{Aggregator, FeedProvider};
pub use crate::types::{FeedItem, FeedType, ProviderContext, ProviderResult, SortMode};
