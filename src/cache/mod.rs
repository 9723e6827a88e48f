//! Render cache
//!
//! Keeps the fully rendered feed document per topic so a read never pays the
//! rendering cost. Entries expire on their own TTL, which is independent of
//! the stored feed's staleness: an expired entry forces one re-render from the
//! store, not a re-fetch.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! render_ttl_seconds = 43200
//! capacity = 1000
//! ```

mod config;
mod lock;
mod store;

pub use config::CacheConfig;
pub use store::{CachedFeed, RenderCache};
