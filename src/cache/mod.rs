//! Result cache for metric computations.
//!
//! - `store`: key-value stores with per-entry expiry (SQLite, memory, no-op)
//! - `key`: deterministic key derivation from adapter kind, locator and `days`
//! - `memo`: the memoizing wrapper that never lets a cache failure reach callers

mod key;
mod memo;
mod store;

pub use key::CacheKey;
pub use memo::{CacheSource, Memoized, Memoizer, DEFAULT_TTL};
pub use store::{CacheStore, MemoryStore, NoopStore, SqliteStore};
