//! ormcache Storage - Store Abstraction
//!
//! The key-value store contract the cache engine talks to, plus two
//! implementations:
//!
//! - [`MemoryStore`]: in-process table with lazy per-entry expiration
//! - [`RemoteStore`]: adapter over a networked key-value service via
//!   [`KvClient`] (implemented for a redis `ConnectionManager` behind the
//!   `redis` feature)

pub mod entry;
pub mod memory;
pub mod remote;
pub mod traits;

pub use entry::{CacheEntry, Cached, Payload};
pub use memory::MemoryStore;
pub use remote::{ClientError, KvClient, RemoteStore};
pub use traits::{CacheStats, Store, StoreExt};
