//! Cache Port implementations.
//!
//! `MemoryCache` keeps entries in-process; `RedisCache` shares them across
//! processes. Both apply the same per-domain freshness table ([`CacheTtls`]).

pub mod memory;
pub mod redis_cache;
pub mod ttl;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;
pub use ttl::CacheTtls;
