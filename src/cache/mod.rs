//! 聚合查询缓存

mod aggregate;

pub use aggregate::{AggregateCache, CacheLookup};
