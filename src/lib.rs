//! privalytics - privacy-preserving web analytics collector
//!
//! Tracking beacons are anonymized, rate limited and stored; consented events
//! are embedded in the background so analysts can ask questions about them in
//! natural language. Aggregates are served through a shared read-through cache.
//!
//! # Architecture
//! - `api`: HTTP handlers and middleware
//! - `services`: ingest, aggregation, question answering and erasure
//! - `storage`: event store (SeaORM)
//! - `embeddings` / `index`: embedding pipeline and similarity search
//! - `kv`: shared key-value store (Redis or in-memory)
//! - `ratelimit` / `cache`: admission control and aggregate cache on top of `kv`
//! - `config`, `system`, `runtime`, `cli`: configuration, logging, lifecycle

pub mod api;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod kv;
pub mod ratelimit;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
