// src/history/mod.rs

//! Request history: append-only storage of every remote answer, split into a
//! success partition and an error partition.
//!
//! - `record.rs`  – persisted record types and the values queries return.
//! - `cache.rs`   – the pure "N most recent successes agree" decision.
//! - `backend.rs` – the storage trait (`HistoryBackend`).
//! - `memory.rs` / `sqlite.rs` – the two backends.
//! - `store.rs`   – `HistoryStore`, the async facade everything else uses.

pub mod backend;
pub mod cache;
pub mod memory;
pub mod record;
pub mod sqlite;
pub mod store;

pub use backend::{GroupQuery, Grouping, HistoryBackend};
pub use cache::{CacheDecision, decide};
pub use memory::MemoryBackend;
pub use record::{
    EndpointStats, ErrorCodeCounts, GroupCount, HistoryRecord, Partition, RequestResult,
    StorageFault,
};
pub use sqlite::SqliteBackend;
pub use store::HistoryStore;
