//! Persisted chat history
//!
//! The transcript is stored as a whole in a single slot, as an ordered list
//! of `{role, text}` records. There is no schema versioning: anything that
//! fails to parse is treated as "no history" by the caller.

mod store;

pub use store::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
