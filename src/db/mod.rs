//! Database module for WatchPost.
//!
//! SQLite storage for target/rule/window configuration, the incident ledger,
//! and the append-only probe history sink.

mod store;

pub use store::*;
