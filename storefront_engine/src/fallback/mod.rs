//! File-backed fallback persistence.
//!
//! When the primary database is unreachable, orders are too valuable to drop. This tier captures them as JSON on
//! local disk so that the storefront keeps taking orders through an outage, and operators can replay the file into
//! the primary store afterwards.

mod file_store;

pub use file_store::FileStoreBackend;
