//! spd-state — domain types and the embedded document store for SPD.
//!
//! Backed by [redb](https://docs.rs/redb), the store keeps three document
//! collections: the authoritative forecast, the latest performance-profile
//! catalogue, and selected policies.
//!
//! # Architecture
//!
//! Documents are JSON-serialized into redb's `&[u8]` value columns and keyed
//! by their generated identifier. The store only offers insert, find, update
//! and remove; deciding *which* record is authoritative is left to callers.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{Document, StateStore};
pub use types::*;
