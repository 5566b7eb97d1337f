//! # rankbait-store
//!
//! Storage collaborators for RankBait.
//!
//! * [`DocumentStore`] is the contract of the remote multi-writer document
//!   store: fallible async CRUD, filtered queries and live snapshot
//!   subscriptions. [`MemoryStore`] implements it in-process and doubles as
//!   a local emulator with fault injection.
//! * [`Database`] is the on-device SQLite file holding small scalar values
//!   (device id, last selected group) behind the [`ScalarStore`] trait.

pub mod database;
pub mod document;
pub mod memory;
pub mod migrations;
pub mod remote;
pub mod settings;

mod error;

pub use database::Database;
pub use document::{Document, FieldUpdate, Filter, Patch, Query, Snapshot};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use remote::{DocumentStore, Subscription};
pub use settings::ScalarStore;
