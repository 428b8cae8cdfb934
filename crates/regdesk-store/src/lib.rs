//! Persistence layer for the regdesk planning backend.
//!
//! Three pieces, leaves first:
//!
//! - [`store::KeyValueStore`] -- a backend-agnostic durable key/value
//!   contract with per-key expiry, satisfied by an embedded SQLite
//!   store and a networked Redis store.
//! - [`session::SessionManager`] -- opaque session records with a
//!   time-to-live.
//! - [`plans::PlanRepository`] -- plan documents with immutable,
//!   append-only version history.
//!
//! The store handle is acquired once at startup via
//! [`store::connect_store`] and injected into the managers; swapping
//! backends never touches manager logic.

pub mod config;
pub mod error;
pub mod models;
pub mod plans;
pub mod session;
pub mod store;

pub use config::{BackendKind, StoreConfig};
pub use error::{Result, StoreError};
pub use models::{PlanRecord, PlanSummary, PlanVersion, Session};
pub use plans::PlanRepository;
pub use session::SessionManager;
pub use store::{KeyValueStore, RedisStore, SqliteStore, connect_store};
