//! Storefront Payment Engine
//!
//! The storefront payment engine owns the order lifecycle for a multi-seller storefront: accepting checkouts,
//! reconciling payment-provider captures against orders, expiring orders whose payment window lapses, and refunding
//! captures that arrive too late. It is HTTP-agnostic; the server crate puts a web surface in front of it.
//!
//! The library is divided into three main sections:
//! 1. Persistence ([`mod@sqlite`], [`mod@fallback`] and [`PersistenceFacade`]). SQLite is the primary backend, and a
//!    JSON file store is the fallback that keeps capturing orders through a database outage. Both implement
//!    [`traits::StorefrontDatabase`], and the facade composes them behind the same trait with a retry-then-fallback
//!    policy, so the rest of the system never knows which tier answered.
//! 2. The engine public API ([`mod@api`]). [`OrderFlowApi`] drives the state machine and the reconciliation race;
//!    [`SettingsApi`] manages operator configuration.
//! 3. Events ([`mod@events`]). A small hook system emits order-created and order-changed events so that subscribers
//!    (such as the server's live order feed) can react without being wired into the engine.

mod api;
mod facade;
mod fallback;
mod sqlite;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

pub use api::{order_objects, OrderFlowApi, OrderFlowError, SettingsApi};
pub use facade::PersistenceFacade;
pub use fallback::FileStoreBackend;
pub use sqlite::{db, SqliteDatabase};
