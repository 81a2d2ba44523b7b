//! Content-addressed persistence engine.
//!
//! Raw primitive bytes enter through [`PersistenceCore::ingest`] and come
//! out the other side durably indexed or rejected with a typed
//! [`PersistError`]. The pipeline is a fixed sequence of small
//! collaborators:
//!
//! - [`Doorman`]: parse the bytes and verify authorship.
//! - [`Enforcer`]: targets must be kinds the relationship may point at,
//!   and dynamic frames must progress monotonically.
//! - [`Lawyer`]: binders and debinders must match their target's author.
//! - [`Bookie`]: lifetime rules (containers must be bound, nothing rises
//!   from a debinding).
//! - [`Undertaker`] alert, then the [`Librarian`] write.
//!
//! Ingestion is idempotent: a duplicate upload is a quiet no-op, observable
//! as `Ok(None)`. Concurrent uploads of the same object serialize on a
//! per-ghid lock, so exactly one of them does the work.

pub mod bookie;
pub mod core;
pub mod doorman;
pub mod enforcer;
pub mod error;
pub mod hooks;
pub mod keyed_lock;
pub mod lawyer;
pub mod librarian;

pub use crate::core::PersistenceCore;
pub use bookie::Bookie;
pub use doorman::Doorman;
pub use enforcer::Enforcer;
pub use error::{PersistError, PersistResult};
pub use hooks::{NoOpHooks, Postman, Salmonator, Undertaker};
pub use keyed_lock::{KeyedGuard, KeyedLock};
pub use lawyer::{Lawyer, PermissiveLawyer, StockLawyer};
pub use librarian::{Librarian, MemoryLibrarian};
