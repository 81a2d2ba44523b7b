//! Foundation types for Keel.
//!
//! This crate provides the identifier, object-model, and error-taxonomy types
//! used throughout the Keel system. Every other Keel crate depends on
//! `keel-types`.
//!
//! # Key Types
//!
//! - [`Ghid`] — Content-derived identifier (BLAKE3 hash); primary key for
//!   every stored object and the stable address of dynamic bindings
//! - [`LiteObject`] — Lightweight, payload-free view of the six wire
//!   primitives
//! - [`ObjectKind`] — Discriminant for the six primitive kinds
//! - [`ErrorFamily`] — Compact wire error taxonomy shared by the
//!   persistence engine and the protocol layer
//! - [`ConnId`] — Per-process connection correlation id

pub mod conn;
pub mod error;
pub mod family;
pub mod ghid;
pub mod lite;

pub use conn::ConnId;
pub use error::TypeError;
pub use family::ErrorFamily;
pub use ghid::Ghid;
pub use lite::{
    ContainerLite, DebindingLite, DynamicBindingLite, IdentityLite, LiteObject, ObjectKind,
    RequestLite, StaticBindingLite,
};
