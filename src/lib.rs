//! SQLite schema, CRUD, session and logging walkthroughs.
//!
//! # Intention
//!
//! - Provide a small typed API over `rusqlite`: schema definitions, CRUD
//!   operations, text SQL with named parameters and table reflection.
//! - Provide a unit-of-work session for entity types declared with explicit
//!   table definitions.
//! - Keep logging configuration explicit: a [`logging::Loggers`] handle is
//!   built by the caller and passed to whatever needs it.
//!
//! # Architectural Boundaries
//!
//! - SQL execution, transactions and pooling belong to SQLite; this crate
//!   only renders statements and maps rows.
//! - The walkthroughs are the only place with sample data.

pub mod error;
pub mod logging;
pub mod models;
pub mod printer;
pub mod session;
pub mod sqlite;
pub mod walkthrough;

pub use error::{Result, StoreError};
pub use logging::{LineFormat, Loggers, NormalizedLayer, TargetSettings};
pub use session::{BelongsTo, Entity, Session};
pub use sqlite::{SqliteConfig, SqliteEngine};
