//! User registration, login and session handling.
//!
//! Provides:
//! - A flat-file credential store (one JSON record per line, append-only)
//! - Salted, iterated SHA-256 password hashes with constant-time comparison
//! - An in-memory session registry with a fixed TTL and lazy eviction
//!
//! ## Design Decisions
//! - The users file is loaded into an in-memory index once at startup and only
//!   appended to afterwards; uniqueness checks and appends share one lock.
//! - Records written by older deployments may still carry a cleartext password.
//!   Those keep verifying so existing accounts are not locked out.
//! - Sessions are never persisted. A restart logs everyone out.

pub mod error;
pub mod password;
pub mod session;
pub mod store;

pub use error::AuthError;
pub use session::{Session, SessionRegistry};
pub use store::{CompactionReport, Registration, User, UserStore};
