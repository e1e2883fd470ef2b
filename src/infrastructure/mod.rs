//! Infrastructure Layer
//!
//! External collaborator implementations: the document store abstraction
//! with its in-memory reference implementation, and the static identity
//! provider.

pub mod identity;
pub mod store;

pub use identity::StaticIdentity;
pub use store::{DocumentStore, InMemoryStore};
