//! Domain Layer
//!
//! Entities and the identity seam. No store or service logic lives here.

pub mod entities;
pub mod identity;

pub use entities::*;
pub use identity::Identity;
