//! # Classchat
//!
//! Real-time chat and presence engine for an education platform:
//! - Room directory with atomic direct-chat deduplication
//! - Message ledger with a monotonic sent/delivered/read state machine
//! - Ephemeral typing presence with debounce and TTL expiry
//! - Denormalized per-participant unread accounting
//! - Room and message text search
//!
//! The engine sits between a UI layer and two external collaborators: a
//! document store (real-time subscriptions, conditional queries, atomic
//! batches, transactions) and an identity provider. Both are consumed
//! through narrow traits and injected into every service.
//!
//! ## Module Structure
//!
//! ```text
//! classchat/
//! +-- config/         Configuration management
//! +-- domain/         Entities and the identity seam
//! +-- application/    Business services
//! +-- infrastructure/ Store abstraction and implementations
//! +-- shared/         Common utilities (errors, validation)
//! +-- engine          Service graph wiring
//! +-- telemetry       Observability setup
//! ```

// Configuration module
pub mod config;

// Domain layer - Core entities
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External collaborators
pub mod infrastructure;

// Shared utilities
pub mod shared;

// Service graph wiring
pub mod engine;

// Telemetry and observability
pub mod telemetry;

pub use engine::ChatEngine;
pub use shared::ChatError;
