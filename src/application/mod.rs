//! Application Layer
//!
//! Business services consumed by the UI layer.

pub mod services;

pub use services::*;
