/*!
 * Core Module
 * Shared types, errors, and limits for the multiplexer backends
 */

pub mod errors;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use types::*;
