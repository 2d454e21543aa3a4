//! Shared plumbing for the jarsmith crates: the error taxonomy, the pluggable
//! log sink and the cooperative cancellation token.

pub mod cancel;
pub mod errors;
pub mod log;
