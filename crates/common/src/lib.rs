//! Shared types for the RESQ API workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
