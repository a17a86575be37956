//! Shared types for the school-admin workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
