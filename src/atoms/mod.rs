// Relaymux Atoms: small shared primitives used across the engine.

pub mod error;

pub use error::{RelayError, RelayResult};
