//! Domain layer for the live counter broadcast service.
//!
//! Holds the counter value model, the domain error tree, and the gateway to
//! the external fan-out provider. The `web` layer depends on this crate and
//! never reaches the provider API directly.

pub mod broadcast;
pub mod counter;
pub mod error;
pub mod gateway;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::Error;
