//! Configuration types
//!
//! Serializable description of a connection, loaded by front ends and
//! turned into [`GpioConnectionSettings`](crate::GpioConnectionSettings) and
//! [`PinConfiguration`](crate::PinConfiguration)s.

pub mod types;

pub use types::*;
