//! Core building blocks shared across the TOS Rust SDK.
//!
//! This crate carries the pieces that every other SDK crate leans on:
//!
//! - [`constants`] - service limits (part sizes, part counts, presign expiry)
//! - [`config`] - client configuration
//! - [`endpoint`] - endpoint/region model and virtual-host URL derivation
//! - [`crc64`] - incremental CRC64-ECMA with checksum combination
//! - [`time`] - skew-aware clock and the timestamp formats used for signing
//!
//! Nothing here performs I/O; the crate is pure data and arithmetic so that
//! the signing and transfer layers above it stay easy to test.

pub mod config;
pub mod constants;
pub mod crc64;
pub mod endpoint;
pub mod time;

pub use config::TosConfig;
pub use crc64::Crc64;
pub use endpoint::{Endpoint, EndpointError};
pub use time::SkewClock;
