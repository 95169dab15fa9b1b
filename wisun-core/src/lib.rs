//! Core types and utilities for the Wi-SUN smart meter bridge
//!
//! This crate provides the error type shared by every layer and the
//! network information produced by a PAN scan.

pub mod error;
pub mod pan_info;

pub use error::{WiSunError, WiSunResult};
pub use pan_info::NetworkInfo;
