//! ECHONET Lite frame codec
//!
//! This crate encodes and decodes the binary application frames exchanged
//! with the smart meter, and provides the correlation rule used to match
//! an asynchronous response to the request that caused it.

pub mod frame;
pub mod object;

pub use frame::{EHD, Frame, HEADER_LENGTH, MAX_NUMERIC_PDC, Property};
pub use object::{Eoj, Esv};
pub use num_bigint::BigUint;
