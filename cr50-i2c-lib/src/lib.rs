//! # cr50 TPM I2C Library (Rust)
//!
//! Vendor driver for the cr50 TPM 2.0 chip attached over I2C. The register
//! model is the TCG TIS FIFO interface, reached through a one byte register
//! address. cr50 differs from other I2C TPMs in a few ways:
//!
//! - a register read is an address write, a settle delay, then a read
//! - the status register is only ever accessed 4 bytes wide
//! - a single transfer carries at most 63 bytes
//! - responses are drained a full burst at a time
//!
//! The chip is polled. Interrupt driven transfer is not supported.
#![cfg_attr(target_os = "none", no_std)]
#![forbid(unsafe_code)]

mod config;
mod cr50;
mod error;
mod locality;
mod ops;
pub mod platform;
pub mod registers;
mod transport;

#[cfg(test)]
mod sim;

pub use config::Config;
pub use cr50::{ChipState, Cr50};
pub use error::Error;
pub use ops::TpmVendorOps;
pub use transport::DeviceHandle;

pub type Result<T> = core::result::Result<T, Error>;
