// Licensed under the Apache-2.0 license

//! Voltage-regulator family drivers (spec.md 4.4): Infineon XDPE1x2xx,
//! Renesas ISL69269, the MPS family, and TI TDA38640A, each behind the
//! shared [`driver::VrDriver`] seam.

pub mod crc;
pub mod driver;
pub mod isl69269;
pub mod mps;
pub mod tda38640a;
pub mod transport;
pub mod xdpe1x2xx;

pub use driver::{VrDriver, VrImage};
pub use transport::I2cTransport;
