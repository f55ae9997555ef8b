// Licensed under the Apache-2.0 license

//! Read-only TPM device support (spec.md 4.6), grounded on
//! `original_source/tpm/`.

pub mod device;
pub mod tpm2;

pub use device::TpmDevice;
pub use tpm2::{RealTpm2Capget, Tpm2Capget};
