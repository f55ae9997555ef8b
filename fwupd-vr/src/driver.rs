// Licensed under the Apache-2.0 license

//! The `VrDriver` seam every chip family implements (spec.md 4.4):
//! `verifyImage`, `updateFirmware`, `getCRC`, `reset`, `forcedUpdateAllowed`.
//! Mirrors the teacher's `VoltageRegulator` base class in spirit, expressed
//! as a trait object rather than inheritance.

use fwupd_core::error::DeviceError;

/// A parsed, CRC-checked firmware image, ready to be written to a device.
/// Opaque outside this crate: each family stores whatever internal
/// representation its `verify_image` produced.
pub trait VrImage: std::fmt::Debug {
    fn as_any(&self) -> &dyn std::any::Any;
}

pub trait VrDriver {
    /// Parse and CRC-verify a raw configuration image without touching the
    /// device. Returns an opaque, already-verified image handle.
    fn verify_image(&self, image_bytes: &[u8]) -> Result<Box<dyn VrImage>, DeviceError>;

    /// Write a previously verified image to the device. `force` skips the
    /// "already up to date" / "remaining writes low" refusals.
    fn update_firmware(&mut self, image: &dyn VrImage, force: bool) -> Result<(), DeviceError>;

    /// Read back the device's currently programmed configuration checksum.
    fn get_crc(&self) -> Result<u32, DeviceError>;

    fn reset(&mut self) -> Result<(), DeviceError>;

    /// Whether this family accepts `force` to bypass its own safety checks.
    fn forced_update_allowed(&self) -> bool;
}
