// Licensed under the Apache-2.0 license

//! The seam a configured `Device` drives its family-specific image write
//! through (spec.md 2's architecture diagram: "DeviceRegistry ... one of
//! BmcDevice, SpiBios, VrDriver, EepromDev, TpmDev"). Each driver crate
//! implements this for its own driver type, so `DeviceRegistry` and the
//! pipeline never match on device kind.

use crate::error::DeviceError;

pub trait DriverDispatch {
    fn update_firmware(
        &mut self,
        image_bytes: &[u8],
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<(), DeviceError>;
}
