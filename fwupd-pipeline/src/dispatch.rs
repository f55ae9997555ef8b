// Licensed under the Apache-2.0 license

//! Adapts the VR family's verify-then-write contract (spec.md 4.4) to the
//! `DriverDispatch` seam every other family implements directly in its own
//! crate (spec.md 2's architecture diagram). Every other family's driver
//! already implements `fwupd_core::DriverDispatch` where it is defined.

use fwupd_core::error::DeviceError;
use fwupd_core::DriverDispatch;
use fwupd_vr::VrDriver;

/// A `VrImage` is produced by CRC-verifying the raw bytes before anything
/// touches the device, so progress only ever reports 0 -> 100 around the
/// actual write.
pub struct VrDispatch<'a> {
    pub driver: &'a mut dyn VrDriver,
    pub force: bool,
}

impl<'a> DriverDispatch for VrDispatch<'a> {
    fn update_firmware(
        &mut self,
        image_bytes: &[u8],
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<(), DeviceError> {
        let image = self.driver.verify_image(image_bytes)?;
        on_progress(10);
        self.driver.update_firmware(image.as_ref(), self.force)?;
        on_progress(100);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_vr::VrImage;
    use std::any::Any;

    struct FakeImage;
    impl VrImage for FakeImage {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct FakeVr {
        written: bool,
    }
    impl VrDriver for FakeVr {
        fn verify_image(&self, _image_bytes: &[u8]) -> Result<Box<dyn VrImage>, DeviceError> {
            Ok(Box::new(FakeImage))
        }
        fn update_firmware(
            &mut self,
            _image: &dyn VrImage,
            _force: bool,
        ) -> Result<(), DeviceError> {
            self.written = true;
            Ok(())
        }
        fn get_crc(&self) -> Result<u32, DeviceError> {
            Ok(0)
        }
        fn reset(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn forced_update_allowed(&self) -> bool {
            false
        }
    }

    #[test]
    fn vr_dispatch_verifies_then_writes() {
        let mut vr = FakeVr { written: false };
        let mut dispatch = VrDispatch {
            driver: &mut vr,
            force: false,
        };
        let mut progress = Vec::new();
        dispatch
            .update_firmware(b"image", &mut |p| progress.push(p))
            .unwrap();
        assert_eq!(progress, vec![10, 100]);
        assert!(vr.written);
    }
}
