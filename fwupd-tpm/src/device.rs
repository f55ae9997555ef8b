// Licensed under the Apache-2.0 license

//! `TpmDevice`: the read-only wrapper spec.md 4.6 describes, grounded on
//! `original_source/tpm/tpm_device.cpp`. Only TPM2 is implemented; other
//! TPM types have no interface and every call fails.

use fwupd_core::error::DeviceError;

use crate::tpm2::{self, Tpm2Capget};

pub struct TpmDevice<'a> {
    capget: Option<&'a dyn Tpm2Capget>,
}

impl<'a> TpmDevice<'a> {
    pub fn tpm2(capget: &'a dyn Tpm2Capget) -> Self {
        Self {
            capget: Some(capget),
        }
    }

    /// For TPM types other than TPM2 (`tpm_device.cpp`: "Unsupported TPM
    /// type" leaves `tpmInterface` null and every call fails).
    pub fn unsupported() -> Self {
        Self { capget: None }
    }

    pub fn version(&self) -> Result<String, DeviceError> {
        match self.capget {
            Some(capget) => tpm2::read_version(capget),
            None => Err(DeviceError::Unsupported(
                "TPM interface is not initialized".to_string(),
            )),
        }
    }

    pub fn update_firmware(&self, image: &[u8]) -> Result<(), DeviceError> {
        match self.capget {
            Some(_) => tpm2::update_firmware(image),
            None => Err(DeviceError::Unsupported(
                "TPM interface is not initialized".to_string(),
            )),
        }
    }
}

impl<'a> fwupd_core::DriverDispatch for TpmDevice<'a> {
    fn update_firmware(
        &mut self,
        image_bytes: &[u8],
        _on_progress: &mut dyn FnMut(u8),
    ) -> Result<(), DeviceError> {
        TpmDevice::update_firmware(self, image_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeCapget(HashMap<&'static str, u32>);
    impl Tpm2Capget for FakeCapget {
        fn get_value(&self, key: &str) -> Result<u32, DeviceError> {
            self.0
                .get(key)
                .copied()
                .ok_or_else(|| DeviceError::Other(format!("no such key {key}")))
        }
    }

    #[test]
    fn unsupported_tpm_type_fails_every_call() {
        let device = TpmDevice::unsupported();
        assert!(device.version().is_err());
        assert!(device.update_firmware(b"image").is_err());
    }

    #[test]
    fn tpm2_reads_a_version() {
        let mut values = HashMap::new();
        values.insert("TPM2_PT_MANUFACTURER", 0x494E_5443);
        values.insert("TPM2_PT_FIRMWARE_VERSION_1", 0x0001_0002);
        let capget = FakeCapget(values);
        let device = TpmDevice::tpm2(&capget);
        assert_eq!(device.version().unwrap(), "1.2");
        assert!(device.update_firmware(b"image").is_err());
    }
}
