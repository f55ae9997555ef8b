// Licensed under the Apache-2.0 license

//! EEPROM device driver (spec.md 4.5), grounded on
//! `original_source/eeprom-device/eeprom_device.cpp`: acquire the mux,
//! bind the AT24 driver, `dd` the image into the exposed sysfs `eeprom`
//! node, then unwind.

use std::time::Duration;

use fwupd_core::collab::{CommandRunner, GpioBackend, GpioGuard};
use fwupd_core::error::DeviceError;
use fwupd_core::sysfs::SysfsBind;
use fwupd_core::collab::Sleeper;

use crate::config::EepromConfig;

const BIND_WAIT: Duration = Duration::from_secs(2);

/// AT24 family driver path, matching `eeprom_device.cpp`'s `getDriverPath`
/// (only `EEPROM_24C*` chip models are supported).
fn driver_relative_path() -> &'static str {
    "bus/i2c/drivers/at24"
}

pub struct EepromDriver<'a> {
    config: EepromConfig,
    sysfs: SysfsBind,
    gpio: &'a dyn GpioBackend,
    commands: &'a dyn CommandRunner,
    sleeper: &'a dyn Sleeper,
}

impl<'a> EepromDriver<'a> {
    pub fn new(
        config: EepromConfig,
        sysfs: SysfsBind,
        gpio: &'a dyn GpioBackend,
        commands: &'a dyn CommandRunner,
        sleeper: &'a dyn Sleeper,
    ) -> Result<Self, DeviceError> {
        if !config.chip_model.contains("EEPROM_24C") {
            return Err(DeviceError::Unsupported(format!(
                "unsupported EEPROM chip model: {}",
                config.chip_model
            )));
        }
        Ok(Self {
            config,
            sysfs,
            gpio,
            commands,
            sleeper,
        })
    }

    pub fn update_firmware(
        &self,
        image: &[u8],
        mut on_progress: impl FnMut(u8),
    ) -> Result<(), DeviceError> {
        let _mux = match &self.config.mux_gpio {
            Some(line) => Some(GpioGuard::acquire(self.gpio, line.clone())?),
            None => None,
        };
        on_progress(20);

        self.bind()?;
        on_progress(40);

        self.write_image(image)?;
        on_progress(60);

        self.unbind()?;
        on_progress(80);

        on_progress(100);
        Ok(())
    }

    fn bind_relative(&self) -> String {
        format!("{}/bind", driver_relative_path())
    }

    fn unbind_relative(&self) -> String {
        format!("{}/unbind", driver_relative_path())
    }

    fn verify_relative(&self) -> String {
        format!("{}/{}", driver_relative_path(), self.config.i2c_device_id())
    }

    fn bind(&self) -> Result<(), DeviceError> {
        let device_id = self.config.i2c_device_id();
        if self.sysfs.is_bound(&self.verify_relative()) {
            log::debug!("EEPROM {device_id} was already bound, unbinding first");
            self.unbind()?;
        }
        self.sysfs.bind(
            &self.bind_relative(),
            &device_id,
            &self.verify_relative(),
            BIND_WAIT,
            self.sleeper,
        )
    }

    fn unbind(&self) -> Result<(), DeviceError> {
        self.sysfs
            .unbind(&self.unbind_relative(), &self.config.i2c_device_id())?;
        self.sleeper.sleep(BIND_WAIT);
        Ok(())
    }

    fn write_image(&self, image: &[u8]) -> Result<(), DeviceError> {
        let eeprom_path = self.sysfs.root().join(format!(
            "bus/i2c/devices/{}/eeprom",
            self.config.i2c_device_id()
        ));
        let tempfile = tempfile::NamedTempFile::new()
            .map_err(|e| DeviceError::Other(format!("tempfile creation failed: {e}")))?;
        std::fs::write(tempfile.path(), image)
            .map_err(|e| DeviceError::Other(format!("tempfile write failed: {e}")))?;

        self.commands.run(
            "dd",
            &[
                &format!("if={}", tempfile.path().display()),
                &format!("of={}", eeprom_path.display()),
                "bs=1k",
            ],
        )
    }
}

impl<'a> fwupd_core::DriverDispatch for EepromDriver<'a> {
    fn update_firmware(
        &mut self,
        image_bytes: &[u8],
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<(), DeviceError> {
        EepromDriver::update_firmware(self, image_bytes, on_progress)
    }
}
