// Licensed under the Apache-2.0 license

//! PCIe-switch SPI flash device (supplemental module, SPEC_FULL.md
//! pcie-switch-device). spec.md's component budget (§2) names this device
//! in the architecture diagram but never gives it a `[MODULE]` section;
//! `original_source/pcieswitch/spi_device.cpp` shows the switch's flash is
//! reached the same way the BIOS SPI flash is (bind, write, unbind) minus
//! the host-power step, since the switch has no BIOS host to pause.

use std::time::Duration;

use fwupd_core::collab::{CommandRunner, GpioBackend, GpioGuard, MtdResolver, Sleeper};
use fwupd_core::error::DeviceError;
use fwupd_core::sysfs::SysfsBind;
use fwupd_spi_bios::write_via_tool;

use crate::config::PcieSwitchConfig;

const BIND_WAIT: Duration = Duration::from_secs(2);

pub struct PcieSwitchDriver<'a> {
    config: PcieSwitchConfig,
    sysfs: SysfsBind,
    gpio: &'a dyn GpioBackend,
    mtd: &'a dyn MtdResolver,
    commands: &'a dyn CommandRunner,
    sleeper: &'a dyn Sleeper,
}

impl<'a> PcieSwitchDriver<'a> {
    pub fn new(
        config: PcieSwitchConfig,
        sysfs: SysfsBind,
        gpio: &'a dyn GpioBackend,
        mtd: &'a dyn MtdResolver,
        commands: &'a dyn CommandRunner,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            config,
            sysfs,
            gpio,
            mtd,
            commands,
            sleeper,
        }
    }

    pub fn update_firmware(
        &self,
        image: &[u8],
        mut on_progress: impl FnMut(u8),
    ) -> Result<(), DeviceError> {
        let mux = match &self.config.mux_gpio {
            Some(line) => Some(GpioGuard::acquire(self.gpio, line.clone())?),
            None => None,
        };
        if let Some(mux) = &mux {
            mux.drive(true)?;
        }

        let result = (|| {
            let controller_bind = format!("bus/platform/drivers/{}/bind", self.config.controller_driver);
            let controller_verify = format!(
                "bus/platform/drivers/{}/{}",
                self.config.controller_driver, self.config.controller_driver
            );
            self.sysfs.bind(
                &controller_bind,
                &self.config.controller_driver,
                &controller_verify,
                BIND_WAIT,
                self.sleeper,
            )?;

            let nor_bind = format!("bus/spi/drivers/{}/bind", self.config.nor_driver);
            let nor_verify = format!(
                "bus/spi/drivers/{}/{}",
                self.config.nor_driver, self.config.nor_driver
            );
            self.sysfs.bind(
                &nor_bind,
                &self.config.nor_driver,
                &nor_verify,
                BIND_WAIT,
                self.sleeper,
            )?;

            let mtd_device = self.mtd.resolve(&self.config.nor_driver)?;
            let result = write_via_tool(
                self.config.tool,
                image,
                &mtd_device,
                self.commands,
                &mut on_progress,
            );

            let nor_unbind = format!("bus/spi/drivers/{}/unbind", self.config.nor_driver);
            self.sysfs.unbind(&nor_unbind, &self.config.nor_driver).ok();
            result
        })();

        if let Some(mux) = &mux {
            mux.drive(false)?;
        }
        on_progress(100);
        result
    }
}

impl<'a> fwupd_core::DriverDispatch for PcieSwitchDriver<'a> {
    fn update_firmware(
        &mut self,
        image_bytes: &[u8],
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<(), DeviceError> {
        PcieSwitchDriver::update_firmware(self, image_bytes, on_progress)
    }
}
