// Licensed under the Apache-2.0 license

//! SPI BIOS device driver (spec.md 4.3), grounded on
//! `original_source/bios-spi/spi_device.cpp` and `host_power.cpp`: power
//! the host off, mux the flash to the controller, bind the SPI controller
//! and spi-nor drivers, write the image with the configured tool, then
//! unwind in reverse.

use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use fwupd_core::collab::{
    CommandRunner, GpioBackend, GpioGuard, HostPowerController, HostPowerState,
    ManagementEngineController, MtdResolver, Sleeper,
};
use fwupd_core::error::DeviceError;
use fwupd_core::sysfs::SysfsBind;

use crate::config::{SpiBiosConfig, WriteTool};

const BIND_WAIT: Duration = Duration::from_secs(2);
const ME_SETTLE: Duration = Duration::from_secs(5);
const RAW_CHUNK: usize = 1024 * 1024;

pub struct SpiBiosDriver<'a> {
    config: SpiBiosConfig,
    sysfs: SysfsBind,
    host_power: &'a dyn HostPowerController,
    gpio: &'a dyn GpioBackend,
    me: &'a dyn ManagementEngineController,
    mtd: &'a dyn MtdResolver,
    commands: &'a dyn CommandRunner,
    sleeper: &'a dyn Sleeper,
}

impl<'a> SpiBiosDriver<'a> {
    pub fn new(
        config: SpiBiosConfig,
        sysfs: SysfsBind,
        host_power: &'a dyn HostPowerController,
        gpio: &'a dyn GpioBackend,
        me: &'a dyn ManagementEngineController,
        mtd: &'a dyn MtdResolver,
        commands: &'a dyn CommandRunner,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            config,
            sysfs,
            host_power,
            gpio,
            me,
            mtd,
            commands,
            sleeper,
        }
    }

    /// spec.md 4.3: the ten-step algorithm. `on_progress` receives the
    /// milestones the original calls `activationProgress->setProgress`.
    pub fn update_firmware(
        &self,
        image: &[u8],
        mut on_progress: impl FnMut(u8),
    ) -> Result<(), DeviceError> {
        if self.config.tool == WriteTool::Ifd {
            return Err(DeviceError::Unsupported(
                "IFD layout is not supported; use Flat, Flashcp, or raw write".into(),
            ));
        }

        let previous_state = self.host_power.state();
        if previous_state == HostPowerState::Transitioning {
            return Err(DeviceError::ResourceBusy(
                "host power is mid-transition".into(),
            ));
        }

        self.host_power.set_off()?;
        on_progress(10);

        if self.config.has_management_engine {
            self.me.enter_recovery_mode()?;
            self.sleeper.sleep(ME_SETTLE);
        }
        on_progress(20);

        let write_result = self.write_with_mux_held(image, &mut on_progress);

        if self.config.has_management_engine {
            self.me.cold_reset()?;
            self.sleeper.sleep(ME_SETTLE);
        }

        if let Err(e) = self.host_power.restore(previous_state) {
            log::error!("failed to restore host power state: {e}");
        }

        write_result
    }

    fn write_with_mux_held(
        &self,
        image: &[u8],
        on_progress: &mut impl FnMut(u8),
    ) -> Result<(), DeviceError> {
        let mux = GpioGuard::acquire(self.gpio, self.config.mux_gpio.clone())?;
        mux.drive(true)?;

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
            let result = self.write_image(image, &mtd_device, on_progress);

            let nor_unbind = format!("bus/spi/drivers/{}/unbind", self.config.nor_driver);
            self.sysfs.unbind(&nor_unbind, &self.config.nor_driver).ok();
            result
        })();

        mux.drive(false)?;
        result
    }

    fn write_image(
        &self,
        image: &[u8],
        mtd_device: &str,
        on_progress: &mut impl FnMut(u8),
    ) -> Result<(), DeviceError> {
        write_via_tool(self.config.tool, image, mtd_device, self.commands, on_progress)
    }
}

/// Dispatches to the configured write tool (spec.md 4.3 step 7). Shared
/// with the PCIe-switch device, which writes to a different MTD target
/// with no host-power step but the identical tool choices.
pub fn write_via_tool(
    tool: WriteTool,
    image: &[u8],
    mtd_device: &str,
    commands: &dyn CommandRunner,
    on_progress: &mut impl FnMut(u8),
) -> Result<(), DeviceError> {
    match tool {
        WriteTool::Ifd => Err(DeviceError::Unsupported(
            "IFD layout is not supported; use Flat, Flashcp, or raw write".into(),
        )),
        WriteTool::Flat => {
            let tempfile = tempfile::NamedTempFile::new()
                .map_err(|e| DeviceError::Other(format!("tempfile creation failed: {e}")))?;
            std::fs::write(tempfile.path(), image)
                .map_err(|e| DeviceError::Other(format!("tempfile write failed: {e}")))?;
            commands.run(
                "flashrom",
                &[
                    "-p",
                    &format!("linux_mtd:dev={mtd_device}"),
                    "-w",
                    &tempfile.path().to_string_lossy(),
                ],
            )?;
            on_progress(90);
            Ok(())
        }
        WriteTool::Flashcp => {
            let tempfile = tempfile::NamedTempFile::new()
                .map_err(|e| DeviceError::Other(format!("tempfile creation failed: {e}")))?;
            std::fs::write(tempfile.path(), image)
                .map_err(|e| DeviceError::Other(format!("tempfile write failed: {e}")))?;
            commands.run(
                "flashcp",
                &[
                    "-v",
                    &tempfile.path().to_string_lossy(),
                    &format!("/dev/{mtd_device}"),
                ],
            )?;
            on_progress(90);
            Ok(())
        }
        WriteTool::None => write_raw(image, mtd_device, commands, on_progress),
    }
}

impl<'a> fwupd_core::DriverDispatch for SpiBiosDriver<'a> {
    fn update_firmware(
        &mut self,
        image_bytes: &[u8],
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<(), DeviceError> {
        SpiBiosDriver::update_firmware(self, image_bytes, on_progress)
    }
}

fn write_raw(
    image: &[u8],
    mtd_device: &str,
    _commands: &dyn CommandRunner,
    on_progress: &mut impl FnMut(u8),
) -> Result<(), DeviceError> {
    let path = Path::new("/dev").join(mtd_device);
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .map_err(|e| DeviceError::Other(format!("open {} failed: {e}", path.display())))?;

    let total = image.len().max(1);
    let mut written = 0usize;
    for chunk in image.chunks(RAW_CHUNK) {
        file.write_all(chunk)
            .map_err(|e| DeviceError::Other(format!("write to {} failed: {e}", path.display())))?;
        written += chunk.len();
        let frac = written as f64 / total as f64;
        on_progress(30 + (frac * 60.0) as u8);
    }
    Ok(())
}
