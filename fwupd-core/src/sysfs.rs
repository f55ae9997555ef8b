// Licensed under the Apache-2.0 license

//! Bind/unbind helper shared between the SPI-BIOS, PCIe-switch, and EEPROM
//! drivers, all of which walk the identical sysfs `bind`/`unbind`/verify
//! sequence (spec.md 4.3 step 5, 4.5). The sysfs root is injectable so
//! tests can point it at a scratch directory instead of `/sys`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collab::Sleeper;
use crate::error::DeviceError;

pub struct SysfsBind {
    root: PathBuf,
}

impl SysfsBind {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn join(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }

    /// Write `device_name` into the driver's `bind` node, wait, then check
    /// `verify_relative` exists. The sysfs `bind`/`unbind` nodes are a
    /// process-global resource (spec.md 5): if the device is already
    /// present under `verify_relative` before we write, treat that as
    /// already-bound and recover rather than erroring.
    pub fn bind(
        &self,
        bind_relative: &str,
        device_name: &str,
        verify_relative: &str,
        wait: Duration,
        sleeper: &dyn Sleeper,
    ) -> Result<(), DeviceError> {
        if self.join(verify_relative).exists() {
            log::debug!("{device_name} already bound at {verify_relative}");
            return Ok(());
        }
        std::fs::write(self.join(bind_relative), device_name)
            .map_err(|e| DeviceError::Other(format!("bind write failed: {e}")))?;
        sleeper.sleep(wait);
        if !self.join(verify_relative).exists() {
            return Err(DeviceError::Other(format!(
                "{device_name} did not appear at {verify_relative} after bind"
            )));
        }
        Ok(())
    }

    pub fn unbind(&self, unbind_relative: &str, device_name: &str) -> Result<(), DeviceError> {
        std::fs::write(self.join(unbind_relative), device_name)
            .map_err(|e| DeviceError::Other(format!("unbind write failed: {e}")))
    }

    pub fn is_bound(&self, verify_relative: &str) -> bool {
        self.join(verify_relative).exists()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::NullSleeper;

    #[test]
    fn bind_writes_device_name_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bus/spi/drivers/spi-nor")).unwrap();
        std::fs::write(dir.path().join("bus/spi/drivers/spi-nor/bind"), "").unwrap();
        let sysfs = SysfsBind::new(dir.path());

        // Simulate the kernel creating the device node once bound.
        std::fs::create_dir_all(dir.path().join("bus/spi/drivers/spi-nor/spi0.0")).unwrap();

        sysfs
            .bind(
                "bus/spi/drivers/spi-nor/bind",
                "spi0.0",
                "bus/spi/drivers/spi-nor/spi0.0",
                Duration::from_millis(0),
                &NullSleeper,
            )
            .unwrap();

        let written =
            std::fs::read_to_string(dir.path().join("bus/spi/drivers/spi-nor/bind")).unwrap();
        assert_eq!(written, "spi0.0");
    }

    #[test]
    fn bind_fails_when_device_never_appears() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bus/spi/drivers/spi-nor")).unwrap();
        std::fs::write(dir.path().join("bus/spi/drivers/spi-nor/bind"), "").unwrap();
        let sysfs = SysfsBind::new(dir.path());

        let result = sysfs.bind(
            "bus/spi/drivers/spi-nor/bind",
            "spi0.0",
            "bus/spi/drivers/spi-nor/spi0.0",
            Duration::from_millis(0),
            &NullSleeper,
        );
        assert!(result.is_err());
    }
}
