// Licensed under the Apache-2.0 license

//! `Device`: owns at most one current and one pending `Software` (spec.md
//! 3), and enforces the single-update-in-flight invariant from spec.md 8:
//! "for any Device d, d.in_progress => no new startUpdate succeeds for d."

use std::sync::atomic::{AtomicBool, Ordering};

use fwupd_core::{DriverDispatch, SoftwareConfig};

use crate::software::Software;

/// Owns at most one current and one pending `Software`, plus the
/// family-specific driver that knows how to write an image to the actual
/// hardware (spec.md 2: "DeviceRegistry ... one of BmcDevice, SpiBios,
/// VrDriver, EepromDev, TpmDev"). The BMC domain has no per-device driver
/// here -- its activation is driven by the redundancy arbiter instead -- so
/// `driver` stays `None` for those devices.
pub struct Device<'a> {
    config: SoftwareConfig,
    in_progress: AtomicBool,
    pub software_current: Software,
    pub software_pending: Option<Software>,
    driver: Option<Box<dyn DriverDispatch + 'a>>,
}

impl<'a> Device<'a> {
    pub fn new(config: SoftwareConfig, software_current: Software) -> Self {
        Self {
            config,
            in_progress: AtomicBool::new(false),
            software_current,
            software_pending: None,
            driver: None,
        }
    }

    pub fn with_driver(mut self, driver: Box<dyn DriverDispatch + 'a>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn driver_mut(&mut self) -> Option<&mut (dyn DriverDispatch + 'a)> {
        self.driver.as_deref_mut()
    }

    /// Splits the borrow so a caller can report driver progress onto
    /// `software_current` while the driver write is still in flight,
    /// without the two overlapping `&mut self` borrows that calling
    /// `driver_mut()` and touching `software_current` separately would
    /// require.
    pub fn driver_and_software_mut(
        &mut self,
    ) -> (Option<&mut (dyn DriverDispatch + 'a)>, &mut Software) {
        (self.driver.as_deref_mut(), &mut self.software_current)
    }

    pub fn config(&self) -> &SoftwareConfig {
        &self.config
    }

    /// Attempts to claim the device for an update. Returns `true` if this
    /// call won the race; a second concurrent caller gets `false` and must
    /// surface `Unavailable` (spec.md 8 scenario 6).
    pub fn try_begin_update(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_update(&self) {
        self.in_progress.store(false, Ordering::Release);
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Promote the pending image to current on a successful Immediate/
    /// OnReset activation, dropping the previous current image (spec.md 3
    /// step 5: "softwareCurrent replaced, old version removed").
    pub fn promote_pending(&mut self) {
        if let Some(pending) = self.software_pending.take() {
            self.software_current = pending;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::Software;
    use std::collections::HashMap;

    fn config() -> SoftwareConfig {
        SoftwareConfig {
            vendor_iana: 1,
            compatible_name: "com.example.bmc".into(),
            config_type: "bmc".into(),
            config_name: "bmc".into(),
            object_path: "/xyz/openbmc_project/software/bmc".into(),
            params: HashMap::new(),
        }
    }

    #[test]
    fn only_one_caller_can_claim_an_update() {
        let dev = Device::new(config(), Software::new("bmc_1", true));
        assert!(dev.try_begin_update());
        assert!(!dev.try_begin_update());
        dev.end_update();
        assert!(dev.try_begin_update());
    }
}
