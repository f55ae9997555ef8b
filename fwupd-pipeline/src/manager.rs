// Licensed under the Apache-2.0 license

//! `UpdateManager` (spec.md 4.1) for every domain except BMC itself: BIOS,
//! VR, EEPROM, PCIe-switch, TPM. Each such domain configures exactly the
//! devices `DeviceRegistry` holds; `start_update` runs spec.md 4.1's nine
//! steps against whichever one the manifest targets. The BMC domain's
//! equivalent lives in [`crate::bmc::BmcUpdateManager`], since its step 7
//! (`verifyAndCreateObjects`) is the redundancy arbiter rather than a
//! device driver.

use std::sync::atomic::{AtomicBool, Ordering};

use fwupd_core::collab::{CommandRunner, IpcPublisher};
use fwupd_core::config::DomainConfig;
use fwupd_core::error::PipelineError;
use fwupd_core::manifest::ApplyTime;
use fwupd_software::registry::DeviceRegistry;

use crate::extract::extract_package;

pub struct UpdateManager<'a> {
    domain: DomainConfig,
    running_machine_name: String,
    registry: DeviceRegistry<'a>,
    ipc: Box<dyn IpcPublisher>,
    extractor: Box<dyn CommandRunner>,
    in_progress: AtomicBool,
}

impl<'a> UpdateManager<'a> {
    pub fn new(
        domain: DomainConfig,
        running_machine_name: impl Into<String>,
        registry: DeviceRegistry<'a>,
        ipc: Box<dyn IpcPublisher>,
        extractor: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            domain,
            running_machine_name: running_machine_name.into(),
            registry,
            ipc,
            extractor,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry<'a> {
        &mut self.registry
    }

    /// spec.md 4.1 `startUpdate`: rejects a second concurrent caller with
    /// `Unavailable`, then runs `processImage` to completion. Asynchronous
    /// dispatch (spec.md: "spawns an asynchronous task") is the caller's
    /// concern -- wrap this call in `std::thread::spawn` to get the
    /// fire-and-forget semantics the IPC layer expects; this method itself
    /// is synchronous so its result can be tested directly.
    pub fn start_update(
        &mut self,
        image_bytes: &[u8],
        apply_time: ApplyTime,
    ) -> Result<String, PipelineError> {
        if self.in_progress.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::Unavailable);
        }
        let result = self.process_image(image_bytes, apply_time);
        self.in_progress.store(false, Ordering::Release);
        result
    }

    fn process_image(
        &mut self,
        image_bytes: &[u8],
        apply_time: ApplyTime,
    ) -> Result<String, PipelineError> {
        let extracted = extract_package(
            &self.domain.upload_root,
            &self.running_machine_name,
            image_bytes,
            self.extractor.as_ref(),
        )?;

        let device = self
            .registry
            .find_target(&extracted.manifest.compatible_names)
            .ok_or_else(|| PipelineError::MissingArtifact("no matching configured device".into()))?;

        if !device.try_begin_update() {
            return Err(PipelineError::Unavailable);
        }
        let object_path = device.config().object_path.clone();
        self.ipc.publish_software(&object_path);

        let outcome = (|| -> Result<(), PipelineError> {
            device.software_current.verify_ready().map_err(|_| {
                PipelineError::MissingArtifact("manifest failed Ready verification".into())
            })?;
            device
                .software_current
                .request_active()
                .map_err(|_| PipelineError::Unavailable)?;

            // Non-BMC domains package a single opaque image file named
            // `image` alongside the MANIFEST (the BMC domain instead names
            // its artifacts by role -- see fwupd-redundancy's
            // REQUIRED_ARTIFACTS).
            let image = std::fs::read(extracted.dir.join("image")).map_err(|e| {
                PipelineError::MissingArtifact(format!("could not read image artifact: {e}"))
            })?;
            let (driver, sw) = device.driver_and_software_mut();
            let driver = driver
                .ok_or_else(|| PipelineError::MissingArtifact("device has no driver bound".into()))?;
            driver
                .update_firmware(&image, &mut |p| {
                    let _ = sw.report_progress(p);
                })
                .map_err(PipelineError::from)
        })();

        match outcome {
            Ok(()) => {
                device.software_current.driver_succeeded().ok();
                if matches!(apply_time, ApplyTime::Immediate) {
                    device.promote_pending();
                }
            }
            Err(e) => {
                device.software_current.driver_failed().ok();
                device.end_update();
                self.ipc.unpublish_software(&object_path);
                return Err(e);
            }
        }
        device.end_update();
        Ok(object_path)
    }
}
