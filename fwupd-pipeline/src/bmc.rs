// Licensed under the Apache-2.0 license

//! `UpdateManager` for the BMC domain (spec.md 4.1 + 4.2): runs the same
//! package-ingestion steps every domain shares, then hands off to
//! [`fwupd_redundancy::BmcRedundancyManager`] for step 7
//! (`verifyAndCreateObjects`) and step 8 (`requestActivation`), since the
//! BMC domain's "device dispatch" is the redundancy arbiter rather than a
//! single family driver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use fwupd_core::collab::CommandRunner;
use fwupd_core::error::PipelineError;
use fwupd_core::ids::software_object_path;
use fwupd_core::manifest::ApplyTime;
use fwupd_redundancy::BmcRedundancyManager;

use crate::extract::extract_package;

pub struct BmcUpdateManager {
    upload_root: PathBuf,
    running_machine_name: String,
    extractor: Box<dyn CommandRunner>,
    redundancy: BmcRedundancyManager,
    in_progress: AtomicBool,
}

impl BmcUpdateManager {
    pub fn new(
        upload_root: PathBuf,
        running_machine_name: impl Into<String>,
        extractor: Box<dyn CommandRunner>,
        redundancy: BmcRedundancyManager,
    ) -> Self {
        Self {
            upload_root,
            running_machine_name: running_machine_name.into(),
            extractor,
            redundancy,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn redundancy(&self) -> &BmcRedundancyManager {
        &self.redundancy
    }

    pub fn redundancy_mut(&mut self) -> &mut BmcRedundancyManager {
        &mut self.redundancy
    }

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
            &self.upload_root,
            &self.running_machine_name,
            image_bytes,
            self.extractor.as_ref(),
        )?;

        let ready = self.redundancy.verify_and_create_objects(
            &extracted.update_id,
            &extracted.manifest.version,
            extracted.manifest.purpose(),
            &extracted.dir,
        );
        if !ready {
            std::fs::remove_dir_all(&extracted.dir).ok();
            return Err(PipelineError::MissingArtifact(
                "required BMC image artifact missing".into(),
            ));
        }

        if matches!(apply_time, ApplyTime::Immediate | ApplyTime::OnReset)
            && !self.redundancy.request_activation(&extracted.update_id)
        {
            return Err(PipelineError::Unavailable);
        }

        Ok(software_object_path(&extracted.update_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_core::collab::ImmediateUnitStarter;
    use fwupd_core::collab::NullUbootEnv;
    use fwupd_core::error::DeviceError;

    struct WritesBmcManifest;
    impl CommandRunner for WritesBmcManifest {
        fn run(&self, _program: &str, args: &[&str]) -> Result<(), DeviceError> {
            let dest = std::path::Path::new(args[3]);
            std::fs::write(
                dest.join("MANIFEST"),
                "version=v2\npurpose=BMC\nMachineName=m1\n",
            )
            .unwrap();
            for artifact in ["image-kernel", "image-rofs", "image-rwfs", "image-u-boot"] {
                std::fs::write(dest.join(artifact), b"x").unwrap();
            }
            Ok(())
        }
    }

    fn redundancy(persist_root: PathBuf) -> BmcRedundancyManager {
        BmcRedundancyManager::new(
            persist_root,
            Box::new(NullUbootEnv),
            Box::new(ImmediateUnitStarter),
        )
    }

    #[test]
    fn successful_bmc_update_activates_through_redundancy_manager() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = BmcUpdateManager::new(
            root.path().to_path_buf(),
            "m1",
            Box::new(WritesBmcManifest),
            redundancy(root.path().join("persist")),
        );
        let object_path = manager
            .start_update(b"tar bytes", ApplyTime::Immediate)
            .unwrap();
        assert!(object_path.starts_with("/software/update_"));
        let versions = manager.redundancy().versions();
        assert_eq!(versions.len(), 1);
        let (id, version) = versions.iter().next().unwrap();
        assert!(version.functional, "activation for {id} never reached Active");
        assert_eq!(
            version.software.state(),
            fwupd_software::activation::States::Active
        );
    }

    #[test]
    fn missing_artifact_is_rejected_and_scratch_removed() {
        struct WritesIncompleteManifest;
        impl CommandRunner for WritesIncompleteManifest {
            fn run(&self, _program: &str, args: &[&str]) -> Result<(), DeviceError> {
                let dest = std::path::Path::new(args[3]);
                std::fs::write(
                    dest.join("MANIFEST"),
                    "version=v2\npurpose=BMC\nMachineName=m1\n",
                )
                .unwrap();
                Ok(())
            }
        }

        let root = tempfile::tempdir().unwrap();
        let mut manager = BmcUpdateManager::new(
            root.path().to_path_buf(),
            "m1",
            Box::new(WritesIncompleteManifest),
            redundancy(root.path().join("persist")),
        );
        let err = manager
            .start_update(b"tar bytes", ApplyTime::Immediate)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingArtifact(_)));
        assert_eq!(manager.redundancy().versions().len(), 0);
    }
}
