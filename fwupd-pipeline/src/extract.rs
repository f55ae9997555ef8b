// Licensed under the Apache-2.0 license

//! Package ingestion shared by every domain's `UpdateManager` (spec.md 4.1
//! steps 1-6): scratch directory, external `tar` extraction, manifest
//! parse, machine-name check, rename into its final resting place. The BMC
//! domain and every device-driver domain both start from this; only what
//! happens to the extracted directory afterward (step 7 onward) differs.

use std::path::PathBuf;

use fwupd_core::collab::CommandRunner;
use fwupd_core::error::PipelineError;
use fwupd_core::ids::get_random_software_id;
use fwupd_core::manifest::Manifest;
use fwupd_core::scratch::ScratchGuard;

pub struct ExtractedPackage {
    pub update_id: String,
    pub dir: PathBuf,
    pub manifest: Manifest,
}

/// Runs spec.md 4.1 steps 1-6. `extractor` shells out to an external
/// tape-archive tool rather than reimplementing the tar format (spec.md 1:
/// "the D-Bus IPC mechanism... treated as an abstract RPC... boundary";
/// the archive format is the analogous "don't reimplement it" boundary for
/// this step).
pub fn extract_package(
    upload_root: &std::path::Path,
    running_machine_name: &str,
    image_bytes: &[u8],
    extractor: &dyn CommandRunner,
) -> Result<ExtractedPackage, PipelineError> {
    let update_id = get_random_software_id("update");
    let scratch_dir = upload_root.join(format!("scratch-{update_id}"));
    std::fs::create_dir_all(&scratch_dir)?;
    let mut guard = ScratchGuard::new(&scratch_dir);

    let archive_path = scratch_dir.join("package.tar");
    std::fs::write(&archive_path, image_bytes)?;
    extractor.run(
        "tar",
        &[
            "-xf",
            &archive_path.to_string_lossy(),
            "-C",
            &scratch_dir.to_string_lossy(),
        ],
    )?;
    std::fs::remove_file(&archive_path).ok();

    let manifest_text = std::fs::read_to_string(scratch_dir.join("MANIFEST"))?;
    let manifest = Manifest::parse(&manifest_text)?;

    if manifest.machine_name != running_machine_name {
        return Err(PipelineError::MachineMismatch {
            running: running_machine_name.to_string(),
            image: manifest.machine_name.clone(),
        });
    }

    let final_dir = upload_root.join(&update_id);
    std::fs::rename(&scratch_dir, &final_dir)?;
    guard.disarm();

    Ok(ExtractedPackage {
        update_id,
        dir: final_dir,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_core::collab::RecordingCommandRunner;

    fn fake_extractor_that_writes_manifest(contents: &'static str) -> impl CommandRunner {
        struct WritesManifest(&'static str);
        impl CommandRunner for WritesManifest {
            fn run(&self, program: &str, args: &[&str]) -> Result<(), fwupd_core::error::DeviceError> {
                assert_eq!(program, "tar");
                let dest = args[3];
                std::fs::write(std::path::Path::new(dest).join("MANIFEST"), self.0).unwrap();
                Ok(())
            }
        }
        WritesManifest(contents)
    }

    #[test]
    fn extracts_and_renames_into_final_directory() {
        let upload_root = tempfile::tempdir().unwrap();
        let extractor =
            fake_extractor_that_writes_manifest("version=v2\npurpose=BIOS\nMachineName=m1\n");
        let extracted = extract_package(upload_root.path(), "m1", b"tar bytes", &extractor).unwrap();
        assert!(extracted.dir.exists());
        assert_eq!(extracted.manifest.version, "v2");
        assert!(!upload_root.path().join(format!("scratch-{}", extracted.update_id)).exists());
    }

    #[test]
    fn mismatched_machine_name_is_rejected() {
        let upload_root = tempfile::tempdir().unwrap();
        let extractor =
            fake_extractor_that_writes_manifest("version=v2\npurpose=BIOS\nMachineName=other\n");
        let err = extract_package(upload_root.path(), "m1", b"tar bytes", &extractor).unwrap_err();
        assert!(matches!(err, PipelineError::MachineMismatch { .. }));
    }

    #[test]
    fn tar_failure_propagates_as_device_error() {
        let upload_root = tempfile::tempdir().unwrap();
        let runner = RecordingCommandRunner::new();
        // RecordingCommandRunner always succeeds but never writes MANIFEST,
        // so the subsequent read fails -- exercising the Io conversion path.
        let err = extract_package(upload_root.path(), "m1", b"tar bytes", &runner).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
