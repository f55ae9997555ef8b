// Licensed under the Apache-2.0 license

//! `BmcRedundancyManager`: the ItemUpdater operations from spec.md 4.2,
//! grounded on `item_updater.cpp`'s `createActivation` dispatch and
//! `bmc/item_updater_helper.hpp`'s `Helper` (uboot mirroring, factory
//! reset). Persistence is delegated to [`crate::persist`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fwupd_core::collab::{JobOutcome, SystemdUnitStarter, UbootEnv};
use fwupd_core::manifest::Purpose;
use fwupd_software::Software;

use crate::persist;

/// spec.md 4.2: "enforce that at most MAX_ACTIVE_BMC active versions exist".
pub const MAX_ACTIVE_BMC: usize = 2;

/// Required artifacts for a BMC activation (spec.md 4.1 §6: "image-kernel,
/// image-rofs, image-rwfs, image-u-boot required").
const REQUIRED_ARTIFACTS: [&str; 4] = [
    "image-kernel",
    "image-rofs",
    "image-rwfs",
    "image-u-boot",
];

pub struct BmcVersion {
    pub software: Software,
    pub priority: u8,
    /// The currently-running image never gets deleted by `free_space`/
    /// `delete_all` (spec.md 4.2: "Never delete the functional version").
    pub functional: bool,
}

/// State the RW/RO job-completion callbacks need to reach back into, kept
/// behind a mutex rather than owned directly by `BmcRedundancyManager` so
/// the `'static` closures `request_activation` hands to
/// [`SystemdUnitStarter::start_unit`] can call back into it from any
/// thread, the way `item_updater_helper.hpp`'s `Helper` is reached from a
/// match callback that outlives the call that installed it.
struct Inner {
    persist_root: PathBuf,
    uboot: Box<dyn UbootEnv>,
    versions: HashMap<String, BmcVersion>,
}

impl Inner {
    /// Call once both RW and RO units have reported `Done` (spec.md 4.2:
    /// "both volumes -> priority-set -> uboot-env-updated -> Active").
    fn on_both_volumes_ready(&mut self, id: &str) {
        let Some(entry) = self.versions.get(id) else {
            return;
        };
        let priority = entry.priority;
        if let Some(entry) = self.versions.get_mut(id) {
            entry.software.report_progress(70).ok();
        }
        self.save_priority(id, priority);
        self.uboot.write("bmc_version", id).ok();
        if let Some(entry) = self.versions.get_mut(id) {
            entry.software.driver_succeeded().ok();
            entry.functional = true;
        }
    }

    fn on_unit_failed(&mut self, id: &str) {
        if let Some(entry) = self.versions.get_mut(id) {
            entry.software.driver_failed().ok();
        }
    }

    /// spec.md 4.2: persist priority to disk, and on systems so configured,
    /// to a U-Boot environment variable.
    fn save_priority(&mut self, id: &str, value: u8) {
        if let Some(entry) = self.versions.get_mut(id) {
            entry.priority = value;
        }
        if let Err(e) = persist::write_priority(&self.persist_root, id, value) {
            log::error!("failed to persist priority for {id}: {e}");
        }
        self.uboot
            .write(&format!("priority_{id}"), &value.to_string())
            .ok();
    }
}

/// Tracks how many of an activation's volume jobs have reported back, and
/// whether any of them failed; shared between the RW and RO completion
/// closures so whichever one reports second is the one that drives the
/// state transition.
#[derive(Default)]
struct JobTracker {
    remaining: u8,
    failed: bool,
}

fn on_volume_job_complete(
    inner: &Arc<Mutex<Inner>>,
    tracker: &Arc<Mutex<JobTracker>>,
    id: &str,
    outcome: JobOutcome,
) {
    let (all_reported, any_failed) = {
        let mut tracker = tracker.lock().unwrap();
        if outcome == JobOutcome::Failed {
            tracker.failed = true;
        }
        tracker.remaining = tracker.remaining.saturating_sub(1);
        (tracker.remaining == 0, tracker.failed)
    };
    if !all_reported {
        return;
    }
    let mut inner = inner.lock().unwrap();
    if any_failed {
        inner.on_unit_failed(id);
    } else {
        inner.on_both_volumes_ready(id);
    }
}

pub struct BmcRedundancyManager {
    inner: Arc<Mutex<Inner>>,
    systemd: Box<dyn SystemdUnitStarter>,
}

impl BmcRedundancyManager {
    pub fn new(
        persist_root: PathBuf,
        uboot: Box<dyn UbootEnv>,
        systemd: Box<dyn SystemdUnitStarter>,
    ) -> Self {
        let mut versions = HashMap::new();
        for (flash_id, record) in persist::scan_records(&persist_root) {
            let mut software = Software::new(flash_id.clone(), true);
            software.verify_ready().ok();
            versions.insert(
                flash_id,
                BmcVersion {
                    software,
                    priority: record.priority,
                    functional: false,
                },
            );
        }
        Self {
            inner: Arc::new(Mutex::new(Inner {
                persist_root,
                uboot,
                versions,
            })),
            systemd,
        }
    }

    pub fn versions(&self) -> VersionsGuard<'_> {
        VersionsGuard(self.inner.lock().unwrap())
    }

    /// spec.md 4.2: validate required artifacts, create the Version object,
    /// return Ready on success and Invalid if anything required is missing.
    pub fn verify_and_create_objects(
        &mut self,
        id: &str,
        version: &str,
        purpose: Purpose,
        extracted_dir: &std::path::Path,
    ) -> bool {
        for artifact in REQUIRED_ARTIFACTS {
            if !extracted_dir.join(artifact).is_file() {
                log::warn!("activation {id} missing required artifact {artifact}");
                return false;
            }
        }

        let mut software = Software::new(id.to_string(), true);
        software.set_version(version);
        software.verify_ready().ok();

        let mut inner = self.inner.lock().unwrap();
        persist::write_purpose(&inner.persist_root, id, purpose).ok();
        let priority = Self::next_priority(&inner.versions);
        inner.versions.insert(
            id.to_string(),
            BmcVersion {
                software,
                priority,
                functional: false,
            },
        );
        true
    }

    fn next_priority(versions: &HashMap<String, BmcVersion>) -> u8 {
        let used: std::collections::HashSet<u8> = versions.values().map(|v| v.priority).collect();
        (0..=u8::MAX).find(|p| !used.contains(p)).unwrap_or(0)
    }

    /// spec.md 4.2: sets the targeted Activation's requested state to
    /// Active. On entering Activating, starts the RW/RO systemd units and
    /// reacts to their completion the way `createActivation` subscribes to
    /// job-removal notifications: once both units have reported, the
    /// activation either reaches `Active` or fails, never left hanging in
    /// `Activating`.
    pub fn request_activation(&mut self, id: &str) -> bool {
        {
            let mut inner = self.inner.lock().unwrap();
            let Some(entry) = inner.versions.get_mut(id) else {
                return false;
            };
            if entry.software.request_active().is_err() {
                return false;
            }
        }

        let tracker = Arc::new(Mutex::new(JobTracker {
            remaining: 2,
            failed: false,
        }));

        let inner_rw = Arc::clone(&self.inner);
        let tracker_rw = Arc::clone(&tracker);
        let id_rw = id.to_string();
        self.systemd.start_unit(
            "flash-bmc-rw.service",
            Box::new(move |outcome: JobOutcome| {
                on_volume_job_complete(&inner_rw, &tracker_rw, &id_rw, outcome);
            }),
        );

        let inner_ro = Arc::clone(&self.inner);
        let tracker_ro = Arc::clone(&tracker);
        let id_ro = id.to_string();
        self.systemd.start_unit(
            &format!("flash-bmc-ro@{id}.service"),
            Box::new(move |outcome: JobOutcome| {
                on_volume_job_complete(&inner_ro, &tracker_ro, &id_ro, outcome);
            }),
        );
        true
    }

    /// Call once both RW and RO units have reported `Done` (spec.md 4.2:
    /// "both volumes -> priority-set -> uboot-env-updated -> Active").
    pub fn on_both_volumes_ready(&mut self, id: &str) {
        self.inner.lock().unwrap().on_both_volumes_ready(id);
    }

    pub fn on_unit_failed(&mut self, id: &str) {
        self.inner.lock().unwrap().on_unit_failed(id);
    }

    /// spec.md 4.2: persist priority to disk, and on systems so configured,
    /// to a U-Boot environment variable.
    pub fn save_priority(&mut self, id: &str, value: u8) {
        self.inner.lock().unwrap().save_priority(id, value);
    }

    /// spec.md 4.2: "for every BMC Software other than excludedId whose
    /// priority equals newValue, increment its priority by 1 (cascading as
    /// needed to keep priorities unique and dense from zero)".
    pub fn free_priority(&mut self, new_value: u8, excluded_id: &str) {
        let mut current = new_value;
        loop {
            let bumped: Vec<String> = {
                let inner = self.inner.lock().unwrap();
                inner
                    .versions
                    .iter()
                    .filter(|(id, v)| id.as_str() != excluded_id && v.priority == current)
                    .map(|(id, _)| id.clone())
                    .collect()
            };
            if bumped.is_empty() {
                break;
            }
            current += 1;
            for id in bumped {
                self.save_priority(&id, current);
            }
        }
    }

    /// spec.md 4.2: if the active-version count would exceed
    /// `MAX_ACTIVE_BMC - 1`, delete the highest-priority non-functional
    /// versions (highest priority number = least preferred) until the count
    /// drops. The functional version is never a candidate.
    pub fn free_space(&mut self) {
        loop {
            let victim = {
                let inner = self.inner.lock().unwrap();
                if inner.versions.len() <= MAX_ACTIVE_BMC.saturating_sub(1) {
                    break;
                }
                inner
                    .versions
                    .iter()
                    .filter(|(_, v)| !v.functional)
                    .max_by_key(|(_, v)| v.priority)
                    .map(|(id, _)| id.clone())
            };
            match victim {
                Some(id) => self.remove(&id),
                None => break,
            }
        }
    }

    /// spec.md 4.2: remove every non-functional BMC Software.
    pub fn delete_all(&mut self) {
        let victims: Vec<String> = {
            let inner = self.inner.lock().unwrap();
            inner
                .versions
                .iter()
                .filter(|(_, v)| !v.functional)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in victims {
            self.remove(&id);
        }
    }

    fn remove(&mut self, id: &str) {
        let persist_root = {
            let mut inner = self.inner.lock().unwrap();
            inner.versions.remove(id);
            inner.persist_root.clone()
        };
        let dir = persist_root.join(id);
        std::fs::remove_dir_all(&dir).ok();
    }

    /// spec.md 4.2: factory reset marks the RW partition for recreation on
    /// next boot via a systemd unit; RO is untouched.
    pub fn reset(&mut self) {
        self.systemd.start_unit(
            "obmc-flash-bmc-setenv@factory-reset.service",
            Box::new(|outcome| {
                log::info!("factory reset unit completed: {outcome:?}");
            }),
        );
    }
}

/// Read-only view of the current version table, held behind the same lock
/// `request_activation`'s completion callbacks use.
pub struct VersionsGuard<'a>(std::sync::MutexGuard<'a, Inner>);

impl std::ops::Deref for VersionsGuard<'_> {
    type Target = HashMap<String, BmcVersion>;
    fn deref(&self) -> &Self::Target {
        &self.0.versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_core::collab::ImmediateUnitStarter;

    struct FakeUboot(std::sync::Mutex<HashMap<String, String>>);
    impl UbootEnv for FakeUboot {
        fn read(&self, name: &str) -> Option<String> {
            self.0.lock().unwrap().get(name).cloned()
        }
        fn write(&self, name: &str, value: &str) -> Result<(), fwupd_core::DeviceError> {
            self.0
                .lock()
                .unwrap()
                .insert(name.to_string(), value.to_string());
            Ok(())
        }
    }

    fn manager() -> (BmcRedundancyManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = BmcRedundancyManager::new(
            dir.path().to_path_buf(),
            Box::new(FakeUboot(std::sync::Mutex::new(HashMap::new()))),
            Box::new(ImmediateUnitStarter),
        );
        (mgr, dir)
    }

    fn make_image(dir: &std::path::Path) {
        std::fs::create_dir_all(dir).unwrap();
        for artifact in REQUIRED_ARTIFACTS {
            std::fs::write(dir.join(artifact), b"x").unwrap();
        }
    }

    #[test]
    fn missing_artifact_is_invalid() {
        let (mut mgr, dir) = manager();
        let image_dir = dir.path().join("incomplete");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::write(image_dir.join("image-kernel"), b"x").unwrap();
        assert!(!mgr.verify_and_create_objects("bmc_1", "v1", Purpose::Bmc, &image_dir));
    }

    #[test]
    fn complete_image_reaches_ready() {
        let (mut mgr, dir) = manager();
        let image_dir = dir.path().join("complete");
        make_image(&image_dir);
        assert!(mgr.verify_and_create_objects("bmc_1", "v1", Purpose::Bmc, &image_dir));
        assert!(mgr.versions()["bmc_1"].software.updatable());
    }

    #[test]
    fn free_priority_cascades_to_keep_priorities_unique() {
        let (mut mgr, dir) = manager();
        for (id, prio) in [("bmc_1", 0u8), ("bmc_2", 1), ("bmc_3", 2)] {
            let image_dir = dir.path().join(id);
            make_image(&image_dir);
            mgr.verify_and_create_objects(id, "v1", Purpose::Bmc, &image_dir);
            mgr.save_priority(id, prio);
        }
        mgr.free_priority(0, "bmc_2");
        assert_eq!(mgr.versions()["bmc_2"].priority, 0);
        assert_eq!(mgr.versions()["bmc_1"].priority, 1);
        assert_eq!(mgr.versions()["bmc_3"].priority, 2);
    }

    #[test]
    fn free_space_never_deletes_the_functional_version() {
        let (mut mgr, dir) = manager();
        for id in ["bmc_1", "bmc_2", "bmc_3"] {
            let image_dir = dir.path().join(id);
            make_image(&image_dir);
            mgr.verify_and_create_objects(id, "v1", Purpose::Bmc, &image_dir);
        }
        mgr.inner
            .lock()
            .unwrap()
            .versions
            .get_mut("bmc_1")
            .unwrap()
            .functional = true;
        mgr.free_space();
        assert!(mgr.versions().contains_key("bmc_1"));
        assert!(mgr.versions().len() <= MAX_ACTIVE_BMC.saturating_sub(1).max(1));
    }

    #[test]
    fn delete_all_keeps_only_the_functional_version() {
        let (mut mgr, dir) = manager();
        for id in ["bmc_1", "bmc_2"] {
            let image_dir = dir.path().join(id);
            make_image(&image_dir);
            mgr.verify_and_create_objects(id, "v1", Purpose::Bmc, &image_dir);
        }
        mgr.inner
            .lock()
            .unwrap()
            .versions
            .get_mut("bmc_1")
            .unwrap()
            .functional = true;
        mgr.delete_all();
        assert_eq!(mgr.versions().len(), 1);
        assert!(mgr.versions().contains_key("bmc_1"));
    }

    #[test]
    fn activation_reaches_active_once_both_volumes_report_done() {
        let (mut mgr, dir) = manager();
        let image_dir = dir.path().join("bmc_1");
        make_image(&image_dir);
        mgr.verify_and_create_objects("bmc_1", "v1", Purpose::Bmc, &image_dir);
        assert!(mgr.request_activation("bmc_1"));
        // ImmediateUnitStarter resolves both units inline during
        // request_activation, so the activation should already be Active.
        assert!(mgr.versions()["bmc_1"].functional);
        assert_eq!(
            mgr.versions()["bmc_1"].software.state(),
            fwupd_software::activation::States::Active
        );
    }

    #[test]
    fn activation_does_not_reach_active_until_both_units_report() {
        let (mut mgr, dir) = manager();
        let image_dir = dir.path().join("bmc_1");
        make_image(&image_dir);
        mgr.verify_and_create_objects("bmc_1", "v1", Purpose::Bmc, &image_dir);

        // Drive the tracker directly rather than through request_activation,
        // which (with ImmediateUnitStarter) would resolve both units before
        // this test could observe the in-between state.
        let tracker = Arc::new(Mutex::new(JobTracker {
            remaining: 2,
            failed: false,
        }));
        on_volume_job_complete(&mgr.inner, &tracker, "bmc_1", JobOutcome::Done);
        assert!(!mgr.versions()["bmc_1"].functional);

        on_volume_job_complete(&mgr.inner, &tracker, "bmc_1", JobOutcome::Done);
        assert!(mgr.versions()["bmc_1"].functional);
    }
}
