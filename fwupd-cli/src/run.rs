// Licensed under the Apache-2.0 license

//! The `run` subcommand's watch loop (spec.md AMBIENT STACK / CLI: "start
//! the long-lived service for one or more domains"). Only the BMC domain
//! is wired end to end here: its collaborators (the redundancy manager's
//! `UbootEnv`/`SystemdUnitStarter`, the pipeline's `CommandRunner`) have no
//! real-wire-protocol requirement, unlike the device-driver domains, whose
//! `GpioBackend`/`MtdResolver`/`HostPowerController` bindings are a board
//! integration concern spec.md 1 scopes out ("GPIO line libraries, I2C
//! syscalls, MTD kernel bindings ... remain abstracted behind
//! collaborator seams, never implemented for real").

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use fwupd_core::collab::{
    DirectoryWatcher, ImmediateUnitStarter, NullUbootEnv, PollingDirectoryWatcher,
    RealCommandRunner, RealSleeper,
};
use fwupd_core::config::DomainConfig;
use fwupd_core::manifest::ApplyTime;
use fwupd_pipeline::BmcUpdateManager;
use fwupd_redundancy::BmcRedundancyManager;
use log::{error, info, warn};

pub fn run(config_path: &Path, machine_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let domain = DomainConfig::from_toml_file(config_path)?;

    if domain.domain_name != "bmc" {
        return Err(format!(
            "domain {:?} has no board-integrated device driver in this build; \
             only the bmc domain can be run without board-specific GPIO/MTD bindings",
            domain.domain_name
        )
        .into());
    }

    run_bmc_domain(domain, machine_name)
}

fn run_bmc_domain(domain: DomainConfig, machine_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&domain.upload_root)?;

    let redundancy = BmcRedundancyManager::new(
        domain.persist_root.clone(),
        Box::new(NullUbootEnv),
        Box::new(ImmediateUnitStarter),
    );
    let mut manager = BmcUpdateManager::new(
        domain.upload_root.clone(),
        machine_name,
        Box::new(RealCommandRunner),
        redundancy,
    );

    info!(
        "watching {} for new BMC update packages",
        domain.upload_root.display()
    );

    let sleeper = RealSleeper;
    let mut watcher = PollingDirectoryWatcher::new(
        domain.upload_root.clone(),
        &sleeper,
        Duration::from_secs(2),
    );
    let stop = AtomicBool::new(false);

    while let Some(entry) = watcher.next_change(&stop) {
        let path: PathBuf = domain.upload_root.join(&entry);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("could not read {}: {e}", path.display());
                continue;
            }
        };
        match manager.start_update(&bytes, ApplyTime::Immediate) {
            Ok(object_path) => info!("applied update, object path {object_path}"),
            Err(e) => error!("update from {} failed: {e}", path.display()),
        }
    }

    Ok(())
}
