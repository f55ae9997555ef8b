// Licensed under the Apache-2.0 license

//! Shared primitives for the firmware update orchestrator: manifest parsing,
//! error taxonomy, on-disk configuration, and the collaborator traits that
//! abstract the IPC bus, the host's unit manager, and the byte-pipe
//! peripherals (GPIO/I2C/MTD) this crate never talks to directly.

pub mod collab;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ids;
pub mod manifest;
pub mod scratch;
pub mod sysfs;

pub use collab::{
    CommandRunner, DirectoryWatcher, HostPowerController, HostPowerState, IpcPublisher,
    JobOutcome, JobToken, ManagementEngineController, MtdResolver, PollingDirectoryWatcher,
    RealCommandRunner, RealSleeper, Sleeper, SystemdUnitStarter, UbootEnv,
};
pub use config::{DomainConfig, SoftwareConfig};
pub use dispatch::DriverDispatch;
pub use error::{DeviceError, PipelineError, TransportError};
pub use ids::get_random_software_id;
pub use manifest::{ApplyTime, Manifest, Purpose};
pub use scratch::ScratchGuard;
pub use sysfs::SysfsBind;
