// Licensed under the Apache-2.0 license

//! The update pipeline (spec.md 4.1): package ingestion shared by every
//! domain, then per-domain dispatch -- [`bmc::BmcUpdateManager`] for the
//! BMC domain's redundancy arbiter, [`manager::UpdateManager`] for every
//! device-driver domain (BIOS, VR, EEPROM, PCIe-switch, TPM).

pub mod bmc;
pub mod dispatch;
pub mod extract;
pub mod manager;

pub use bmc::BmcUpdateManager;
pub use dispatch::VrDispatch;
pub use extract::{extract_package, ExtractedPackage};
pub use manager::UpdateManager;
