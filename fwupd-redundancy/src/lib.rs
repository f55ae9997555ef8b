// Licensed under the Apache-2.0 license

//! The ItemUpdater / redundancy arbiter for the BMC domain (spec.md 4.2),
//! grounded on `item_updater.cpp`, `bmc/item_updater_helper.hpp`, and
//! `serialize.cpp` in `examples/original_source/`.

pub mod manager;
pub mod persist;

pub use manager::{BmcRedundancyManager, MAX_ACTIVE_BMC};
pub use persist::PersistedRecord;
