// Licensed under the Apache-2.0 license

//! AT24-family EEPROM device (spec.md 4.5), grounded on
//! `original_source/eeprom-device/eeprom_device.cpp`: mux, bind, `dd`-write,
//! unbind, with version discovery driven by a notify-watch on host state.

pub mod config;
pub mod driver;
pub mod watch;

pub use config::EepromConfig;
pub use driver::EepromDriver;
pub use watch::{run_watch_loop, VersionProvider};
