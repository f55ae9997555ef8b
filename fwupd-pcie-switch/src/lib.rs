// Licensed under the Apache-2.0 license

//! PCIe-switch SPI flash update device (supplemental module, SPEC_FULL.md
//! pcie-switch-device), grounded on `original_source/pcieswitch/spi_device.cpp`
//! and reusing the SPI-BIOS device's bind/write machinery, since the switch's
//! flash is wired up the same way minus the host-power step.

pub mod config;
pub mod driver;

pub use config::PcieSwitchConfig;
pub use driver::PcieSwitchDriver;
