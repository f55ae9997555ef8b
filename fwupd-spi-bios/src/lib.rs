// Licensed under the Apache-2.0 license

//! Host BIOS SPI flash update device (spec.md 4.3), grounded on
//! `original_source/bios-spi/spi_device.cpp`: mux the flash away from the
//! host while it is powered off, bind the kernel's SPI controller and
//! spi-nor drivers, and write the image with the configured tool.

pub mod config;
pub mod driver;

pub use config::{SpiBiosConfig, WriteTool};
pub use driver::{write_via_tool, SpiBiosDriver};
