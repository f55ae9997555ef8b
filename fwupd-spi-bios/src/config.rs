// Licensed under the Apache-2.0 license

//! Per-device configuration read out of the generic `SoftwareConfig` params
//! map (spec.md 4.3): controller driver name, GPIO lines, ME presence, and
//! which write tool to use.

use fwupd_core::config::SoftwareConfig;
use fwupd_core::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTool {
    Flat,
    Ifd,
    Flashcp,
    None,
}

impl WriteTool {
    pub fn parse(value: &str) -> Result<Self, DeviceError> {
        match value {
            "flat" => Ok(Self::Flat),
            "ifd" => Ok(Self::Ifd),
            "flashcp" => Ok(Self::Flashcp),
            "none" => Ok(Self::None),
            other => Err(DeviceError::InvalidImage(format!(
                "unknown spi-bios write tool: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpiBiosConfig {
    pub controller_driver: String,
    pub nor_driver: String,
    pub mux_gpio: String,
    pub has_management_engine: bool,
    pub tool: WriteTool,
}

impl SpiBiosConfig {
    pub fn from_software_config(config: &SoftwareConfig) -> Result<Self, DeviceError> {
        let controller_driver = config
            .param("controllerDriver")
            .ok_or_else(|| DeviceError::Other("missing controllerDriver param".into()))?
            .to_string();
        let nor_driver = config
            .param("norDriver")
            .ok_or_else(|| DeviceError::Other("missing norDriver param".into()))?
            .to_string();
        let mux_gpio = config
            .param("muxGpio")
            .ok_or_else(|| DeviceError::Other("missing muxGpio param".into()))?
            .to_string();
        let has_management_engine = config
            .param("hasManagementEngine")
            .map(|v| v == "true")
            .unwrap_or(false);
        let tool = WriteTool::parse(config.param("tool").unwrap_or("none"))?;

        Ok(Self {
            controller_driver,
            nor_driver,
            mux_gpio,
            has_management_engine,
            tool,
        })
    }
}
