// Licensed under the Apache-2.0 license

//! Per-device configuration for the PCIe-switch flash (supplemental
//! module, SPEC_FULL.md pcie-switch-device), read out of the same
//! `SoftwareConfig` params map the SPI-BIOS device uses.

use fwupd_core::config::SoftwareConfig;
use fwupd_core::error::DeviceError;
use fwupd_spi_bios::WriteTool;

#[derive(Debug, Clone)]
pub struct PcieSwitchConfig {
    pub controller_driver: String,
    pub nor_driver: String,
    pub mux_gpio: Option<String>,
    pub tool: WriteTool,
}

impl PcieSwitchConfig {
    pub fn from_software_config(config: &SoftwareConfig) -> Result<Self, DeviceError> {
        let controller_driver = config
            .param("controllerDriver")
            .ok_or_else(|| DeviceError::Other("missing controllerDriver param".into()))?
            .to_string();
        let nor_driver = config
            .param("norDriver")
            .ok_or_else(|| DeviceError::Other("missing norDriver param".into()))?
            .to_string();
        let mux_gpio = config.param("muxGpio").map(|v| v.to_string());
        let tool = WriteTool::parse(config.param("tool").unwrap_or("none"))?;

        Ok(Self {
            controller_driver,
            nor_driver,
            mux_gpio,
            tool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_core::config::SoftwareConfig;
    use std::collections::HashMap;

    fn base_config(params: HashMap<String, String>) -> SoftwareConfig {
        SoftwareConfig {
            vendor_iana: 49871,
            compatible_name: "com.example.pciesw".to_string(),
            config_type: "pcie-switch".to_string(),
            config_name: "pciesw0".to_string(),
            object_path: "/xyz/openbmc_project/software/pciesw0".to_string(),
            params,
        }
    }

    #[test]
    fn mux_gpio_is_optional() {
        let params = HashMap::from([
            ("controllerDriver".to_string(), "pciesw-spi".to_string()),
            ("norDriver".to_string(), "spi1.0".to_string()),
        ]);
        let parsed = PcieSwitchConfig::from_software_config(&base_config(params)).unwrap();
        assert!(parsed.mux_gpio.is_none());
    }

    #[test]
    fn missing_nor_driver_is_rejected() {
        let params = HashMap::from([(
            "controllerDriver".to_string(),
            "pciesw-spi".to_string(),
        )]);
        assert!(PcieSwitchConfig::from_software_config(&base_config(params)).is_err());
    }
}
