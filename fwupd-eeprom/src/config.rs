// Licensed under the Apache-2.0 license

//! Per-device configuration for an AT24-family EEPROM (spec.md 4.5),
//! grounded on `eeprom_device.hpp`'s `bus`/`address`/`chipModel`/`gpioLines`
//! fields.

use fwupd_core::config::SoftwareConfig;
use fwupd_core::error::DeviceError;

#[derive(Debug, Clone)]
pub struct EepromConfig {
    pub i2c_bus: u16,
    pub i2c_address: u8,
    pub chip_model: String,
    pub mux_gpio: Option<String>,
}

impl EepromConfig {
    pub fn from_software_config(config: &SoftwareConfig) -> Result<Self, DeviceError> {
        let i2c_bus = config
            .param("i2cBus")
            .ok_or_else(|| DeviceError::Other("missing i2cBus param".into()))?
            .parse()
            .map_err(|e| DeviceError::Other(format!("invalid i2cBus: {e}")))?;
        let i2c_address = parse_maybe_hex(
            config
                .param("i2cAddress")
                .ok_or_else(|| DeviceError::Other("missing i2cAddress param".into()))?,
        )?;
        let chip_model = config
            .param("chipModel")
            .unwrap_or("EEPROM_24C02")
            .to_string();
        let mux_gpio = config.param("muxGpio").map(str::to_string);

        Ok(Self {
            i2c_bus,
            i2c_address,
            chip_model,
            mux_gpio,
        })
    }

    /// `<bus>-<addr>`, the AT24 sysfs device id (`eeprom_device.cpp`'s
    /// `getI2CDeviceId`).
    pub fn i2c_device_id(&self) -> String {
        format!("{}-{:04x}", self.i2c_bus, self.i2c_address)
    }
}

fn parse_maybe_hex(value: &str) -> Result<u8, DeviceError> {
    if let Some(hex) = value.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else {
        value.parse()
    }
    .map_err(|e| DeviceError::Other(format!("invalid i2cAddress {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn device_id_is_bus_dash_hex_address() {
        let cfg = EepromConfig {
            i2c_bus: 3,
            i2c_address: 0x50,
            chip_model: "EEPROM_24C02".to_string(),
            mux_gpio: None,
        };
        assert_eq!(cfg.i2c_device_id(), "3-0050");
    }

    #[test]
    fn parses_hex_address_from_config() {
        let mut params = HashMap::new();
        params.insert("i2cBus".to_string(), "3".to_string());
        params.insert("i2cAddress".to_string(), "0x50".to_string());
        let config = SoftwareConfig {
            vendor_iana: 1,
            compatible_name: "com.example.eeprom0".into(),
            config_type: "eeprom".into(),
            config_name: "eeprom0".into(),
            object_path: "/xyz/openbmc_project/software/eeprom0".into(),
            params,
        };
        let cfg = EepromConfig::from_software_config(&config).unwrap();
        assert_eq!(cfg.i2c_address, 0x50);
    }
}
