// Licensed under the Apache-2.0 license

//! Per-domain, on-disk configuration -- the stand-in for the "external
//! inventory" lookup spec.md 3 says `SoftwareConfig` is derived from. Loaded
//! once at startup and treated as immutable afterward, mirroring the
//! teacher's `mcu-config`/`common/config` split between a plain
//! serde-deserializable struct and the code that consumes it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One configured updatable slot, derived from inventory at startup.
/// spec.md 3: "{vendorIANA, compatibleName, configType, configName,
/// objectPath} all set; objectPath unique".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareConfig {
    pub vendor_iana: u32,
    pub compatible_name: String,
    pub config_type: String,
    pub config_name: String,
    pub object_path: String,
    /// Device-family-specific connection parameters (I2C bus/address, GPIO
    /// line names, MTD/sysfs paths, systemd unit names, ...). Each driver
    /// crate owns the keys it expects; fwupd-core does not interpret them.
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl SoftwareConfig {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Settings for one administrative domain (BMC / BIOS / VR / ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub domain_name: String,
    pub upload_root: PathBuf,
    pub persist_root: PathBuf,
    #[serde(default)]
    pub devices: Vec<SoftwareConfig>,
    /// `MAX_ACTIVE_BMC` in spec.md 4.2; unused outside the BMC domain.
    #[serde(default = "default_max_active")]
    pub max_active_versions: usize,
}

fn default_max_active() -> usize {
    2
}

impl DomainConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_toml_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_domain() {
        let toml = r#"
            domain_name = "bmc"
            upload_root = "/tmp/images"
            persist_root = "/var/lib/fwupd"

            [[devices]]
            vendor_iana = 49871
            compatible_name = "com.example.bmc"
            config_type = "bmc"
            config_name = "bmc"
            object_path = "/xyz/openbmc_project/software/bmc"
        "#;
        let cfg = DomainConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.domain_name, "bmc");
        assert_eq!(cfg.devices.len(), 1);
        assert_eq!(cfg.max_active_versions, 2);
    }

    #[test]
    fn device_params_are_free_form() {
        let toml = r#"
            domain_name = "vr"
            upload_root = "/tmp/images"
            persist_root = "/var/lib/fwupd"

            [[devices]]
            vendor_iana = 1
            compatible_name = "com.example.vr0"
            config_type = "vr-xdpe1x2xx"
            config_name = "vr0"
            object_path = "/xyz/openbmc_project/software/vr0"
            [devices.params]
            i2c_bus = "3"
            i2c_address = "0x42"
        "#;
        let cfg = DomainConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.devices[0].param("i2c_bus"), Some("3"));
    }
}
