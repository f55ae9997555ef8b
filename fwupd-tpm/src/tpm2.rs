// Licensed under the Apache-2.0 license

//! TPM2 read-only version discovery (spec.md 4.6), grounded on
//! `original_source/tpm/tpm2/tpm2.cpp`: shells out to `tpm2_getcap` for
//! three fixed properties and formats the Nuvoton two-part version string.

use fwupd_core::error::DeviceError;

const MANUFACTURER_KEY: &str = "TPM2_PT_MANUFACTURER";
const FW_VER_1_KEY: &str = "TPM2_PT_FIRMWARE_VERSION_1";
const FW_VER_2_KEY: &str = "TPM2_PT_FIRMWARE_VERSION_2";

/// spec.md 4.6: "for Nuvoton, detected via manufacturer-id 0x4E544300".
const NUVOTON_MANUFACTURER_ID: u32 = 0x4E54_4300;

/// The seam over the external `tpm2_getcap properties-fixed` invocation,
/// so tests don't shell out. Returns the `raw: 0x...` hex value for a
/// given fixed-capability key.
pub trait Tpm2Capget: Send + Sync {
    fn get_value(&self, key: &str) -> Result<u32, DeviceError>;
}

/// Reads `tpm2_getcap properties-fixed` output once and answers `get_value`
/// from the cached table, matching the original's per-key `popen` calls
/// collapsed into a single invocation.
pub struct RealTpm2Capget;

impl RealTpm2Capget {
    fn run() -> Result<String, DeviceError> {
        let output = std::process::Command::new("tpm2_getcap")
            .arg("properties-fixed")
            .output()
            .map_err(|e| DeviceError::Other(format!("failed to run tpm2_getcap: {e}")))?;
        if !output.status.success() {
            return Err(DeviceError::ExternalProcess {
                program: "tpm2_getcap".to_string(),
                status: output.status.code().unwrap_or(-1),
            });
        }
        String::from_utf8(output.stdout)
            .map_err(|e| DeviceError::Other(format!("tpm2_getcap output was not utf-8: {e}")))
    }
}

impl Tpm2Capget for RealTpm2Capget {
    fn get_value(&self, key: &str) -> Result<u32, DeviceError> {
        let output = Self::run()?;
        parse_capability(&output, key)
    }
}

/// Scans `tpm2_getcap`-style output for `<key>:\n  raw: 0x<hex>` (the
/// pattern `tpm2.cpp`'s regex matches against the line following the key).
fn parse_capability(output: &str, key: &str) -> Result<u32, DeviceError> {
    let mut lines = output.lines();
    while let Some(line) = lines.next() {
        if line.trim_start().starts_with(key) {
            for candidate in lines.by_ref().take(2) {
                let trimmed = candidate.trim_start();
                if let Some(hex) = trimmed.strip_prefix("raw: 0x") {
                    return u32::from_str_radix(hex.trim(), 16)
                        .map_err(|e| DeviceError::Other(format!("bad hex value for {key}: {e}")));
                }
            }
        }
    }
    Err(DeviceError::Other(format!(
        "no matching hex value found for key: {key}"
    )))
}

fn format_version_part(raw: u32) -> String {
    format!("{}.{}", raw >> 16, raw & 0xFFFF)
}

/// spec.md 4.6: formats as `<hi>.<lo>` or, for Nuvoton,
/// `<hi1>.<lo1>.<hi2>.<lo2>`.
pub fn read_version(capget: &dyn Tpm2Capget) -> Result<String, DeviceError> {
    let manufacturer_id = capget.get_value(MANUFACTURER_KEY)?;
    let fw_ver_1 = capget.get_value(FW_VER_1_KEY)?;
    let part1 = format_version_part(fw_ver_1);

    if manufacturer_id == NUVOTON_MANUFACTURER_ID {
        let fw_ver_2 = capget.get_value(FW_VER_2_KEY)?;
        Ok(format!("{part1}.{}", format_version_part(fw_ver_2)))
    } else {
        Ok(part1)
    }
}

/// spec.md 4.6: `updateFirmware` is not supported and must return an error
/// indicating so.
pub fn update_firmware(_image: &[u8]) -> Result<(), DeviceError> {
    Err(DeviceError::Unsupported(
        "TPM2 firmware update is not supported".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeCapget(HashMap<&'static str, u32>);
    impl Tpm2Capget for FakeCapget {
        fn get_value(&self, key: &str) -> Result<u32, DeviceError> {
            self.0
                .get(key)
                .copied()
                .ok_or_else(|| DeviceError::Other(format!("no such key {key}")))
        }
    }

    #[test]
    fn parses_a_two_part_version_for_non_nuvoton() {
        let mut values = HashMap::new();
        values.insert(MANUFACTURER_KEY, 0x494E_5443);
        values.insert(FW_VER_1_KEY, 0x0001_0002);
        let version = read_version(&FakeCapget(values)).unwrap();
        assert_eq!(version, "1.2");
    }

    #[test]
    fn parses_a_four_part_version_for_nuvoton() {
        let mut values = HashMap::new();
        values.insert(MANUFACTURER_KEY, NUVOTON_MANUFACTURER_ID);
        values.insert(FW_VER_1_KEY, 0x0001_0002);
        values.insert(FW_VER_2_KEY, 0x0003_0004);
        let version = read_version(&FakeCapget(values)).unwrap();
        assert_eq!(version, "1.2.3.4");
    }

    #[test]
    fn firmware_update_is_always_rejected() {
        assert!(update_firmware(b"image").is_err());
    }

    #[test]
    fn parses_raw_hex_line_following_the_key() {
        let output = "TPM2_PT_MANUFACTURER:\n  raw: 0x4E544300\nTPM2_PT_FIRMWARE_VERSION_1:\n  raw: 0x00010002\n";
        assert_eq!(
            parse_capability(output, "TPM2_PT_MANUFACTURER").unwrap(),
            0x4E54_4300
        );
    }
}
