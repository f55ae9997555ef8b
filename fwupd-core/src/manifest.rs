// Licensed under the Apache-2.0 license

//! Flat `KEY=VALUE` package manifest, grounded on `bmc/version.cpp`'s
//! `getValue`/`getRepeatedValues` and `bmc/update_manager.cpp`'s purpose
//! conversion in `examples/original_source/`.

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// When the caller wants the package applied, mirrors the
/// `xyz.openbmc_project.Software.ApplyTime.RequestedApplyTimes` enum this
/// system is distilled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyTime {
    Immediate,
    OnReset,
}

/// Which device family a package targets. Unknown values are never a parse
/// error -- spec.md 4.1 step 5 requires they map to `Unknown` with a
/// warning, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Purpose {
    Bmc,
    Bios,
    Vr,
    Eeprom,
    PcieSwitch,
    Tpm,
    Unknown,
}

impl FromStr for Purpose {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "BMC" => Purpose::Bmc,
            "BIOS" => Purpose::Bios,
            "VR" => Purpose::Vr,
            "EEPROM" => Purpose::Eeprom,
            "PCIeSwitch" => Purpose::PcieSwitch,
            "TPM" => Purpose::Tpm,
            other => {
                warn!("unrecognized manifest purpose {other:?}; treating as Unknown");
                Purpose::Unknown
            }
        })
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Purpose::Bmc => "BMC",
            Purpose::Bios => "BIOS",
            Purpose::Vr => "VR",
            Purpose::Eeprom => "EEPROM",
            Purpose::PcieSwitch => "PCIeSwitch",
            Purpose::Tpm => "TPM",
            Purpose::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A parsed `MANIFEST` file. `version`, `purpose`, and `machine_name` are
/// required keys (spec.md 4.1 step 3); `extended_version` and
/// `compatible_names` are optional and the latter may repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub purpose_raw: String,
    pub machine_name: String,
    pub extended_version: Option<String>,
    pub compatible_names: Vec<String>,
}

impl Manifest {
    pub fn purpose(&self) -> Purpose {
        self.purpose_raw.parse().unwrap()
    }

    /// Parse a flat `KEY=VALUE` manifest. CRLF terminators are stripped
    /// (spec.md 6). Lines without `=`, or that are empty, are ignored.
    pub fn parse(contents: &str) -> Result<Self, PipelineError> {
        let mut version = None;
        let mut purpose_raw = None;
        let mut machine_name = None;
        let mut extended_version = None;
        let mut compatible_names = Vec::new();

        for raw_line in contents.split('\n') {
            let line = raw_line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "version" => version = Some(value.to_string()),
                "purpose" => purpose_raw = Some(value.to_string()),
                "MachineName" => machine_name = Some(value.to_string()),
                "ExtendedVersion" => extended_version = Some(value.to_string()),
                "CompatibleName" => compatible_names.push(value.to_string()),
                _ => {}
            }
        }

        Ok(Manifest {
            version: version.ok_or_else(|| PipelineError::MissingManifestKey("version".into()))?,
            purpose_raw: purpose_raw
                .ok_or_else(|| PipelineError::MissingManifestKey("purpose".into()))?,
            machine_name: machine_name
                .ok_or_else(|| PipelineError::MissingManifestKey("MachineName".into()))?,
            extended_version,
            compatible_names,
        })
    }

    /// Serialize back to `KEY=VALUE` form. Together with `parse`, satisfies
    /// the round-trip law in spec.md 8: parse -> serialize -> re-parse is
    /// identity on {version, purpose, MachineName, ExtendedVersion,
    /// CompatibleName*}.
    pub fn to_kv_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("version={}\n", self.version));
        out.push_str(&format!("purpose={}\n", self.purpose_raw));
        out.push_str(&format!("MachineName={}\n", self.machine_name));
        if let Some(ev) = &self.extended_version {
            out.push_str(&format!("ExtendedVersion={ev}\n"));
        }
        for name in &self.compatible_names {
            out.push_str(&format!("CompatibleName={name}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_and_optional_keys() {
        let text = "version=v2\r\npurpose=BMC\r\nMachineName=m1\r\nExtendedVersion=ext\r\nCompatibleName=c1\r\nCompatibleName=c2\r\n";
        let m = Manifest::parse(text).unwrap();
        assert_eq!(m.version, "v2");
        assert_eq!(m.purpose(), Purpose::Bmc);
        assert_eq!(m.machine_name, "m1");
        assert_eq!(m.extended_version.as_deref(), Some("ext"));
        assert_eq!(m.compatible_names, vec!["c1", "c2"]);
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let text = "version=v2\npurpose=BMC\n";
        assert!(matches!(
            Manifest::parse(text),
            Err(PipelineError::MissingManifestKey(k)) if k == "MachineName"
        ));
    }

    #[test]
    fn unknown_purpose_does_not_fail_parsing() {
        let text = "version=v2\npurpose=FutureThing\nMachineName=m1\n";
        let m = Manifest::parse(text).unwrap();
        assert_eq!(m.purpose(), Purpose::Unknown);
    }

    #[test]
    fn round_trips_through_serialize_and_reparse() {
        let text = "version=v2\npurpose=VR\nMachineName=m1\nExtendedVersion=ext\nCompatibleName=c1\nCompatibleName=c2\n";
        let m = Manifest::parse(text).unwrap();
        let serialized = m.to_kv_string();
        let reparsed = Manifest::parse(&serialized).unwrap();
        assert_eq!(m, reparsed);
    }
}
