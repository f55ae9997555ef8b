// Licensed under the Apache-2.0 license

//! Infineon XDPE1x2xx/XDPE19283 family driver (spec.md 4.4.1), grounded on
//! `original_source/i2c-vr/xdpe1x2xx/xdpe1x2xx.cpp`.
//!
//! Firmware ships as an ASCII `.mic` file: `//`-prefixed comments, an
//! `PMBus Address :` / `Checksum :` header, and a `[Configuration Data]` /
//! `[End Configuration Data]` block of `<offset> <dword> <dword> ...` lines.
//! An offset of `0` starts a new section whose first dword is the section
//! type; type `0x02` ("trim") is dropped entirely. Each section's header
//! dwords `[0, 1]` CRC to dword `[2]`, and its body dwords `[3 .. n-1]` CRC
//! to the last dword; the sum of every section's two sub-CRCs must equal
//! the file's declared `Checksum`.

use std::time::Duration;

use fwupd_core::collab::Sleeper;
use fwupd_core::error::DeviceError;

use crate::crc::crc32_dwords;
use crate::driver::{VrDriver, VrImage};
use crate::transport::I2cTransport;

const PMBUS_IC_DEVICE_ID: u8 = 0xAD;
const PMBUS_STS_CML: u8 = 0x7E;
const IFX_MFR_AHB_ADDR: u8 = 0xCE;
const IFX_MFR_REG_WRITE: u8 = 0xDE;
const IFX_MFR_FW_CMD_DATA: u8 = 0xFD;
const IFX_MFR_FW_CMD: u8 = 0xFE;
const MFR_FW_CMD_RMNG: u8 = 0x10;
const MFR_FW_CMD_GET_HW_ADDRESS: u8 = 0x2E;
const MFR_FW_CMD_OTP_CONF_STO: u8 = 0x11;
const MFR_FW_CMD_OTP_FILE_INVD: u8 = 0x12;
const MFR_FW_CMD_GET_CRC: u8 = 0x2D;
const SECT_TRIM: u8 = 0x02;
const VR_WARN_REMAINING: u8 = 3;

const MFR_DEFAULT_WAIT: Duration = Duration::from_millis(20);
const MFR_GET_HW_ADDRESS_WAIT: Duration = Duration::from_millis(5);
const MFR_OTP_FILE_INVALIDATION_WAIT: Duration = Duration::from_millis(100);
const MFR_SECTION_INVALIDATION_WAIT: Duration = Duration::from_millis(4);

const ADDRESS_FIELD: &str = "PMBus Address :";
const CHECKSUM_FIELD: &str = "Checksum :";
const DATA_START_TAG: &str = "[Configuration Data]";
const DATA_END_TAG: &str = "[End Configuration Data]";

#[derive(Debug, Clone)]
struct ConfigSection {
    sect_type: u8,
    data: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct XdpeImage {
    sum_expected: u32,
    sections: Vec<ConfigSection>,
}

impl VrImage for XdpeImage {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn parse_hex(token: &str) -> Result<u32, DeviceError> {
    u32::from_str_radix(token.trim_start_matches("0x"), 16)
        .map_err(|_| DeviceError::InvalidImage(format!("not a hex token: {token}")))
}

/// Parse a `.mic` file's `[Configuration Data]` block into sections, without
/// checking any CRCs.
fn parse_mic(text: &str) -> Result<XdpeImage, DeviceError> {
    let mut sum_expected = None;
    let mut in_data = false;
    let mut sections: Vec<ConfigSection> = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.trim_start().starts_with("//") {
            continue;
        }
        if line.trim() == DATA_END_TAG {
            break;
        }
        if !in_data {
            if let Some(idx) = line.find(ADDRESS_FIELD) {
                let _ = &line[idx..]; // address is informational only, not used to verify
            } else if let Some(idx) = line.find(CHECKSUM_FIELD) {
                if let Some(hex_start) = line[idx..].find("0x") {
                    sum_expected = Some(parse_hex(&line[idx + hex_start..])?);
                }
            } else if line.trim() == DATA_START_TAG {
                in_data = true;
            }
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let offset = u16::from_str_radix(tokens[0].trim_start_matches("0x"), 16)
            .map_err(|_| DeviceError::InvalidImage(format!("bad offset: {}", tokens[0])))?;

        if offset == 0 {
            let sect_type = (parse_hex(tokens.get(1).copied().unwrap_or("0"))? & 0xFF) as u8;
            if sect_type == SECT_TRIM {
                continue;
            }
            sections.push(ConfigSection {
                sect_type,
                data: Vec::new(),
            });
        }

        let Some(section) = sections.last_mut() else {
            continue;
        };
        if section.sect_type == SECT_TRIM {
            continue;
        }
        for token in tokens.iter().skip(1) {
            section.data.push(parse_hex(token)?);
        }
    }

    let sum_expected = sum_expected
        .ok_or_else(|| DeviceError::InvalidImage("missing Checksum field".into()))?;
    if sections.is_empty() {
        return Err(DeviceError::InvalidImage(
            "no configuration sections parsed".into(),
        ));
    }
    Ok(XdpeImage {
        sum_expected,
        sections,
    })
}

/// Verify every section's header/body sub-CRCs and their sum against the
/// file's declared checksum (spec.md 4.4.1, 8: image integrity invariant).
fn check_image(image: &XdpeImage) -> Result<(), DeviceError> {
    let mut sum: u32 = 0;
    for (i, section) in image.sections.iter().enumerate() {
        if section.data.len() < 4 {
            return Err(DeviceError::InvalidImage(format!(
                "section {i} too short to carry header/body CRCs"
            )));
        }
        let header_crc = crc32_dwords(&section.data[0..2]);
        if header_crc != section.data[2] {
            return Err(DeviceError::CrcMismatch {
                expected: section.data[2],
                actual: header_crc,
            });
        }
        sum = sum.wrapping_add(header_crc);

        let body = &section.data[3..section.data.len() - 1];
        let body_crc = crc32_dwords(body);
        if body_crc != *section.data.last().unwrap() {
            return Err(DeviceError::CrcMismatch {
                expected: *section.data.last().unwrap(),
                actual: body_crc,
            });
        }
        sum = sum.wrapping_add(body_crc);
    }
    if sum != image.sum_expected {
        return Err(DeviceError::CrcMismatch {
            expected: image.sum_expected,
            actual: sum,
        });
    }
    Ok(())
}

pub struct Xdpe1x2xx<'a, T: I2cTransport> {
    transport: T,
    sleeper: &'a dyn Sleeper,
}

impl<'a, T: I2cTransport> Xdpe1x2xx<'a, T> {
    pub fn new(transport: T, sleeper: &'a dyn Sleeper) -> Self {
        Self { transport, sleeper }
    }

    fn mfr_fw_cmd(
        &self,
        cmd: u8,
        wait: Duration,
        data: Option<[u8; 4]>,
        want_resp: bool,
    ) -> Result<Option<[u8; 4]>, DeviceError> {
        if let Some(payload) = data {
            let mut tx = vec![IFX_MFR_FW_CMD_DATA, 4];
            tx.extend_from_slice(&payload);
            self.transport.send_receive(&tx, 0)?;
        }
        self.transport.send_receive(&[IFX_MFR_FW_CMD, cmd], 0)?;
        self.sleeper.sleep(wait);

        if want_resp {
            let rx = self.transport.send_receive(&[IFX_MFR_FW_CMD_DATA], 6)?;
            if rx.first() != Some(&4) {
                return Err(DeviceError::Other(
                    "unexpected MFR_FW response block size".into(),
                ));
            }
            Ok(Some([rx[1], rx[2], rx[3], rx[4]]))
        } else {
            Ok(None)
        }
    }

    fn remaining_writes(&self) -> Result<u8, DeviceError> {
        let resp = self
            .mfr_fw_cmd(MFR_FW_CMD_RMNG, MFR_DEFAULT_WAIT, None, true)?
            .ok_or_else(|| DeviceError::Other("no response to remaining-writes query".into()))?;
        let remaining_units = u16::from_le_bytes([resp[0], resp[1]]);
        Ok((remaining_units / 8) as u8)
    }

    fn scratch_pad_address(&self) -> Result<u32, DeviceError> {
        let resp = self
            .mfr_fw_cmd(
                MFR_FW_CMD_GET_HW_ADDRESS,
                MFR_GET_HW_ADDRESS_WAIT,
                Some([0x02, 0x00, 0x00, 0x00]),
                true,
            )?
            .ok_or_else(|| DeviceError::Other("no response to scratchpad address query".into()))?;
        Ok(u32::from_le_bytes(resp))
    }
}

impl<'a, T: I2cTransport> VrDriver for Xdpe1x2xx<'a, T> {
    fn verify_image(&self, image_bytes: &[u8]) -> Result<Box<dyn VrImage>, DeviceError> {
        let text = std::str::from_utf8(image_bytes)
            .map_err(|_| DeviceError::InvalidImage("mic file is not valid utf-8".into()))?;
        let image = parse_mic(text)?;
        check_image(&image)?;
        Ok(Box::new(image))
    }

    fn update_firmware(&mut self, image: &dyn VrImage, force: bool) -> Result<(), DeviceError> {
        let image = image
            .as_any()
            .downcast_ref::<XdpeImage>()
            .ok_or_else(|| DeviceError::Other("image was not verified by this driver".into()))?;

        let current_crc = self.get_crc()?;
        if !force && current_crc == image.sum_expected {
            return Err(DeviceError::AlreadyUpToDate);
        }

        let remaining = self.remaining_writes()?;
        if remaining == 0 {
            return Err(DeviceError::WritesExhausted);
        }
        if !force && remaining <= VR_WARN_REMAINING {
            return Err(DeviceError::LowWriteBudget {
                remaining: remaining as u32,
            });
        }

        self.mfr_fw_cmd(
            MFR_FW_CMD_OTP_FILE_INVD,
            MFR_OTP_FILE_INVALIDATION_WAIT,
            Some([0xFE, 0xFE, 0x00, 0x00]),
            false,
        )?;

        let scratch_pad = self.scratch_pad_address()?;
        let mut i = 0;
        while i < image.sections.len() {
            let section = &image.sections[i];

            self.transport
                .send_receive(&[PMBUS_STS_CML, 0x01], 0)?;
            self.mfr_fw_cmd(
                MFR_FW_CMD_OTP_FILE_INVD,
                MFR_SECTION_INVALIDATION_WAIT,
                Some([section.sect_type, 0x00, 0x00, 0x00]),
                false,
            )?;
            let addr_bytes = scratch_pad.to_le_bytes();
            self.transport.send_receive(
                &[
                    IFX_MFR_AHB_ADDR,
                    4,
                    addr_bytes[0],
                    addr_bytes[1],
                    addr_bytes[2],
                    addr_bytes[3],
                ],
                0,
            )?;
            self.sleeper.sleep(Duration::from_micros(10_000));

            let mut written_bytes = 0usize;
            for dword in &section.data {
                let bytes = dword.to_le_bytes();
                self.transport.send_receive(
                    &[IFX_MFR_REG_WRITE, 4, bytes[0], bytes[1], bytes[2], bytes[3]],
                    0,
                )?;
                self.sleeper.sleep(Duration::from_millis(10));
            }
            written_bytes += section.data.len() * 4;

            let soak = Duration::from_millis(100 * ((written_bytes as u64 / 50) + 2));
            let size_bytes = (written_bytes as u16).to_le_bytes();
            self.mfr_fw_cmd(
                MFR_FW_CMD_OTP_CONF_STO,
                soak,
                Some([size_bytes[0], size_bytes[1], 0x00, 0x00]),
                false,
            )?;

            let status = self.transport.send_receive(&[PMBUS_STS_CML], 1)?;
            if status.first().is_some_and(|b| b & 0x01 != 0) {
                return Err(DeviceError::Refused {
                    cmd: PMBUS_STS_CML,
                    reason: "STATUS_CML fault bit set after programming".into(),
                });
            }
            i += 1;
        }

        Ok(())
    }

    fn get_crc(&self) -> Result<u32, DeviceError> {
        let resp = self
            .mfr_fw_cmd(MFR_FW_CMD_GET_CRC, MFR_DEFAULT_WAIT, None, true)?
            .ok_or_else(|| DeviceError::Other("no response to CRC query".into()))?;
        Ok(u32::from_le_bytes(resp))
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.transport
            .send_receive(&[PMBUS_IC_DEVICE_ID, 0x02], 0)?;
        Ok(())
    }

    fn forced_update_allowed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_core::collab::NullSleeper;

    const SAMPLE_MIC: &str = "\
// generated\nPMBus Address : 0x40\nChecksum : 0xCHECKSUM\n[Configuration Data]\n0x0000 0x01 0xAAAAAAAA 0xCRC1\n0x0004 0xBBBBBBBB 0xCRC2\n[End Configuration Data]\n";

    fn sample_with_real_crcs() -> String {
        let header = [1u32, 0xAAAA_AAAA];
        let header_crc = crc32_dwords(&header);
        let body = [0xBBBB_BBBBu32];
        let body_crc = crc32_dwords(&body);
        let sum = header_crc.wrapping_add(body_crc);
        format!(
            "// generated\nPMBus Address : 0x40\nChecksum : 0x{sum:08X}\n[Configuration Data]\n0x0000 0x01 0xAAAAAAAA 0x{header_crc:08X}\n0x0004 0xBBBBBBBB 0x{body_crc:08X}\n[End Configuration Data]\n"
        )
    }

    #[test]
    fn rejects_an_image_with_a_bad_checksum() {
        let driver = Xdpe1x2xx::new(NoopTransport, &NullSleeper);
        let err = driver.verify_image(SAMPLE_MIC.as_bytes()).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidImage(_) | DeviceError::CrcMismatch { .. }));
    }

    #[test]
    fn accepts_an_image_whose_section_crcs_match() {
        let driver = Xdpe1x2xx::new(NoopTransport, &NullSleeper);
        let text = sample_with_real_crcs();
        driver.verify_image(text.as_bytes()).expect("crc-valid image should verify");
    }

    struct NoopTransport;
    impl I2cTransport for NoopTransport {
        fn bus(&self) -> u8 {
            0
        }
        fn address(&self) -> u8 {
            0x40
        }
        fn send_receive(
            &self,
            _tx: &[u8],
            rx_len: usize,
        ) -> Result<Vec<u8>, fwupd_core::error::TransportError> {
            Ok(vec![0u8; rx_len])
        }
    }
}
