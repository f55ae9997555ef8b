// Licensed under the Apache-2.0 license

//! TI TDA38640A driver (spec.md 4.4.4), grounded on
//! `original_source/i2c-vr/tda38640a/tda38640a.cpp`.
//!
//! Firmware ships as an ASCII file with a `Part Number :` line (its last
//! hex digit is the expected silicon revision), a `Configuration Checksum
//! :` line, and a `[Configuration Data]` block of alternating offset/data
//! lines. Programming writes only the registers present in a fixed OTP
//! whitelist, 16 bytes at a time per page, then issues a commit command
//! and polls a done/error status bit.

use std::collections::HashSet;
use std::time::Duration;

use fwupd_core::collab::Sleeper;
use fwupd_core::error::DeviceError;

use crate::driver::{VrDriver, VrImage};
use crate::transport::I2cTransport;

const CRC_LOW_REG: u8 = 0xB0;
const CRC_HIGH_REG: u8 = 0xAE;
const USER_WR_REMAIN: u8 = 0xB8;
const UNLOCK_REGS_REG: u8 = 0xD4;
const UNLOCK_REGS_VAL: u8 = 0x03;
const PROG_CMD_LOW_REG: u8 = 0xD6;
const PROG_CMD_HIGH_REG: u8 = 0xD7;
const PROG_CMD_LOW_VAL: u8 = 0x42;
const PROG_CMD_HIGH_VAL: u8 = 0x3F;
const REVISION_REG: u8 = 0xFD;
const PAGE_REG: u8 = 0xFF;

const NVM_DONE_MASK: u8 = 0x80;
const NVM_ERROR_MASK: u8 = 0x40;
const PROG_NVM_DELAY: Duration = Duration::from_millis(300);
const PROG_STATUS_RETRIES: u8 = 3;

const USER_SECTION_OTP_REGISTERS: &[u16] = &[
    0x0040, 0x0041, 0x0042, 0x0043, 0x0044, 0x0045, 0x0046, 0x0047, 0x0048, 0x0049, 0x004A,
    0x004B, 0x004C, 0x004D, 0x004E, 0x004F, 0x0050, 0x0051, 0x0052, 0x0053, 0x0054, 0x0055,
    0x0056, 0x0057, 0x0058, 0x0059, 0x005A, 0x005B, 0x005C, 0x005D, 0x005E, 0x005F, 0x0060,
    0x0061, 0x0062, 0x0063, 0x0064, 0x0065, 0x0066, 0x0067, 0x0068, 0x0069, 0x006A, 0x006B,
    0x006C, 0x006D, 0x006E, 0x006F, 0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075, 0x0076,
    0x0077, 0x0078, 0x0079, 0x007A, 0x007B, 0x0202, 0x0204, 0x0220, 0x0240, 0x0242, 0x0243,
    0x0248, 0x0249, 0x024A, 0x024B, 0x024C, 0x024D, 0x024E, 0x024F, 0x0250, 0x0251, 0x0252,
    0x0256, 0x0257, 0x0266, 0x0267, 0x026A, 0x026C, 0x0270, 0x0272, 0x0273, 0x0280, 0x0281,
    0x0282, 0x0288, 0x0289, 0x028A, 0x028C, 0x028D, 0x028E, 0x029E, 0x02A0, 0x02A2, 0x02AA,
    0x02AB, 0x02AC, 0x02BC, 0x02BD, 0x02BE, 0x02BF, 0x02C0, 0x02C2, 0x02C8, 0x02CA, 0x0384,
    0x0385,
];

#[derive(Debug, Clone)]
pub struct TdaImage {
    rev: u8,
    checksum_expected: u32,
    offsets: Vec<u16>,
    data: Vec<Vec<u8>>,
}

impl VrImage for TdaImage {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn parse_image(text: &str) -> Result<TdaImage, DeviceError> {
    let mut rev = None;
    let mut checksum_expected = None;
    let mut offsets = Vec::new();
    let mut data = Vec::new();
    let mut in_data = false;

    for raw_line in text.lines() {
        let line = raw_line.trim_end_matches('\r');

        if let Some(idx) = line.find("Part Number :") {
            let _ = idx;
            if let Some(last) = line.trim_end().chars().last() {
                rev = u8::from_str_radix(&last.to_string(), 16).ok();
            }
        }
        if let Some(idx) = line.find("Configuration Checksum :") {
            let _ = idx;
            if let Some(hex_start) = line.find("0x") {
                checksum_expected = u32::from_str_radix(&line[hex_start + 2..], 16).ok();
            }
        }
        if line.contains("[Configuration Data]") {
            in_data = true;
            continue;
        }
        if line.contains("[End Configuration Data]") {
            break;
        }
        if in_data && !line.trim().is_empty() {
            let mut row_data = Vec::new();
            for seg in line.split_whitespace() {
                if seg.len() == 2 {
                    let byte = u8::from_str_radix(seg, 16)
                        .map_err(|_| DeviceError::InvalidImage(format!("bad data byte: {seg}")))?;
                    row_data.push(byte);
                } else {
                    let offset = u16::from_str_radix(seg, 16)
                        .map_err(|_| DeviceError::InvalidImage(format!("bad offset: {seg}")))?;
                    offsets.push(offset);
                }
            }
            data.push(row_data);
        }
    }

    if offsets.len() != data.len() {
        return Err(DeviceError::InvalidImage(
            "offset/data line count mismatch".into(),
        ));
    }

    Ok(TdaImage {
        rev: rev.ok_or_else(|| DeviceError::InvalidImage("missing Part Number line".into()))?,
        checksum_expected: checksum_expected
            .ok_or_else(|| DeviceError::InvalidImage("missing Configuration Checksum line".into()))?,
        offsets,
        data,
    })
}

pub struct Tda38640a<'a, T: I2cTransport> {
    transport: T,
    sleeper: &'a dyn Sleeper,
    otp_whitelist: HashSet<u16>,
}

impl<'a, T: I2cTransport> Tda38640a<'a, T> {
    pub fn new(transport: T, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            transport,
            sleeper,
            otp_whitelist: USER_SECTION_OTP_REGISTERS.iter().copied().collect(),
        }
    }

    fn set_page(&self, page: u8) -> Result<(), DeviceError> {
        self.transport.send_receive(&[PAGE_REG, page], 0)?;
        Ok(())
    }

    fn user_remaining_writes(&self) -> Result<u8, DeviceError> {
        self.set_page(0)?;
        let rx = self.transport.send_receive(&[USER_WR_REMAIN], 2)?;
        let remain_bits = u16::from_le_bytes([rx[0], rx[1]]);
        Ok(16 - remain_bits.count_ones() as u8)
    }

    fn device_revision(&self) -> Result<u8, DeviceError> {
        self.set_page(0)?;
        Ok(self.transport.send_receive(&[REVISION_REG], 1)?[0])
    }

    fn unlock(&self) -> Result<(), DeviceError> {
        self.transport
            .send_receive(&[UNLOCK_REGS_REG, UNLOCK_REGS_VAL], 0)?;
        Ok(())
    }

    fn programming_cmd(&self) -> Result<(), DeviceError> {
        self.set_page(0)?;
        self.transport
            .send_receive(&[PROG_CMD_HIGH_REG, PROG_CMD_HIGH_VAL], 0)?;
        self.transport
            .send_receive(&[PROG_CMD_LOW_REG, PROG_CMD_LOW_VAL], 0)?;
        Ok(())
    }

    fn prog_status(&self) -> Result<u8, DeviceError> {
        Ok(self.transport.send_receive(&[PROG_CMD_HIGH_REG], 1)?[0])
    }
}

impl<'a, T: I2cTransport> VrDriver for Tda38640a<'a, T> {
    fn verify_image(&self, image_bytes: &[u8]) -> Result<Box<dyn VrImage>, DeviceError> {
        let text = std::str::from_utf8(image_bytes)
            .map_err(|_| DeviceError::InvalidImage("config file is not valid utf-8".into()))?;
        let image = parse_image(text)?;

        let remain = self.user_remaining_writes()?;
        if remain == 0 {
            return Err(DeviceError::WritesExhausted);
        }
        let dev_rev = self.device_revision()?;
        if dev_rev != image.rev {
            return Err(DeviceError::Refused {
                cmd: REVISION_REG,
                reason: format!(
                    "device revision 0x{dev_rev:02X} does not match image's 0x{:02X}",
                    image.rev
                ),
            });
        }
        Ok(Box::new(image))
    }

    fn update_firmware(&mut self, image: &dyn VrImage, force: bool) -> Result<(), DeviceError> {
        let image = image
            .as_any()
            .downcast_ref::<TdaImage>()
            .ok_or_else(|| DeviceError::Other("image was not verified by this driver".into()))?;

        let current_crc = self.get_crc()?;
        if !force && current_crc == image.checksum_expected {
            return Err(DeviceError::AlreadyUpToDate);
        }

        self.unlock()?;
        for (offset, row) in image.offsets.iter().zip(image.data.iter()) {
            let page = (*offset >> 8) as u8;
            self.set_page(page)?;
            for bias in 0u8..16 {
                let full_addr = offset.wrapping_add(bias as u16);
                if !self.otp_whitelist.contains(&full_addr) {
                    continue;
                }
                let Some(&byte) = row.get(bias as usize) else {
                    continue;
                };
                let address = ((*offset & 0xFF) as u8).wrapping_add(bias);
                self.transport.send_receive(&[address, byte], 0)?;
            }
        }

        self.programming_cmd()?;
        for _ in 0..PROG_STATUS_RETRIES {
            self.sleeper.sleep(PROG_NVM_DELAY);
            let status = self.prog_status()?;
            if status & NVM_DONE_MASK != 0 && status & NVM_ERROR_MASK == 0 {
                return Ok(());
            }
        }
        Err(DeviceError::Refused {
            cmd: PROG_CMD_HIGH_REG,
            reason: "NVM programming did not complete within retry budget".into(),
        })
    }

    fn get_crc(&self) -> Result<u32, DeviceError> {
        self.set_page(0)?;
        let low = self.transport.send_receive(&[CRC_LOW_REG], 2)?;
        let high = self.transport.send_receive(&[CRC_HIGH_REG], 2)?;
        Ok(u32::from_le_bytes([low[0], low[1], high[0], high[1]]))
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.set_page(0)
    }

    fn forced_update_allowed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Part Number : TDA38640A1\nConfiguration Checksum : 0x1234ABCD\n[Configuration Data]\n0040 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F 10\n[End Configuration Data]\n";

    #[test]
    fn parses_revision_checksum_and_data_rows() {
        let image = parse_image(SAMPLE).unwrap();
        assert_eq!(image.rev, 1);
        assert_eq!(image.checksum_expected, 0x1234_ABCD);
        assert_eq!(image.offsets, vec![0x0040]);
        assert_eq!(image.data[0].len(), 16);
    }

    #[test]
    fn rejects_a_non_hex_data_byte() {
        let bad = SAMPLE.replace("01 02", "ZZ 02");
        assert!(matches!(
            parse_image(&bad),
            Err(DeviceError::InvalidImage(_))
        ));
    }

    #[test]
    fn missing_checksum_field_is_an_error() {
        let bad = SAMPLE.replace("Configuration Checksum : 0x1234ABCD\n", "");
        assert!(matches!(
            parse_image(&bad),
            Err(DeviceError::InvalidImage(_))
        ));
    }
}
