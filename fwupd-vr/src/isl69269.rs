// Licensed under the Apache-2.0 license

//! Renesas ISL69269 driver (spec.md 4.4.2), grounded on
//! `original_source/i2c-vr/isl69269/isl69269.cpp`.
//!
//! Firmware ships as an ASCII hex-record file (no separators, two hex
//! digits per byte): a single header record (type `0x49`) carrying the
//! expected PMBus device id and revision, followed by data records (type
//! `0x00`) of `[len, addr, cmd, ...payload, pec]` where `pec` is a CRC-8
//! Packet Error Code over `[addr, cmd, ...payload]`. The firmware is
//! programmed by replaying every data record's `[cmd, ...payload]` over
//! I2C, then waiting for the device's programming-status register and
//! restoring its active config id.

use std::time::Duration;

use fwupd_core::collab::Sleeper;
use fwupd_core::error::DeviceError;

use crate::crc::crc8_pec;
use crate::driver::{VrDriver, VrImage};
use crate::transport::I2cTransport;

const REG_PROG_STATUS: u8 = 0x7E;
const REG_HEX_MODE_CFG0: u8 = 0x87;
const REG_CRC: u8 = 0x94;
const REG_HEX_MODE_CFG1: u8 = 0xBD;
const REG_DMA_DATA: u8 = 0xC5;
const REG_DMA_ADDR: u8 = 0xC7;
const REG_RESTORE_CFG: u8 = 0xF2;
const REG_REMAINING_WRITES: u8 = 0x35;

const PMBUS_DEVICE_ID: u8 = 0xAD;
const PMBUS_DEVICE_REV: u8 = 0xAE;

const RECORD_TYPE_DATA: u8 = 0x00;
const RECORD_TYPE_HEADER: u8 = 0x49;

const CFG_ID_RECORD_INDEX: usize = 7;
const PROG_STATUS_RETRIES: u32 = 3;

/// Minimum device-revision top byte a programmable device must report,
/// also the legacy/production hex-file boundary (spec.md 4.4.2).
const GEN3_SW_REV_MIN: u32 = 0x06;
/// Data-record index of the embedded reference CRC, counted from the
/// file's first data record: legacy-format hex files carry it at line 276,
/// production-format at line 290, each file having a 5-line head before
/// the first data record.
const GEN3_LEGACY_CRC_RECORD_INDEX: usize = 276 - 5;
const GEN3_PRODUCTION_CRC_RECORD_INDEX: usize = 290 - 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HexMode {
    Gen3Legacy,
    Gen3Production,
}

#[derive(Debug, Clone)]
struct DataRecord {
    cmd: u8,
    payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Isl69269Image {
    dev_id_expected: u32,
    dev_rev_expected: u32,
    cfg_id: u8,
    mode: HexMode,
    crc_expected: u32,
    records: Vec<DataRecord>,
}

impl VrImage for Isl69269Image {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn hex_byte(pair: &str) -> Result<u8, DeviceError> {
    u8::from_str_radix(pair, 16)
        .map_err(|_| DeviceError::InvalidImage(format!("not a hex byte pair: {pair}")))
}

fn parse_hex_line(line: &str) -> Result<Vec<u8>, DeviceError> {
    let line = line.trim();
    if line.len() % 2 != 0 {
        return Err(DeviceError::InvalidImage(
            "hex record line has an odd digit count".into(),
        ));
    }
    (0..line.len())
        .step_by(2)
        .map(|i| hex_byte(&line[i..i + 2]))
        .collect()
}

fn parse_hex_records(text: &str) -> Result<Isl69269Image, DeviceError> {
    let mut dev_id_expected = None;
    let mut dev_rev_expected = None;
    let mut mode = None;
    let mut cfg_id = None;
    let mut crc_expected = None;
    let mut records = Vec::new();

    for raw_line in text.lines() {
        if raw_line.trim().is_empty() {
            continue;
        }
        let bytes = parse_hex_line(raw_line)?;
        if bytes.is_empty() {
            continue;
        }
        match bytes[0] {
            RECORD_TYPE_HEADER => {
                if bytes.len() < 8 {
                    return Err(DeviceError::InvalidImage(
                        "header record too short".into(),
                    ));
                }
                let cmd = bytes[3];
                let value = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
                if cmd == PMBUS_DEVICE_ID {
                    dev_id_expected = Some(value);
                } else if cmd == PMBUS_DEVICE_REV {
                    dev_rev_expected = Some(value);
                    // Legacy hex files carry a device-revision header below
                    // the gen3/production boundary (spec.md 4.4.2).
                    mode = Some(if value < GEN3_SW_REV_MIN << 24 {
                        HexMode::Gen3Legacy
                    } else {
                        HexMode::Gen3Production
                    });
                }
            }
            RECORD_TYPE_DATA => {
                if bytes.len() < 2 {
                    return Err(DeviceError::InvalidImage("data record too short".into()));
                }
                let len = bytes[1].checked_sub(2).ok_or_else(|| {
                    DeviceError::InvalidImage("data record length underflows".into())
                })? as usize;
                if bytes.len() < 4 + len {
                    return Err(DeviceError::InvalidImage(
                        "data record shorter than its declared length".into(),
                    ));
                }
                let cmd = bytes[3];
                // CRC-8 PEC covers [addr, cmd, ...payload], i.e. bytes[2..4+len].
                let pec_span = &bytes[2..4 + len];
                let pec = bytes[4 + len];
                if crc8_pec(pec_span) != pec {
                    return Err(DeviceError::CrcMismatch {
                        expected: pec as u32,
                        actual: crc8_pec(pec_span) as u32,
                    });
                }
                if records.len() == CFG_ID_RECORD_INDEX {
                    cfg_id = Some(bytes[4] & 0x0F);
                }
                if let Some(mode) = mode {
                    let crc_index = match mode {
                        HexMode::Gen3Legacy => GEN3_LEGACY_CRC_RECORD_INDEX,
                        HexMode::Gen3Production => GEN3_PRODUCTION_CRC_RECORD_INDEX,
                    };
                    if records.len() == crc_index && len >= 4 {
                        crc_expected =
                            Some(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]));
                    }
                }
                records.push(DataRecord {
                    cmd,
                    payload: bytes[4..4 + len.saturating_sub(1)].to_vec(),
                });
            }
            other => {
                return Err(DeviceError::InvalidImage(format!(
                    "unknown hex record type 0x{other:02X}"
                )))
            }
        }
    }

    Ok(Isl69269Image {
        dev_id_expected: dev_id_expected
            .ok_or_else(|| DeviceError::InvalidImage("missing device id header".into()))?,
        dev_rev_expected: dev_rev_expected
            .ok_or_else(|| DeviceError::InvalidImage("missing device revision header".into()))?,
        mode: mode.ok_or_else(|| DeviceError::InvalidImage("missing device revision header".into()))?,
        cfg_id: cfg_id.ok_or_else(|| DeviceError::InvalidImage("missing config id record".into()))?,
        crc_expected: crc_expected
            .ok_or_else(|| DeviceError::InvalidImage("missing embedded reference CRC".into()))?,
        records,
    })
}

pub struct Isl69269<'a, T: I2cTransport> {
    transport: T,
    sleeper: &'a dyn Sleeper,
}

impl<'a, T: I2cTransport> Isl69269<'a, T> {
    pub fn new(transport: T, sleeper: &'a dyn Sleeper) -> Self {
        Self { transport, sleeper }
    }

    fn dma_read(&self, reg: u8, sub_reg: u8) -> Result<[u8; 4], DeviceError> {
        self.transport
            .send_receive(&[REG_DMA_DATA, reg, sub_reg], 0)?;
        let rx = self.transport.send_receive(&[REG_DMA_ADDR], 4)?;
        Ok([rx[0], rx[1], rx[2], rx[3]])
    }

    fn remaining_writes(&self) -> Result<u8, DeviceError> {
        Ok(self.dma_read(REG_REMAINING_WRITES, 0x00)?[0])
    }

    fn device_id(&self) -> Result<u32, DeviceError> {
        let rx = self.transport.send_receive(&[PMBUS_DEVICE_ID], 5)?;
        Ok(u32::from_be_bytes([rx[1], rx[2], rx[3], rx[4]]))
    }

    fn prog_status_ready(&self) -> Result<bool, DeviceError> {
        let mut retries = PROG_STATUS_RETRIES;
        loop {
            let status = self.dma_read(REG_PROG_STATUS, 0x00)?;
            if status[0] & 0x01 != 0 {
                return Ok(true);
            }
            retries -= 1;
            if retries == 0 {
                return Ok(false);
            }
            self.sleeper.sleep(Duration::from_secs(1));
        }
    }

    fn restore_cfg(&self, cfg_id: u8) -> Result<(), DeviceError> {
        self.dma_read(REG_RESTORE_CFG, cfg_id)?;
        Ok(())
    }

    fn hex_mode(&self) -> Result<HexMode, DeviceError> {
        let rx = self.dma_read(REG_HEX_MODE_CFG0, REG_HEX_MODE_CFG1)?;
        Ok(if rx[0] == 0 {
            HexMode::Gen3Legacy
        } else {
            HexMode::Gen3Production
        })
    }

    fn device_revision(&self) -> Result<u32, DeviceError> {
        let rx = self.transport.send_receive(&[PMBUS_DEVICE_REV], 5)?;
        Ok(u32::from_be_bytes([rx[1], rx[2], rx[3], rx[4]]))
    }
}

impl<'a, T: I2cTransport> VrDriver for Isl69269<'a, T> {
    fn verify_image(&self, image_bytes: &[u8]) -> Result<Box<dyn VrImage>, DeviceError> {
        let text = std::str::from_utf8(image_bytes)
            .map_err(|_| DeviceError::InvalidImage("hex file is not valid utf-8".into()))?;
        let image = parse_hex_records(text)?;

        let mode = self.hex_mode()?;
        if mode != image.mode {
            return Err(DeviceError::Refused {
                cmd: REG_HEX_MODE_CFG0,
                reason: "device hex mode does not match image's hex mode".into(),
            });
        }

        let remaining = self.remaining_writes()?;
        if remaining == 0 {
            return Err(DeviceError::WritesExhausted);
        }
        let device_id = self.device_id()?;
        if device_id != image.dev_id_expected {
            return Err(DeviceError::Refused {
                cmd: PMBUS_DEVICE_ID,
                reason: format!(
                    "device id 0x{device_id:08X} does not match image's 0x{:08X}",
                    image.dev_id_expected
                ),
            });
        }

        let device_revision = self.device_revision()?;
        let revision_ok = match mode {
            HexMode::Gen3Legacy => {
                (device_revision >> 24) >= GEN3_SW_REV_MIN && image.dev_rev_expected <= 0x1
            }
            HexMode::Gen3Production => {
                (device_revision >> 24) >= GEN3_SW_REV_MIN
                    && image.dev_rev_expected >= GEN3_SW_REV_MIN
            }
        };
        if !revision_ok {
            return Err(DeviceError::Refused {
                cmd: PMBUS_DEVICE_REV,
                reason: format!(
                    "revision requirements for {mode:?} device not fulfilled (device 0x{device_revision:08X})"
                ),
            });
        }

        let crc = self.get_crc()?;
        if crc == image.crc_expected {
            return Err(DeviceError::AlreadyUpToDate);
        }

        Ok(Box::new(image))
    }

    fn update_firmware(&mut self, image: &dyn VrImage, _force: bool) -> Result<(), DeviceError> {
        let image = image
            .as_any()
            .downcast_ref::<Isl69269Image>()
            .ok_or_else(|| DeviceError::Other("image was not verified by this driver".into()))?;

        for record in &image.records {
            let mut tx = vec![record.cmd];
            tx.extend_from_slice(&record.payload);
            self.transport.send_receive(&tx, 0)?;
        }

        if !self.prog_status_ready()? {
            return Err(DeviceError::Refused {
                cmd: REG_PROG_STATUS,
                reason: "device did not report programming completion".into(),
            });
        }
        self.restore_cfg(image.cfg_id)?;
        Ok(())
    }

    fn get_crc(&self) -> Result<u32, DeviceError> {
        Ok(u32::from_le_bytes(self.dma_read(REG_CRC, 0x00)?))
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        if !self.prog_status_ready()? {
            return Err(DeviceError::Refused {
                cmd: REG_PROG_STATUS,
                reason: "device did not report programming completion".into(),
            });
        }
        Ok(())
    }

    fn forced_update_allowed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakeI2cTransport;
    use fwupd_core::collab::NullSleeper;

    fn header_line(cmd: u8, value: u32) -> String {
        let v = value.to_be_bytes();
        let bytes = [
            RECORD_TYPE_HEADER,
            0x00,
            0x00,
            cmd,
            v[0],
            v[1],
            v[2],
            v[3],
        ];
        bytes.iter().map(|b| format!("{b:02X}")).collect()
    }

    fn data_line(addr: u8, cmd: u8, payload: &[u8]) -> String {
        let mut body = vec![addr, cmd];
        body.extend_from_slice(payload);
        let pec = crc8_pec(&body);
        let len = (payload.len() + 2) as u8;
        let mut line = vec![RECORD_TYPE_DATA, len, addr, cmd];
        line.extend_from_slice(payload);
        line.push(pec);
        line.iter().map(|b| format!("{b:02X}")).collect()
    }

    /// A legacy- or production-mode image (whichever `dev_rev_header`
    /// selects) carrying enough filler data records to reach its mode's
    /// embedded-CRC record index, with `crc_expected` planted there.
    fn sample_image_text(dev_id: u32, dev_rev_header: u32, crc_expected: u32) -> String {
        let mode = if dev_rev_header < GEN3_SW_REV_MIN << 24 {
            HexMode::Gen3Legacy
        } else {
            HexMode::Gen3Production
        };
        let crc_index = match mode {
            HexMode::Gen3Legacy => GEN3_LEGACY_CRC_RECORD_INDEX,
            HexMode::Gen3Production => GEN3_PRODUCTION_CRC_RECORD_INDEX,
        };
        let mut text = String::new();
        text.push_str(&header_line(PMBUS_DEVICE_ID, dev_id));
        text.push('\n');
        text.push_str(&header_line(PMBUS_DEVICE_REV, dev_rev_header));
        text.push('\n');
        for i in 0..=crc_index {
            if i == crc_index {
                text.push_str(&data_line(0x00, 0x01, &crc_expected.to_le_bytes()));
            } else {
                text.push_str(&data_line(0x00, 0x01, &[0xAB]));
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn rejects_a_data_record_with_a_bad_pec() {
        let mut line = parse_hex_line(&data_line(0x00, 0x01, &[0xAB])).unwrap();
        let bad_pec_index = line.len() - 1;
        line[bad_pec_index] ^= 0xFF;
        let bad_line: String = line.iter().map(|b| format!("{b:02X}")).collect();
        let err = parse_hex_records(&bad_line).unwrap_err();
        assert!(matches!(err, DeviceError::CrcMismatch { .. }));
    }

    #[test]
    fn parses_header_and_keeps_records_in_order() {
        let text = sample_image_text(0xAABBCCDD, 0x0000_0001, 0x9999_9999);
        let image = parse_hex_records(&text).unwrap();
        assert_eq!(image.dev_id_expected, 0xAABBCCDD);
        assert_eq!(image.mode, HexMode::Gen3Legacy);
        assert_eq!(image.crc_expected, 0x9999_9999);
        assert_eq!(image.records.len(), GEN3_LEGACY_CRC_RECORD_INDEX + 1);
        assert_eq!(image.cfg_id, 0xAB & 0x0F);
    }

    fn expect_hex_mode(transport: &FakeI2cTransport, byte: u8) {
        transport.expect([REG_DMA_DATA, REG_HEX_MODE_CFG0, REG_HEX_MODE_CFG1], []);
        transport.expect([REG_DMA_ADDR], [byte, 0, 0, 0]);
    }

    fn expect_remaining_writes(transport: &FakeI2cTransport, remaining: u8) {
        transport.expect([REG_DMA_DATA, REG_REMAINING_WRITES, 0x00], []);
        transport.expect([REG_DMA_ADDR], [remaining, 0, 0, 0]);
    }

    fn expect_device_id(transport: &FakeI2cTransport, dev_id: u32) {
        let id = dev_id.to_be_bytes();
        transport.expect([PMBUS_DEVICE_ID], [0, id[0], id[1], id[2], id[3]]);
    }

    fn expect_device_revision(transport: &FakeI2cTransport, dev_rev: u32) {
        let rev = dev_rev.to_be_bytes();
        transport.expect([PMBUS_DEVICE_REV], [0, rev[0], rev[1], rev[2], rev[3]]);
    }

    fn expect_crc(transport: &FakeI2cTransport, crc: u32) {
        transport.expect([REG_DMA_DATA, REG_CRC, 0x00], []);
        transport.expect([REG_DMA_ADDR], crc.to_le_bytes());
    }

    #[test]
    fn verify_image_accepts_a_matching_legacy_device() {
        let text = sample_image_text(0xAABBCCDD, 0x0000_0001, 0x1111_1111);
        let transport = FakeI2cTransport::new(0, 0x40);
        expect_hex_mode(&transport, 0x00);
        expect_remaining_writes(&transport, 5);
        expect_device_id(&transport, 0xAABBCCDD);
        expect_device_revision(&transport, 0x0700_0000);
        expect_crc(&transport, 0x2222_2222);
        let driver = Isl69269::new(transport, &NullSleeper);
        driver
            .verify_image(text.as_bytes())
            .expect("matching legacy image should verify");
    }

    #[test]
    fn verify_image_rejects_a_hex_mode_mismatch() {
        let text = sample_image_text(0xAABBCCDD, 0x0000_0001, 0x1111_1111);
        let transport = FakeI2cTransport::new(0, 0x40);
        // Legacy image, but the device reports production mode.
        expect_hex_mode(&transport, 0x01);
        let driver = Isl69269::new(transport, &NullSleeper);
        let err = driver.verify_image(text.as_bytes()).unwrap_err();
        assert!(matches!(err, DeviceError::Refused { cmd: REG_HEX_MODE_CFG0, .. }));
    }

    #[test]
    fn verify_image_rejects_a_revision_below_the_gen3_threshold() {
        let text = sample_image_text(0xAABBCCDD, 0x0000_0001, 0x1111_1111);
        let transport = FakeI2cTransport::new(0, 0x40);
        expect_hex_mode(&transport, 0x00);
        expect_remaining_writes(&transport, 5);
        expect_device_id(&transport, 0xAABBCCDD);
        // Top byte is below gen3SWRevMin (0x06).
        expect_device_revision(&transport, 0x0100_0000);
        let driver = Isl69269::new(transport, &NullSleeper);
        let err = driver.verify_image(text.as_bytes()).unwrap_err();
        assert!(matches!(err, DeviceError::Refused { cmd: PMBUS_DEVICE_REV, .. }));
    }

    #[test]
    fn verify_image_rejects_an_already_up_to_date_device() {
        let text = sample_image_text(0xAABBCCDD, 0x0000_0001, 0x1111_1111);
        let transport = FakeI2cTransport::new(0, 0x40);
        expect_hex_mode(&transport, 0x00);
        expect_remaining_writes(&transport, 5);
        expect_device_id(&transport, 0xAABBCCDD);
        expect_device_revision(&transport, 0x0700_0000);
        expect_crc(&transport, 0x1111_1111);
        let driver = Isl69269::new(transport, &NullSleeper);
        let err = driver.verify_image(text.as_bytes()).unwrap_err();
        assert!(matches!(err, DeviceError::AlreadyUpToDate));
    }
}
