// Licensed under the Apache-2.0 license

//! Monolithic Power Systems family drivers (spec.md 4.4.3), grounded on
//! `original_source/i2c-vr/mps/mps.cpp`'s shared `MPSImageParser` /
//! `MPSVoltageRegulator` base and each family's `.cpp` specialization.
//!
//! All five devices (MP2X6XX, MP297X, MP5998, MP994X, MP292X) share the
//! ATE parser in [`parser`]; they differ only in where vendor/product/
//! config-id live (a fixed constant or a named register row) and which
//! register(s) carry the post-program CRC. [`MpsProfile`] captures that
//! difference so one driver body serves every family, the way the
//! original's per-family `.cpp` files differ only in their constant
//! tables around a shared parsing/programming core.

pub mod mp292x;
pub mod mp297x;
pub mod mp2x6xx;
pub mod mp5998;
pub mod mp994x;
pub mod parser;

use std::time::Duration;

use fwupd_core::collab::Sleeper;
use fwupd_core::error::DeviceError;

use crate::driver::{VrDriver, VrImage};
use crate::transport::I2cTransport;
use parser::{parse_ate, AteImageType, AteRow};

/// PMBus PAGE command (0x00): every MPS family pages its register map this
/// way before a write whose page differs from the previous one.
const PMBUS_PAGE: u8 = 0x00;
/// Standard PMBus WRITE_PROTECT command (0x10), used by MP297X's
/// write-protect-sense/unlock sequence.
const PMBUS_WRITE_PROTECT: u8 = 0x10;
/// MP297X page-1 command reporting the current write-protect mode.
const CMD_WRITE_PROTECT_MODE: u8 = 0x35;

#[derive(Debug, Clone, Copy)]
pub enum IdSource {
    Fixed(u32),
    Register(&'static str),
}

/// How a family's post-program CRC is read back over PMBus. Every MPS
/// family pages to 0 and reads a single command except MP297X, which
/// combines two 16-bit halves read from two different pages (spec.md
/// 4.4.3), grounded on each family's own `getCRC()`.
#[derive(Debug, Clone, Copy)]
pub enum CrcReadout {
    /// Page to 0, send `cmd`, read back `len` bytes (2 for most families,
    /// 4 for MP994X/MP292X's combined `CRC_USER_MULTI` register).
    SingleRegister { cmd: u8, len: usize },
    /// MP297X: page to `page_hi` and send `cmd_hi` for the upper 16 bits
    /// (`CRC_USER`), then page to `page_lo` and send `cmd_lo` for the
    /// lower 16 bits (`CRC_MULTI`).
    TwoPageCombine {
        page_hi: u8,
        cmd_hi: u8,
        page_lo: u8,
        cmd_lo: u8,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct MpsProfile {
    pub name: &'static str,
    pub image_type: AteImageType,
    pub vendor_id: IdSource,
    pub product_id: IdSource,
    /// Register name whose ConfigID column holds the image's config id
    /// ("row of CRC_USER" / "row of vendor" in spec.md's family table).
    pub config_id_reg: &'static str,
    /// CRC register name(s) in the ATE image; concatenated in order for
    /// families with more than one (e.g. MP297X's `CRC_USER`+`CRC_MULTI`).
    pub crc_regs: &'static [&'static str],
    /// How to read the programmed CRC back off the device.
    pub crc_readout: CrcReadout,
    /// Extra command issued once after every register has been written,
    /// for families that require an explicit commit (MP292X's `0xA9`).
    pub commit_cmd: Option<u8>,
    /// MP297X's page-1 write-protect-sense/page-0 unlock step, run once
    /// before programming begins. No other family needs it.
    pub needs_write_protect_unlock: bool,
}

#[derive(Debug, Clone)]
pub struct MpsConfig {
    vendor_id: u32,
    product_id: u32,
    config_id: String,
    crc_expected: Vec<u8>,
    rows: Vec<AteRow>,
}

impl VrImage for MpsConfig {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn row_value_u32(row: &AteRow) -> u32 {
    let mut bytes = [0u8; 4];
    for (i, b) in row.data.iter().rev().take(4).enumerate() {
        bytes[i] = *b;
    }
    u32::from_le_bytes(bytes)
}

fn find_id(rows: &[AteRow], source: IdSource) -> Result<u32, DeviceError> {
    match source {
        IdSource::Fixed(v) => Ok(v),
        IdSource::Register(name) => rows
            .iter()
            .find(|r| r.reg_name == name)
            .map(row_value_u32)
            .ok_or_else(|| DeviceError::InvalidImage(format!("missing register row {name}"))),
    }
}

pub struct MpsDriver<'a, T: I2cTransport> {
    transport: T,
    sleeper: &'a dyn Sleeper,
    profile: MpsProfile,
}

impl<'a, T: I2cTransport> MpsDriver<'a, T> {
    pub fn new(transport: T, sleeper: &'a dyn Sleeper, profile: MpsProfile) -> Self {
        Self {
            transport,
            sleeper,
            profile,
        }
    }

    fn select_page(&self, page: u8) -> Result<(), DeviceError> {
        self.transport.send_receive(&[PMBUS_PAGE, page], 0)?;
        Ok(())
    }

    fn device_crc_bytes(&self) -> Result<Vec<u8>, DeviceError> {
        match self.profile.crc_readout {
            CrcReadout::SingleRegister { cmd, len } => {
                self.select_page(0)?;
                Ok(self.transport.send_receive(&[cmd], len)?)
            }
            CrcReadout::TwoPageCombine {
                page_hi,
                cmd_hi,
                page_lo,
                cmd_lo,
            } => {
                self.select_page(page_hi)?;
                let hi = self.transport.send_receive(&[cmd_hi], 2)?;
                self.select_page(page_lo)?;
                let lo = self.transport.send_receive(&[cmd_lo], 2)?;
                let mut out = Vec::with_capacity(4);
                out.extend_from_slice(&hi);
                out.extend_from_slice(&lo);
                Ok(out)
            }
        }
    }

    /// MP297X's write-protect-sense/unlock step (spec.md 4.4.3): read the
    /// write-protect mode on page 1, then write the resulting unlock value
    /// back on page 0.
    fn unlock_write_protect(&self) -> Result<(), DeviceError> {
        const WRITE_PROTECT_MODE_MASK: u8 = 0x04;
        const UNLOCK_MTP_PROTECT: u8 = 0x63;
        const UNLOCK_MEMORY_PROTECT: u8 = 0x00;

        self.select_page(1)?;
        let rx = self
            .transport
            .send_receive(&[CMD_WRITE_PROTECT_MODE], 1)?;
        let is_mtp_mode = rx[0] & WRITE_PROTECT_MODE_MASK == 0;
        let unlock_data = if is_mtp_mode {
            UNLOCK_MTP_PROTECT
        } else {
            UNLOCK_MEMORY_PROTECT
        };

        self.select_page(0)?;
        self.transport
            .send_receive(&[PMBUS_WRITE_PROTECT, unlock_data], 0)?;
        Ok(())
    }
}

impl<'a, T: I2cTransport> VrDriver for MpsDriver<'a, T> {
    fn verify_image(&self, image_bytes: &[u8]) -> Result<Box<dyn VrImage>, DeviceError> {
        let text = std::str::from_utf8(image_bytes)
            .map_err(|_| DeviceError::InvalidImage("ATE image is not valid utf-8".into()))?;
        let rows = parse_ate(text, self.profile.image_type)?;
        if rows.is_empty() {
            return Err(DeviceError::InvalidImage("no data rows parsed".into()));
        }

        let vendor_id = find_id(&rows, self.profile.vendor_id)?;
        let product_id = find_id(&rows, self.profile.product_id)?;
        let config_id = rows
            .iter()
            .find(|r| r.reg_name == self.profile.config_id_reg)
            .map(|r| r.config_id_token.clone())
            .ok_or_else(|| {
                DeviceError::InvalidImage(format!(
                    "missing config id row ({})",
                    self.profile.config_id_reg
                ))
            })?;

        let mut crc_expected = Vec::new();
        for reg in self.profile.crc_regs {
            let row = rows.iter().find(|r| &r.reg_name == reg).ok_or_else(|| {
                DeviceError::InvalidImage(format!("missing CRC row ({reg})"))
            })?;
            crc_expected.extend_from_slice(&row.data);
        }

        Ok(Box::new(MpsConfig {
            vendor_id,
            product_id,
            config_id,
            crc_expected,
            rows,
        }))
    }

    fn update_firmware(&mut self, image: &dyn VrImage, _force: bool) -> Result<(), DeviceError> {
        let image = image
            .as_any()
            .downcast_ref::<MpsConfig>()
            .ok_or_else(|| DeviceError::Other("image was not verified by this driver".into()))?;

        if self.profile.needs_write_protect_unlock {
            self.unlock_write_protect()?;
        }

        let mut current_page = None;
        for row in &image.rows {
            if current_page != Some(row.page) {
                self.select_page(row.page)?;
                current_page = Some(row.page);
            }
            let mut tx = vec![row.addr];
            tx.extend_from_slice(&row.data);
            self.transport.send_receive(&tx, 0)?;
            self.sleeper.sleep(Duration::from_millis(1));
        }

        if let Some(cmd) = self.profile.commit_cmd {
            self.transport.send_receive(&[cmd], 0)?;
            self.sleeper.sleep(Duration::from_millis(50));
        }

        let actual_crc = self.device_crc_bytes()?;
        if actual_crc != image.crc_expected {
            return Err(DeviceError::Other(format!(
                "{}: CRC mismatch after programming",
                self.profile.name
            )));
        }
        let _ = (image.vendor_id, image.product_id, &image.config_id);
        Ok(())
    }

    fn get_crc(&self) -> Result<u32, DeviceError> {
        let bytes = self.device_crc_bytes()?;
        let mut out = [0u8; 4];
        for (i, b) in bytes.iter().rev().take(4).enumerate() {
            out[i] = *b;
        }
        Ok(u32::from_le_bytes(out))
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.select_page(0)
    }

    fn forced_update_allowed(&self) -> bool {
        true
    }
}
