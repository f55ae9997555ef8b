// Licensed under the Apache-2.0 license

//! MP2X6XX profile (spec.md 4.4.3), grounded on
//! `original_source/i2c-vr/mps/mp2x6xx.cpp`: fixed MPS vendor id, product
//! id and config id read from the `TRIM_MFR_PRODUCT_ID2` row, single
//! `CRC_USER` checksum register.

use fwupd_core::collab::Sleeper;

use super::{CrcReadout, IdSource, MpsDriver, MpsProfile};
use crate::transport::I2cTransport;
use crate::mps::parser::AteImageType;

const MPS_VENDOR_ID: u32 = 0x4D5053;
/// Page-0 `readCRCReg` command.
const CMD_READ_CRC: u8 = 0xED;

pub fn profile() -> MpsProfile {
    MpsProfile {
        name: "MP2X6XX",
        image_type: AteImageType::Type0,
        vendor_id: IdSource::Fixed(MPS_VENDOR_ID),
        product_id: IdSource::Register("TRIM_MFR_PRODUCT_ID2"),
        config_id_reg: "TRIM_MFR_PRODUCT_ID2",
        crc_regs: &["CRC_USER"],
        crc_readout: CrcReadout::SingleRegister {
            cmd: CMD_READ_CRC,
            len: 2,
        },
        commit_cmd: None,
        needs_write_protect_unlock: false,
    }
}

pub fn new<'a, T: I2cTransport>(transport: T, sleeper: &'a dyn Sleeper) -> MpsDriver<'a, T> {
    MpsDriver::new(transport, sleeper, profile())
}
