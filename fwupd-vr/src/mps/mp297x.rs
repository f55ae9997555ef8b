// Licensed under the Apache-2.0 license

//! MP297X profile (spec.md 4.4.3), grounded on
//! `original_source/i2c-vr/mps/mp297x.cpp`: fixed vendor/product ids,
//! config id from the `CRC_USER` row, and a two-register checksum
//! (`CRC_USER` + `CRC_MULTI`).

use fwupd_core::collab::Sleeper;

use super::{CrcReadout, IdSource, MpsDriver, MpsProfile};
use crate::transport::I2cTransport;
use crate::mps::parser::AteImageType;

const VENDOR_ID: u32 = 0x0025;
const PRODUCT_ID: u32 = 0x0071;

/// Page 0x29's `readUserCodeCRC` and page 0x2A's `readMultiConfigCRC`.
const PAGE_READ_USER_CODE_CRC: u8 = 0x29;
const CMD_READ_USER_CODE_CRC: u8 = 0xFF;
const PAGE_READ_MULTI_CONFIG_CRC: u8 = 0x2A;
const CMD_READ_MULTI_CONFIG_CRC: u8 = 0xBF;

pub fn profile() -> MpsProfile {
    MpsProfile {
        name: "MP297X",
        image_type: AteImageType::Type1,
        vendor_id: IdSource::Fixed(VENDOR_ID),
        product_id: IdSource::Fixed(PRODUCT_ID),
        config_id_reg: "CRC_USER",
        crc_regs: &["CRC_USER", "CRC_MULTI"],
        crc_readout: CrcReadout::TwoPageCombine {
            page_hi: PAGE_READ_USER_CODE_CRC,
            cmd_hi: CMD_READ_USER_CODE_CRC,
            page_lo: PAGE_READ_MULTI_CONFIG_CRC,
            cmd_lo: CMD_READ_MULTI_CONFIG_CRC,
        },
        commit_cmd: None,
        needs_write_protect_unlock: true,
    }
}

pub fn new<'a, T: I2cTransport>(transport: T, sleeper: &'a dyn Sleeper) -> MpsDriver<'a, T> {
    MpsDriver::new(transport, sleeper, profile())
}
