// Licensed under the Apache-2.0 license

//! MP5998 profile (spec.md 4.4.3), grounded on
//! `original_source/i2c-vr/mps/mp5998.cpp`: fixed vendor/product ids,
//! config id and checksum both read from the `CRC_USER` row.

use fwupd_core::collab::Sleeper;

use super::{CrcReadout, IdSource, MpsDriver, MpsProfile};
use crate::transport::I2cTransport;
use crate::mps::parser::AteImageType;

const MPS_VENDOR_ID: u32 = 0x4D5053;
const PRODUCT_ID: u32 = 0x3539_3938; // ASCII "5998"
const CMD_CRC_USER: u8 = 0xF8;

pub fn profile() -> MpsProfile {
    MpsProfile {
        name: "MP5998",
        image_type: AteImageType::Type1,
        vendor_id: IdSource::Fixed(MPS_VENDOR_ID),
        product_id: IdSource::Fixed(PRODUCT_ID),
        config_id_reg: "CRC_USER",
        crc_regs: &["CRC_USER"],
        crc_readout: CrcReadout::SingleRegister {
            cmd: CMD_CRC_USER,
            len: 2,
        },
        commit_cmd: None,
        needs_write_protect_unlock: false,
    }
}

pub fn new<'a, T: I2cTransport>(transport: T, sleeper: &'a dyn Sleeper) -> MpsDriver<'a, T> {
    MpsDriver::new(transport, sleeper, profile())
}
