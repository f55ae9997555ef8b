// Licensed under the Apache-2.0 license

//! MP994X profile (spec.md 4.4.3), grounded on
//! `original_source/i2c-vr/mps/mp994x.cpp`: vendor id read from
//! `VENDOR_ID_VR`, product id from `MFR_DEVICE_ID_CFG`, config id from the
//! vendor row, and a combined `CRC_USER_MULTI` checksum register.

use fwupd_core::collab::Sleeper;

use super::{CrcReadout, IdSource, MpsDriver, MpsProfile};
use crate::transport::I2cTransport;
use crate::mps::parser::AteImageType;

/// Page-0 `userData08` register, read back as the combined 4-byte
/// `CRC_USER_MULTI` checksum.
const CMD_USER_DATA_08: u8 = 0xB8;

pub fn profile() -> MpsProfile {
    MpsProfile {
        name: "MP994X",
        image_type: AteImageType::Type1,
        vendor_id: IdSource::Register("VENDOR_ID_VR"),
        product_id: IdSource::Register("MFR_DEVICE_ID_CFG"),
        config_id_reg: "VENDOR_ID_VR",
        crc_regs: &["CRC_USER_MULTI"],
        crc_readout: CrcReadout::SingleRegister {
            cmd: CMD_USER_DATA_08,
            len: 4,
        },
        commit_cmd: None,
        needs_write_protect_unlock: false,
    }
}

pub fn new<'a, T: I2cTransport>(transport: T, sleeper: &'a dyn Sleeper) -> MpsDriver<'a, T> {
    MpsDriver::new(transport, sleeper, profile())
}
