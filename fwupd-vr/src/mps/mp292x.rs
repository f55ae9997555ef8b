// Licensed under the Apache-2.0 license

//! MP292X profile (spec.md 4.4.3), grounded on
//! `original_source/i2c-vr/mps/mp292x.hpp`: inherits MP994X's id/CRC
//! layout but commits the programmed configuration with an extra `0xA9`
//! command the MP994X base class does not issue.

use fwupd_core::collab::Sleeper;

use super::{MpsDriver, MpsProfile};
use crate::transport::I2cTransport;

const COMMIT_CMD: u8 = 0xA9;

pub fn profile() -> MpsProfile {
    MpsProfile {
        name: "MP292X",
        commit_cmd: Some(COMMIT_CMD),
        ..super::mp994x::profile()
    }
}

pub fn new<'a, T: I2cTransport>(transport: T, sleeper: &'a dyn Sleeper) -> MpsDriver<'a, T> {
    MpsDriver::new(transport, sleeper, profile())
}
