// Licensed under the Apache-2.0 license

//! Every VR driver is generic over this single seam, mirroring the
//! teacher's `PldmSocket` seam in `pldm-ua`: `sendReceive(tx, rx_len)` is
//! the VR chip's only transport (spec.md 4.4).

use fwupd_core::error::TransportError;

pub trait I2cTransport {
    fn bus(&self) -> u8;
    fn address(&self) -> u8;
    fn send_receive(&self, tx: &[u8], rx_len: usize) -> Result<Vec<u8>, TransportError>;
}

/// A scripted-response test double, modeled on
/// `pldm-ua/tests/mock_transport.rs`: each call to `send_receive` consumes
/// the next queued response, matched by the request bytes it was queued
/// under.
#[cfg(test)]
pub struct FakeI2cTransport {
    pub bus: u8,
    pub address: u8,
    responses: std::cell::RefCell<std::collections::VecDeque<(Vec<u8>, Vec<u8>)>>,
}

#[cfg(test)]
impl FakeI2cTransport {
    pub fn new(bus: u8, address: u8) -> Self {
        Self {
            bus,
            address,
            responses: std::cell::RefCell::new(std::collections::VecDeque::new()),
        }
    }

    /// Queue the bytes to return the next time `send_receive` is called
    /// with exactly `tx`.
    pub fn expect(&self, tx: impl Into<Vec<u8>>, rx: impl Into<Vec<u8>>) -> &Self {
        self.responses
            .borrow_mut()
            .push_back((tx.into(), rx.into()));
        self
    }
}

#[cfg(test)]
impl I2cTransport for FakeI2cTransport {
    fn bus(&self) -> u8 {
        self.bus
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn send_receive(&self, tx: &[u8], rx_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut queue = self.responses.borrow_mut();
        let Some((expected_tx, rx)) = queue.pop_front() else {
            return Err(TransportError::Io(format!(
                "unexpected request {tx:02x?}, no responses queued"
            )));
        };
        if expected_tx != tx {
            return Err(TransportError::Io(format!(
                "unexpected request {tx:02x?}, expected {expected_tx:02x?}"
            )));
        }
        let mut rx = rx;
        rx.resize(rx_len, 0);
        Ok(rx)
    }
}
