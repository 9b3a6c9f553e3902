//! Register transport. Every register access goes through [`DeviceHandle`],
//! the single owner of the I2C bus collaborator.

use log::error;

use crate::platform::{I2cBus, Timer};
use crate::registers::CR50_MAX_BUFSIZE;
use crate::{Error, Result};

/// Bus location of the chip plus the scratch buffer used to prepend the
/// register address to outgoing data. An address of 0 means unconfigured.
pub struct DeviceHandle<B, T> {
    bus: u32,
    addr: u8,
    buf: [u8; CR50_MAX_BUFSIZE + 1],
    settle_ms: u32,
    i2c: B,
    timer: T,
}

impl<B: I2cBus, T: Timer> DeviceHandle<B, T> {
    pub fn new(i2c: B, timer: T, settle_ms: u32) -> Self {
        Self {
            bus: 0,
            addr: 0,
            buf: [0; CR50_MAX_BUFSIZE + 1],
            settle_ms,
            i2c,
            timer,
        }
    }

    pub fn configure(&mut self, bus: u32, addr: u8) {
        self.bus = bus;
        self.addr = addr;
    }

    pub fn bus_id(&self) -> u32 {
        self.bus
    }

    pub fn addr(&self) -> u8 {
        self.addr
    }

    pub fn i2c(&self) -> &B {
        &self.i2c
    }

    pub fn i2c_mut(&mut self) -> &mut B {
        &mut self.i2c
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn mdelay(&mut self, ms: u32) {
        self.timer.mdelay(ms);
    }

    pub fn into_parts(self) -> (B, T) {
        (self.i2c, self.timer)
    }

    /// Selects `reg` with a single byte write, lets the chip settle, then
    /// reads `buf.len()` bytes.
    pub fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<()> {
        if self.addr == 0 {
            return Err(Error::Unconfigured);
        }

        if let Err(e) = self.i2c.write_raw(self.bus, self.addr, &[reg]) {
            error!("cr50 read: address write of reg {:#04x} failed: {:?}", reg, e);
            return Err(Error::BusTransferFailed);
        }

        // The chip needs time to latch the address before data is valid.
        self.timer.mdelay(self.settle_ms);

        if let Err(e) = self.i2c.read_raw(self.bus, self.addr, buf) {
            error!("cr50 read: read of {} bytes from reg {:#04x} failed: {:?}", buf.len(), reg, e);
            return Err(Error::BusTransferFailed);
        }

        Ok(())
    }

    /// Sends `reg` followed by `data` in one bus write and lets the chip
    /// settle. At most 63 data bytes fit.
    pub fn write(&mut self, reg: u8, data: &[u8]) -> Result<()> {
        if self.addr == 0 {
            return Err(Error::Unconfigured);
        }
        if data.len() > CR50_MAX_BUFSIZE {
            error!("cr50 write: {} bytes to reg {:#04x} exceeds {}", data.len(), reg, CR50_MAX_BUFSIZE);
            return Err(Error::OversizedPayload);
        }

        let len = data.len() + 1;
        self.buf[0] = reg;
        self.buf[1..len].copy_from_slice(data);

        if let Err(e) = self.i2c.write_raw(self.bus, self.addr, &self.buf[..len]) {
            error!("cr50 write: error writing {} bytes to reg {:#04x}: {:?}", data.len(), reg, e);
            return Err(Error::BusTransferFailed);
        }

        self.timer.mdelay(self.settle_ms);

        Ok(())
    }
}
