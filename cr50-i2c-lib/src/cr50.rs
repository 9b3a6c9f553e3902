//! # cr50 TIS I2C Driver
//!
//! Status/burst polling, the send and receive FIFO pipelines, and the device
//! lifecycle (probe, init, cleanup) for the cr50 TPM.
//!
//! The flow is based off the TCG PC Client Platform TPM Profile FIFO
//! interface, with cr50's deviations:
//! - the burst count lives in bytes 1..3 of the 4-byte status register
//! - the burst count used for FIFO writes includes the address byte
//! - a response must be read a full burst at a time

use log::{debug, error, info, warn};

use crate::platform::{I2cBus, Stopwatch, Timer};
use crate::registers::{
    response_size, tpm_access, tpm_data_fifo, tpm_did_vid, tpm_sts, AccessFlags, StatusRegister, StsFlags,
    TPM_HEADER_SIZE, TPM_RSP_SIZE_BYTE,
};
use crate::transport::DeviceHandle;
use crate::{Config, Error, Result, TpmVendorOps};

// ---------------------------------------------------------------------------
// Debug Helpers
// ---------------------------------------------------------------------------
fn dump_tpm_input_block(input_block: &[u8]) {
    debug!("TpmCommand Send - {:02X?}", input_block);
}

fn dump_tpm_output_block(output_block: &[u8]) {
    debug!("TpmCommand Rec - {:02X?}", output_block);
}

/// Per chip state owned by the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChipState {
    pub(crate) locality: u8,
    pub(crate) is_open: bool,
    /// cr50 is polled, so this stays `None`.
    pub(crate) irq: Option<u32>,
}

impl ChipState {
    pub fn locality(&self) -> u8 {
        self.locality
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn irq(&self) -> Option<u32> {
        self.irq
    }
}

// ---------------------------------------------------------------------------
// Cr50 — cr50 TPM vendor driver
// ---------------------------------------------------------------------------
pub struct Cr50<B, T> {
    pub(crate) dev: DeviceHandle<B, T>,
    pub(crate) chip: ChipState,
    pub(crate) config: Config,
}

impl<B: I2cBus, T: Timer> Cr50<B, T> {
    /// Creates an unconfigured driver. Call [`Cr50::init`] before any
    /// transfer.
    pub fn new(i2c: B, timer: T) -> Self {
        Self::with_config(i2c, timer, Config::default())
    }

    pub fn with_config(i2c: B, timer: T, config: Config) -> Self {
        Self {
            dev: DeviceHandle::new(i2c, timer, config.timeout_short_ms),
            chip: ChipState::default(),
            config,
        }
    }

    pub fn chip(&self) -> &ChipState {
        &self.chip
    }

    pub fn is_open(&self) -> bool {
        self.chip.is_open
    }

    pub fn locality(&self) -> u8 {
        self.chip.locality
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &B {
        self.dev.i2c()
    }

    pub fn timer(&self) -> &T {
        self.dev.timer()
    }

    /// Gives back the bus and timer.
    pub fn release(self) -> (B, T) {
        self.dev.into_parts()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Waits for the ValidSts bit in the locality 0 access register. Does
    /// not claim the locality.
    ///
    /// An address of 0 returns [`Error::Unconfigured`] at once, without
    /// configuring the handle or touching the bus. Otherwise the handle is
    /// configured and polled until the long timeout, giving
    /// [`Error::Timeout`] if the bit never shows.
    pub fn probe(&mut self, bus: u32, addr: u8) -> Result<()> {
        if addr == 0 {
            error!("cr50 probe: missing device address");
            return Err(Error::Unconfigured);
        }

        self.dev.configure(bus, addr);

        let sw = Stopwatch::expire_in(self.dev.timer(), self.config.timeout_long_ms);
        let mut access = AccessFlags::empty();
        let mut duration = u64::from(self.config.timeout_long_ms);
        loop {
            let mut buf = [0u8; 1];
            if self.dev.read(tpm_access(0), &mut buf).is_ok() {
                access = AccessFlags::from_bits_retain(buf[0]);
                if access.contains(AccessFlags::VALID) {
                    duration = sw.duration_ms(self.dev.timer());
                    break;
                }
            }

            self.dev.mdelay(self.config.timeout_short_ms);
            if sw.expired(self.dev.timer()) {
                break;
            }
        }

        let valid = access.contains(AccessFlags::VALID);
        info!(
            "cr50 probe: ValidSts bit {}({}) in TPM_ACCESS register after {} ms",
            if valid { "set" } else { "clear" },
            u8::from(valid),
            duration
        );

        if !valid {
            return Err(Error::Timeout);
        }

        Ok(())
    }

    /// Claims locality 0 and verifies the chip identity. Must succeed before
    /// any transfer.
    pub fn init(&mut self, bus: u32, addr: u8) -> Result<()> {
        if addr == 0 {
            error!("cr50 init: missing device address");
            return Err(Error::Unconfigured);
        }

        self.dev.configure(bus, addr);

        // Interrupts are not supported.
        self.chip = ChipState {
            locality: 0,
            is_open: false,
            irq: None,
        };

        self.request_locality(0)?;

        let mut did_vid = [0u8; 4];
        if let Err(e) = self.dev.read(tpm_did_vid(0), &mut did_vid) {
            error!("cr50 init: DID_VID read failed");
            self.release_locality(0, true);
            return Err(e);
        }

        let vendor = u32::from_le_bytes(did_vid);
        if vendor != self.config.did_vid {
            debug!("cr50 init: vendor id {:#010x} not recognized", vendor);
            self.release_locality(0, true);
            return Err(Error::IdentityMismatch(vendor));
        }

        debug!(
            "cr50 TPM {}:{:02x} (device-id {:#X})",
            self.dev.bus_id(),
            self.dev.addr(),
            vendor >> 16
        );

        self.chip.is_open = true;
        Ok(())
    }

    /// Gives up the active locality. Errors are ignored.
    pub fn cleanup(&mut self) {
        self.release_locality(self.chip.locality, true);
        self.chip.is_open = false;
    }

    // -----------------------------------------------------------------------
    // Status Register
    // -----------------------------------------------------------------------

    /// Reads the full 4-byte status register and returns the flag byte.
    /// A failed read reports no flags.
    fn read_status(&mut self) -> StsFlags {
        let mut buf = [0u8; 4];
        if self.dev.read(tpm_sts(self.chip.locality), &mut buf).is_err() {
            error!("cr50 status: failed to read status");
            return StsFlags::empty();
        }
        StsFlags::from_bits_retain(buf[0])
    }

    fn command_ready(&mut self) {
        let ready = StatusRegister::command(StsFlags::COMMAND_READY);
        if self.dev.write(tpm_sts(self.chip.locality), &ready).is_err() {
            warn!("cr50 ready: command ready write failed");
        }
        self.dev.mdelay(self.config.timeout_short_ms);
    }

    /// Polls the status register until every bit of `mask` is set and the
    /// burst count is usable. Failed reads are retried until the deadline.
    pub(crate) fn wait_burst_status(&mut self, mask: StsFlags) -> Result<StatusRegister> {
        let sts = tpm_sts(self.chip.locality);
        let sw = Stopwatch::expire_in(self.dev.timer(), self.config.timeout_long_ms);
        let mut last = None;

        while !sw.expired(self.dev.timer()) {
            let mut buf = [0u8; 4];
            match self.dev.read(sts, &mut buf) {
                Ok(()) => {}
                Err(Error::Unconfigured) => return Err(Error::Unconfigured),
                Err(_) => {
                    warn!("cr50 burst status: read of STS {:#04x} failed", sts);
                    self.dev.mdelay(self.config.timeout_short_ms);
                    continue;
                }
            }

            let reg = StatusRegister::from_bytes(buf);
            if reg.status.contains(mask) && reg.burst_is_valid() {
                return Ok(reg);
            }
            last = Some(reg);

            self.dev.mdelay(self.config.timeout_short_ms);
        }

        error!(
            "cr50 burst status: timeout waiting for {:?}, last status {:?}",
            mask, last
        );
        Err(Error::Timeout)
    }

    // -----------------------------------------------------------------------
    // Receive Pipeline
    // -----------------------------------------------------------------------
    fn receive_response(&mut self, buf: &mut [u8]) -> Result<usize> {
        let fifo = tpm_data_fifo(self.chip.locality);

        if buf.len() < TPM_HEADER_SIZE {
            error!(
                "cr50 recv: buffer of {} bytes is smaller than the header",
                buf.len()
            );
            return Err(Error::ProtocolViolation);
        }

        let reg = self.wait_burst_status(StsFlags::VALID)?;
        if !reg.status.contains(StsFlags::DATA_AVAIL) {
            error!("cr50 recv: first chunk not available");
            return Err(Error::ProtocolViolation);
        }

        // cr50 wants the whole burst drained, not just the header.
        let burst = usize::from(reg.burst_count);
        if burst > buf.len() {
            error!("cr50 recv: burst of {} exceeds buffer of {}", burst, buf.len());
            return Err(Error::OversizedPayload);
        }
        if burst < TPM_RSP_SIZE_BYTE + 4 {
            error!("cr50 recv: first chunk of {} bytes lacks the size field", burst);
            return Err(Error::ProtocolViolation);
        }

        if let Err(e) = self.dev.read(fifo, &mut buf[..burst]) {
            error!("cr50 recv: first chunk read failed");
            return Err(e);
        }

        let expected = response_size(&buf[..burst]).ok_or(Error::ProtocolViolation)?;
        if expected > buf.len() {
            error!("cr50 recv: too much data: {} > {}", expected, buf.len());
            return Err(Error::ProtocolViolation);
        }

        let mut current = burst;
        while current < expected {
            let reg = self.wait_burst_status(StsFlags::VALID)?;
            if !reg.status.contains(StsFlags::DATA_AVAIL) {
                error!("cr50 recv: data not available at {} of {}", current, expected);
                return Err(Error::ProtocolViolation);
            }

            let len = usize::from(reg.burst_count).min(expected - current);
            if let Err(e) = self.dev.read(fifo, &mut buf[current..current + len]) {
                error!("cr50 recv: read failed at {} of {}", current, expected);
                return Err(e);
            }

            current += len;
        }

        // The header length must drain the FIFO exactly.
        let reg = self.wait_burst_status(StsFlags::VALID)?;
        if reg.status.contains(StsFlags::DATA_AVAIL) {
            error!("cr50 recv: data still available after {} bytes", current);
            return Err(Error::ProtocolViolation);
        }

        if self.config.dump_transfers {
            dump_tpm_output_block(&buf[..current]);
        }

        Ok(current)
    }

    // -----------------------------------------------------------------------
    // Send Pipeline
    // -----------------------------------------------------------------------
    fn transmit_command(&mut self, buf: &[u8]) -> Result<usize> {
        if self.config.dump_transfers {
            dump_tpm_input_block(buf);
        }

        let result = self.wait_command_ready().and_then(|()| self.copy_command_data(buf));

        if result.is_err() {
            // Leave no half written command behind.
            if self.read_status().contains(StsFlags::COMMAND_READY) {
                self.command_ready();
            }
        }

        result
    }

    fn wait_command_ready(&mut self) -> Result<()> {
        let sw = Stopwatch::expire_in(self.dev.timer(), self.config.timeout_long_ms);

        while !self.read_status().contains(StsFlags::COMMAND_READY) {
            if sw.expired(self.dev.timer()) {
                error!("cr50 send: command ready timeout");
                return Err(Error::Timeout);
            }

            self.command_ready();
        }

        Ok(())
    }

    fn copy_command_data(&mut self, buf: &[u8]) -> Result<usize> {
        let locality = self.chip.locality;
        let mut sent = 0;

        // A burst count of 1 leaves no room for data, so progress is bounded
        // by its own deadline.
        let mut stall = Stopwatch::expire_in(self.dev.timer(), self.config.timeout_long_ms);

        while sent < buf.len() {
            let reg = self.wait_burst_status(StsFlags::VALID)?;
            if sent > 0 && !reg.status.contains(StsFlags::DATA_EXPECT) {
                error!("cr50 send: data not expected at {} of {}", sent, buf.len());
                return Err(Error::ProtocolViolation);
            }

            // One byte of every transfer is the register address.
            let limit = (usize::from(reg.burst_count) - 1).min(buf.len() - sent);
            if limit == 0 {
                if stall.expired(self.dev.timer()) {
                    error!("cr50 send: no FIFO room at {} of {}", sent, buf.len());
                    return Err(Error::Timeout);
                }
                self.dev.mdelay(self.config.timeout_short_ms);
                continue;
            }

            if let Err(e) = self.dev.write(tpm_data_fifo(locality), &buf[sent..sent + limit]) {
                error!("cr50 send: FIFO write failed at {} of {}", sent, buf.len());
                return Err(e);
            }

            sent += limit;
            stall = Stopwatch::expire_in(self.dev.timer(), self.config.timeout_long_ms);
        }

        let reg = self.wait_burst_status(StsFlags::VALID)?;
        if reg.status.contains(StsFlags::DATA_EXPECT) {
            error!("cr50 send: data still expected after {} bytes", sent);
            return Err(Error::ProtocolViolation);
        }

        if let Err(e) = self.dev.write(tpm_sts(locality), &StatusRegister::command(StsFlags::GO)) {
            error!("cr50 send: start command failed");
            return Err(e);
        }

        Ok(sent)
    }
}

// ---------------------------------------------------------------------------
// TpmVendorOps trait implementation for Cr50
// ---------------------------------------------------------------------------
impl<B: I2cBus, T: Timer> TpmVendorOps for Cr50<B, T> {
    const REQ_COMPLETE_MASK: StsFlags = StsFlags::DATA_AVAIL.union(StsFlags::VALID);
    const REQ_COMPLETE_VAL: StsFlags = StsFlags::DATA_AVAIL.union(StsFlags::VALID);
    const REQ_CANCELED: StsFlags = StsFlags::COMMAND_READY;

    fn status(&mut self) -> StsFlags {
        self.read_status()
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        self.transmit_command(buf)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.receive_response(buf)
    }

    fn cancel(&mut self) {
        self.command_ready();
    }
}
