//! Locality arbitration through the TIS access register.

use log::{error, warn};

use crate::platform::{I2cBus, Stopwatch, Timer};
use crate::registers::{tpm_access, AccessFlags};
use crate::{Cr50, Error, Result};

impl<B: I2cBus, T: Timer> Cr50<B, T> {
    /// Returns true when `locality` is active and valid, and records it as
    /// the chip's locality.
    pub(crate) fn check_locality(&mut self, locality: u8) -> bool {
        let mut buf = [0u8; 1];
        if self.dev.read(tpm_access(locality), &mut buf).is_err() {
            return false;
        }

        let access = AccessFlags::from_bits_retain(buf[0]);
        if access.contains(AccessFlags::ACTIVE_LOCALITY | AccessFlags::VALID) {
            self.chip.locality = locality;
            return true;
        }

        false
    }

    /// Best effort. Used on cleanup and error unwind so failures are only
    /// logged.
    pub(crate) fn release_locality(&mut self, locality: u8, force: bool) {
        let mut buf = [0u8; 1];
        if self.dev.read(tpm_access(locality), &mut buf).is_err() {
            return;
        }

        let access = AccessFlags::from_bits_retain(buf[0]);
        if force || access.contains(AccessFlags::REQUEST_PENDING | AccessFlags::VALID) {
            let relinquish = [AccessFlags::ACTIVE_LOCALITY.bits()];
            if self.dev.write(tpm_access(locality), &relinquish).is_err() {
                warn!("cr50 locality: relinquish write for locality {} failed", locality);
            }
        }
    }

    pub(crate) fn request_locality(&mut self, locality: u8) -> Result<u8> {
        if self.check_locality(locality) {
            return Ok(locality);
        }

        let request = [AccessFlags::REQUEST_USE.bits()];
        if self.dev.write(tpm_access(locality), &request).is_err() {
            warn!("cr50 locality: request write for locality {} failed", locality);
        }

        let sw = Stopwatch::expire_in(self.dev.timer(), self.config.timeout_long_ms);
        while !sw.expired(self.dev.timer()) {
            if self.check_locality(locality) {
                return Ok(locality);
            }
            self.dev.mdelay(self.config.locality_poll_ms);
        }

        error!(
            "cr50 locality: locality {} not granted after {} ms",
            locality,
            sw.duration_ms(self.dev.timer())
        );
        Err(Error::Timeout)
    }
}
