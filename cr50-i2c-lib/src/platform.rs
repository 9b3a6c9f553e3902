//! Collaborators the driver runs on top of: the raw I2C bus and a
//! millisecond timer.

use core::fmt::Debug;

/// Raw I2C master access. Implementations handle their own bus locking if
/// the bus is shared with other early boot users.
pub trait I2cBus {
    type Error: Debug;

    /// Reads `buf.len()` bytes from the device at 7-bit `addr` on `bus`.
    fn read_raw(&mut self, bus: u32, addr: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes `data` to the device at 7-bit `addr` on `bus`.
    fn write_raw(&mut self, bus: u32, addr: u8, data: &[u8]) -> Result<(), Self::Error>;
}

/// Monotonic time source plus blocking delay.
pub trait Timer {
    /// Milliseconds since an arbitrary fixed point.
    fn now_ms(&self) -> u64;

    fn mdelay(&mut self, ms: u32);
}

/// Elapsed-time deadline measured against a [`Timer`].
#[derive(Clone, Copy, Debug)]
pub struct Stopwatch {
    start: u64,
    expires: u64,
}

impl Stopwatch {
    pub fn expire_in<T: Timer + ?Sized>(timer: &T, ms: u32) -> Self {
        let start = timer.now_ms();
        Self {
            start,
            expires: start.saturating_add(u64::from(ms)),
        }
    }

    pub fn expired<T: Timer + ?Sized>(&self, timer: &T) -> bool {
        timer.now_ms() >= self.expires
    }

    pub fn duration_ms<T: Timer + ?Sized>(&self, timer: &T) -> u64 {
        timer.now_ms().saturating_sub(self.start)
    }
}
