//! TIS register addresses and bit definitions as seen through the cr50 I2C
//! interface.

use bitflags::bitflags;

// ---------------------------------------------------------------------------
// cr50 Constants
// ---------------------------------------------------------------------------
pub const CR50_MAX_BUFSIZE: usize = 63;
pub const CR50_TIMEOUT_LONG_MS: u32 = 2000; // Long timeout while waiting for TPM
pub const CR50_TIMEOUT_SHORT_MS: u32 = 2; // Short timeout during transactions
pub const CR50_DID_VID: u32 = 0x0028_1ae0;

// Generic TPM polling interval used while waiting for a locality grant.
pub const TPM_TIMEOUT_MS: u32 = 1;

// ---------------------------------------------------------------------------
// TPM Response Header
// ---------------------------------------------------------------------------
pub const TPM_HEADER_SIZE: usize = 10;
pub const TPM_RSP_SIZE_BYTE: usize = 2;

// ---------------------------------------------------------------------------
// TIS Registers
// ---------------------------------------------------------------------------
pub const fn tpm_access(locality: u8) -> u8 {
    (locality << 4) & 0xF0
}

pub const fn tpm_sts(locality: u8) -> u8 {
    0x01 | ((locality << 4) & 0xF0)
}

pub const fn tpm_data_fifo(locality: u8) -> u8 {
    0x05 | ((locality << 4) & 0xF0)
}

pub const fn tpm_did_vid(locality: u8) -> u8 {
    0x06 | ((locality << 4) & 0xF0)
}

bitflags! {
    /// Byte 0 of the status register.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct StsFlags: u8 {
        const VALID = 1 << 7;
        const COMMAND_READY = 1 << 6;
        /// Write only.
        const GO = 1 << 5;
        const DATA_AVAIL = 1 << 4;
        const DATA_EXPECT = 1 << 3;
    }
}

bitflags! {
    /// The access register.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct AccessFlags: u8 {
        const VALID = 1 << 7;
        const ACTIVE_LOCALITY = 1 << 5;
        const REQUEST_PENDING = 1 << 2;
        const REQUEST_USE = 1 << 1;
    }
}

/// Decoded 4-byte status register. Byte 0 carries the flags and bytes 1..3
/// the little-endian burst count. Byte 3 is unused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusRegister {
    pub status: StsFlags,
    pub burst_count: u16,
}

impl StatusRegister {
    pub fn from_bytes(raw: [u8; 4]) -> Self {
        Self {
            status: StsFlags::from_bits_retain(raw[0]),
            burst_count: u16::from_le_bytes([raw[1], raw[2]]),
        }
    }

    /// The status register image for a flag write. The chip rejects
    /// anything narrower than 4 bytes.
    pub fn command(flags: StsFlags) -> [u8; 4] {
        [flags.bits(), 0, 0, 0]
    }

    pub fn burst_is_valid(&self) -> bool {
        self.burst_count > 0 && usize::from(self.burst_count) <= CR50_MAX_BUFSIZE
    }
}

/// Reads the big-endian response size field from a TPM response header.
pub fn response_size(header: &[u8]) -> Option<usize> {
    let field = header.get(TPM_RSP_SIZE_BYTE..TPM_RSP_SIZE_BYTE + 4)?;
    let size = u32::from_be_bytes([field[0], field[1], field[2], field[3]]);
    usize::try_from(size).ok()
}
