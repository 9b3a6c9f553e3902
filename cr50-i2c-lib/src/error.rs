use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The device handle has no bus address yet.
    #[error("device handle has no bus address")]
    Unconfigured,

    #[error("i2c bus transfer failed")]
    BusTransferFailed,

    /// A status, burst count, locality or command ready condition was not
    /// met before the deadline.
    #[error("timed out waiting for the tpm")]
    Timeout,

    /// The chip reported data availability or expectation that does not
    /// match the progress of the transfer, or a length field is unusable.
    #[error("tpm protocol violation")]
    ProtocolViolation,

    #[error("unexpected DID_VID {0:#010x}")]
    IdentityMismatch(u32),

    /// A single transfer exceeds the 63 byte limit or the caller's buffer.
    #[error("payload exceeds transfer limit")]
    OversizedPayload,
}
