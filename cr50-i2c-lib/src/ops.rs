use crate::registers::StsFlags;
use crate::Result;

// ---------------------------------------------------------------------------
// TpmVendorOps Trait
// ---------------------------------------------------------------------------
/// Vendor specific transfer capabilities consumed by the interface
/// independent TPM layer. The upper layer polls [`status`](Self::status)
/// against the completion masks between a send and a receive.
pub trait TpmVendorOps {
    const REQ_COMPLETE_MASK: StsFlags;
    const REQ_COMPLETE_VAL: StsFlags;
    const REQ_CANCELED: StsFlags;

    fn status(&mut self) -> StsFlags;
    fn send(&mut self, buf: &[u8]) -> Result<usize>;
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn cancel(&mut self);
}
