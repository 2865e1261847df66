//! Per-slot fence bookkeeping

use std::time::Duration;

use ash::vk;

use crate::device::DeviceDriver;
use crate::error::{ErrorDomain, ErrorKind, GfxError, GfxResult};

/// Fence of one command buffer slot
///
/// `pending` means the fence may still be signaled by a submission and has to
/// be waited on before the slot is recorded again. Fences start out signaled
/// and pending, so the first record waits once and returns immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFence {
    fence: vk::Fence,
    pending: bool,
}

impl SlotFence {
    pub(crate) const fn new(fence: vk::Fence) -> Self {
        Self { fence, pending: true }
    }

    /// Native fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Whether the next record has to wait on the fence
    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    /// Record that the fence was handed to a submission
    pub fn mark_pending(&mut self) {
        self.pending = true;
    }

    /// Record that the fence no longer needs a wait
    pub fn mark_complete(&mut self) {
        self.pending = false;
    }

    /// Wait for the fence, reset it and mark it complete
    ///
    /// `None` waits forever. An expired bounded wait is returned as
    /// [`GfxError::TimedOut`] without being reported, and leaves the fence
    /// pending.
    pub(crate) fn wait_and_reset(
        &mut self,
        driver: &dyn DeviceDriver,
        errors: &ErrorDomain,
        timeout: Option<Duration>,
    ) -> GfxResult<()> {
        let timeout_ns = timeout.map_or(u64::MAX, |t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX));

        match (driver.wait_for_fence(self.fence, timeout_ns), timeout) {
            (Ok(()), _) => {}
            (Err(vk::Result::TIMEOUT), Some(timeout)) => {
                log::warn!("Fence {:?} still unsignaled after {timeout:?}", self.fence);
                return Err(GfxError::TimedOut(timeout));
            }
            (Err(result), _) => return Err(errors.fail(ErrorKind::from(result), result)),
        }

        errors.check(driver.reset_fence(self.fence))?;
        self.mark_complete();
        Ok(())
    }
}
