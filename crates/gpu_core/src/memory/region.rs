//! Device memory regions

use ash::vk;

use super::MemoryFlags;
use crate::device::DeviceId;
use crate::error::{GfxError, GfxResult};

/// A range of device memory
///
/// A region returned by [`super::MemoryAllocator::allocate`] owns its memory
/// and must be handed back to [`super::MemoryAllocator::free`]. Views created
/// with [`MemoryRegion::borrowed`] or [`MemoryRegion::slice`] are external:
/// freeing them does nothing, and they must not outlive the owning region.
#[derive(Debug)]
pub struct MemoryRegion {
    device: DeviceId,
    memory: vk::DeviceMemory,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    memory_type: u32,
    flags: MemoryFlags,
    external: bool,
}

impl MemoryRegion {
    pub(crate) const fn owned(
        device: DeviceId,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
        memory_type: u32,
        flags: MemoryFlags,
    ) -> Self {
        Self {
            device,
            memory,
            offset: 0,
            size,
            memory_type,
            flags,
            external: false,
        }
    }

    /// Wrap memory allocated outside this crate
    ///
    /// The region is external, so the allocator never frees it.
    pub const fn from_raw(
        device: DeviceId,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        memory_type: u32,
        flags: MemoryFlags,
    ) -> Self {
        Self {
            device,
            memory,
            offset,
            size,
            memory_type,
            flags,
            external: true,
        }
    }

    /// External view of the whole region
    pub const fn borrowed(&self) -> Self {
        self.view(self.offset, self.size)
    }

    /// External view of `size` bytes starting `offset` bytes into the region
    ///
    /// A `size` of 0 selects everything after `offset`.
    pub fn slice(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<Self> {
        let out_of_range = || GfxError::OutOfRange {
            offset,
            size,
            available: self.size,
        };
        let remaining = self.size.checked_sub(offset).ok_or_else(out_of_range)?;
        let size = if size == 0 { remaining } else { size };
        if size > remaining {
            return Err(out_of_range());
        }
        Ok(self.view(self.offset + offset, size))
    }

    const fn view(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        Self {
            device: self.device,
            memory: self.memory,
            offset,
            size,
            memory_type: self.memory_type,
            flags: self.flags,
            external: true,
        }
    }

    /// Device the memory belongs to
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// Native memory handle
    pub const fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Offset of the region within its allocation
    pub const fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    /// Length in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Memory type index of the allocation
    pub const fn memory_type(&self) -> u32 {
        self.memory_type
    }

    /// Property flags of the memory type
    pub const fn flags(&self) -> MemoryFlags {
        self.flags
    }

    /// Whether the host can map the memory
    pub const fn is_host_visible(&self) -> bool {
        self.flags.contains(MemoryFlags::HOST_VISIBLE)
    }

    /// Whether the region is a view or was supplied from outside the crate
    pub const fn is_external(&self) -> bool {
        self.external
    }

    /// Whether the region has no memory behind it
    pub fn is_null(&self) -> bool {
        self.memory == vk::DeviceMemory::null()
    }

    /// Check that `len` bytes at `offset` lie within the region
    pub(crate) fn check_range(&self, offset: vk::DeviceSize, len: vk::DeviceSize) -> GfxResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(GfxError::OutOfRange {
                offset,
                size: len,
                available: self.size,
            }),
        }
    }
}
