//! Device memory allocation
//!
//! Every allocation is a fresh driver allocation matched to a resource's
//! memory requirements. There is no pooling or sub-allocation here; callers
//! that want it carve [`MemoryRegion::slice`] views out of a larger region.

mod region;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use ash::vk;
use bitflags::bitflags;

use crate::config::GfxConfig;
use crate::device::{DeviceId, DeviceRegistry};
use crate::error::{ErrorDomain, ErrorKind, GfxError, GfxResult};

pub use region::MemoryRegion;

bitflags! {
    /// Memory property flags
    ///
    /// Bit values match `vk::MemoryPropertyFlags`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MemoryFlags: u32 {
        /// Fastest memory for device access
        const DEVICE_LOCAL  = 1 << 0;
        /// Mappable by the host
        const HOST_VISIBLE  = 1 << 1;
        /// Host writes are visible without explicit flushes
        const HOST_COHERENT = 1 << 2;
        /// Host reads are cached
        const HOST_CACHED   = 1 << 3;
    }
}

impl MemoryFlags {
    /// Mappable, coherent memory
    pub const fn host_visible() -> Self {
        Self::HOST_VISIBLE.union(Self::HOST_COHERENT)
    }

    /// Flags requested for a host-visible or device-local allocation
    pub const fn for_host_access(host_visible: bool) -> Self {
        if host_visible {
            Self::host_visible()
        } else {
            Self::DEVICE_LOCAL
        }
    }
}

impl From<MemoryFlags> for vk::MemoryPropertyFlags {
    fn from(flags: MemoryFlags) -> Self {
        Self::from_raw(flags.bits())
    }
}

impl From<vk::MemoryPropertyFlags> for MemoryFlags {
    fn from(flags: vk::MemoryPropertyFlags) -> Self {
        Self::from_bits_truncate(flags.as_raw())
    }
}

/// First memory type allowed by `type_filter` whose properties include `flags`
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    flags: MemoryFlags,
) -> Option<u32> {
    let wanted = vk::MemoryPropertyFlags::from(flags);
    let count = properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count).find(|&i| {
        (type_filter & (1 << i)) != 0 && properties.memory_types[i as usize].property_flags.contains(wanted)
    })
}

/// Allocation counters of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationStats {
    /// Allocations not yet freed
    pub live_allocations: usize,
    /// Bytes not yet freed
    pub live_bytes: vk::DeviceSize,
    /// Allocations made over the allocator's lifetime
    pub total_allocations: usize,
    /// Highest value `live_bytes` has reached
    pub peak_bytes: vk::DeviceSize,
}

/// Device memory allocator of a [`crate::GfxContext`]
pub struct MemoryAllocator {
    devices: Arc<DeviceRegistry>,
    errors: Arc<ErrorDomain>,
    type_fallback: bool,
    stats: Mutex<HashMap<DeviceId, AllocationStats>>,
}

impl MemoryAllocator {
    pub(crate) fn new(devices: Arc<DeviceRegistry>, errors: Arc<ErrorDomain>, config: &GfxConfig) -> Self {
        Self {
            devices,
            errors,
            type_fallback: config.memory_type_fallback,
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate `size` bytes of host-visible or device-local memory
    ///
    /// `type_filter` is the `memory_type_bits` mask from the resource's memory
    /// requirements.
    pub fn allocate(
        &self,
        device: DeviceId,
        size: vk::DeviceSize,
        type_filter: u32,
        host_visible: bool,
    ) -> GfxResult<MemoryRegion> {
        self.allocate_with_flags(device, size, type_filter, MemoryFlags::for_host_access(host_visible))
    }

    /// Allocate `size` bytes from the first memory type that has every flag in `flags`
    ///
    /// When no type qualifies, [`ErrorKind::FeatureNotPresent`] is reported and
    /// the allocation fails, unless the memory type fallback is enabled in
    /// which case type 0 is used.
    pub fn allocate_with_flags(
        &self,
        device_id: DeviceId,
        size: vk::DeviceSize,
        type_filter: u32,
        flags: MemoryFlags,
    ) -> GfxResult<MemoryRegion> {
        let device = self.devices.get(device_id)?;
        let driver = device.driver();
        let properties = driver.memory_properties();

        let memory_type = match find_memory_type(&properties, type_filter, flags) {
            Some(index) => index,
            None => {
                self.errors.report(ErrorKind::FeatureNotPresent);
                if !self.type_fallback {
                    return Err(GfxError::NoSuitableMemoryType {
                        filter: type_filter,
                        flags: flags.into(),
                    });
                }
                log::warn!(
                    "No memory type matches filter {type_filter:#b} with {flags:?}, falling back to type 0"
                );
                0
            }
        };

        let type_flags = MemoryFlags::from(properties.memory_types[memory_type as usize].property_flags);
        let memory = self.errors.check(driver.allocate_memory(
            size,
            memory_type,
            driver.supports_buffer_device_address(),
        ))?;

        self.track(device_id, |stats| {
            stats.live_allocations += 1;
            stats.total_allocations += 1;
            stats.live_bytes += size;
            stats.peak_bytes = stats.peak_bytes.max(stats.live_bytes);
        });
        log::debug!("Allocated {size} bytes of memory type {memory_type} ({type_flags:?}) on device {device_id}");

        Ok(MemoryRegion::owned(device_id, memory, size, memory_type, type_flags))
    }

    /// Release a region
    ///
    /// Null and external regions are ignored.
    pub fn free(&self, region: MemoryRegion) {
        if region.is_null() || region.is_external() {
            return;
        }
        let Ok(device) = self.devices.get(region.device()) else {
            return;
        };

        device.driver().free_memory(region.handle());
        self.track(region.device(), |stats| {
            stats.live_allocations = stats.live_allocations.saturating_sub(1);
            stats.live_bytes = stats.live_bytes.saturating_sub(region.size());
        });
        log::debug!("Freed {} bytes on device {}", region.size(), region.device());
    }

    /// Copy `data` into a host-visible region at `offset`
    pub fn copy_to_device(&self, region: &MemoryRegion, data: &[u8], offset: vk::DeviceSize) -> GfxResult<()> {
        self.check_host_access(region, offset, data.len())?;
        let device = self.devices.get(region.device())?;
        self.errors
            .check(device.driver().write_memory(region.handle(), region.offset() + offset, data))
    }

    /// Copy from a host-visible region at `offset` into `out`
    pub fn copy_to_host(&self, region: &MemoryRegion, out: &mut [u8], offset: vk::DeviceSize) -> GfxResult<()> {
        self.check_host_access(region, offset, out.len())?;
        let device = self.devices.get(region.device())?;
        self.errors
            .check(device.driver().read_memory(region.handle(), region.offset() + offset, out))
    }

    /// Allocation counters for a device
    pub fn stats(&self, device: DeviceId) -> AllocationStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device)
            .copied()
            .unwrap_or_default()
    }

    fn check_host_access(&self, region: &MemoryRegion, offset: vk::DeviceSize, len: usize) -> GfxResult<()> {
        if !region.is_host_visible() {
            return Err(GfxError::NotHostVisible);
        }
        region.check_range(offset, len as vk::DeviceSize)
    }

    fn track(&self, device: DeviceId, update: impl FnOnce(&mut AllocationStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        update(stats.entry(device).or_default());
    }
}

impl std::fmt::Debug for MemoryAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAllocator")
            .field("type_fallback", &self.type_fallback)
            .finish_non_exhaustive()
    }
}
