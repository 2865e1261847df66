//! GPU buffers bound to device memory
//!
//! A [`GpuBuffer`] is created empty and becomes usable once
//! [`GpuBuffer::initialize`] (own memory) or [`GpuBuffer::initialize_in`]
//! (caller supplied region) returns `Ok(true)`.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use bitflags::bitflags;

use crate::context::GfxContext;
use crate::device::{Device, DeviceId};
use crate::error::{GfxError, GfxResult};
use crate::memory::MemoryRegion;

bitflags! {
    /// Buffer usage
    ///
    /// Bit values match `vk::BufferUsageFlags`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        /// Source of transfer commands
        const TRANSFER_SRC   = 1 << 0;
        /// Destination of transfer commands
        const TRANSFER_DST   = 1 << 1;
        /// Uniform buffer
        const UNIFORM        = 1 << 4;
        /// Storage buffer
        const STORAGE        = 1 << 5;
        /// Index buffer
        const INDEX          = 1 << 6;
        /// Vertex buffer
        const VERTEX         = 1 << 7;
        /// Indirect draw arguments
        const INDIRECT       = 1 << 8;
        /// Shader device address
        const DEVICE_ADDRESS = 1 << 17;
    }
}

impl From<BufferUsage> for vk::BufferUsageFlags {
    fn from(usage: BufferUsage) -> Self {
        Self::from_raw(usage.bits())
    }
}

/// Usage every buffer gets so it can take part in transfers
const DEFAULT_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::TRANSFER_SRC.as_raw() | vk::BufferUsageFlags::TRANSFER_DST.as_raw(),
);

/// Buffer object bound to a [`MemoryRegion`]
///
/// Buffers are move-only. Dropping one destroys the buffer object and releases
/// memory it allocated itself; regions supplied through
/// [`GpuBuffer::initialize_in`] are left alone.
pub struct GpuBuffer {
    context: Arc<GfxContext>,
    device: Option<DeviceId>,
    handle: vk::Buffer,
    requested_size: vk::DeviceSize,
    requirements: vk::MemoryRequirements,
    memory: Option<MemoryRegion>,
    usage: vk::BufferUsageFlags,
    address: Option<vk::DeviceAddress>,
    host_local: bool,
    initialized: bool,
}

impl GpuBuffer {
    /// Empty buffer; nothing is created until it is initialized
    pub fn new(context: &Arc<GfxContext>) -> Self {
        Self {
            context: Arc::clone(context),
            device: None,
            handle: vk::Buffer::null(),
            requested_size: 0,
            requirements: vk::MemoryRequirements::default(),
            memory: None,
            usage: vk::BufferUsageFlags::empty(),
            address: None,
            host_local: false,
            initialized: false,
        }
    }

    /// Create a `size` byte buffer on `device` backed by a fresh allocation
    ///
    /// Returns `Ok(false)` when the memory cannot hold the buffer. An already
    /// initialized buffer is reset first.
    pub fn initialize(
        &mut self,
        device: DeviceId,
        size: vk::DeviceSize,
        host_local: bool,
        usage: BufferUsage,
    ) -> GfxResult<bool> {
        self.reset();
        let device = self.context.device(device)?;
        self.create(&device, size, host_local, usage, None)
    }

    /// Create a buffer inside an externally supplied region
    ///
    /// Device and host visibility come from the region. A `size` of 0 uses the
    /// whole region. Returns `Ok(false)` when the region is too small or
    /// misaligned for the buffer.
    pub fn initialize_in(&mut self, region: &MemoryRegion, size: vk::DeviceSize, usage: BufferUsage) -> GfxResult<bool> {
        self.reset();
        let device = self.context.device(region.device())?;
        let size = if size == 0 { region.size() } else { size };
        self.create(&device, size, region.is_host_visible(), usage, Some(region.borrowed()))
    }

    fn create(
        &mut self,
        device: &Device,
        size: vk::DeviceSize,
        host_local: bool,
        usage: BufferUsage,
        region: Option<MemoryRegion>,
    ) -> GfxResult<bool> {
        let context = Arc::clone(&self.context);
        let driver = device.driver();
        let errors = context.errors();
        let device_address = driver.supports_buffer_device_address();

        let mut flags = DEFAULT_USAGE | vk::BufferUsageFlags::from(usage);
        if device_address {
            flags |= vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
        }

        self.device = Some(device.id());
        self.requested_size = size;
        self.usage = flags;
        self.host_local = host_local;
        self.handle = errors.check(driver.create_buffer(size, flags))?;
        self.requirements = driver.buffer_memory_requirements(self.handle);

        let region = match region {
            Some(region) => region,
            None => match context.allocator().allocate(
                device.id(),
                self.requirements.size,
                self.requirements.memory_type_bits,
                host_local,
            ) {
                Ok(region) => region,
                Err(err) => {
                    self.reset();
                    return Err(err);
                }
            },
        };

        let alignment = self.requirements.alignment.max(1);
        if self.requirements.size > region.size() || region.offset() % alignment != 0 {
            log::warn!(
                "Buffer needs {} bytes aligned to {alignment}, region has {} bytes at offset {}",
                self.requirements.size,
                region.size(),
                region.offset()
            );
            self.memory = Some(region);
            return Ok(false);
        }

        let bound = errors.check(driver.bind_buffer_memory(self.handle, region.handle(), region.offset()));
        self.memory = Some(region);
        if let Err(err) = bound {
            self.reset();
            return Err(err);
        }

        self.address = device_address.then(|| driver.buffer_device_address(self.handle));
        self.initialized = true;
        log::debug!(
            "Created {size} byte buffer ({} required) on device {} with {flags:?}",
            self.requirements.size,
            device.id()
        );
        Ok(true)
    }

    /// Destroy the buffer object and release memory this buffer allocated
    ///
    /// Safe to call repeatedly.
    pub fn reset(&mut self) {
        let Some(device_id) = self.device.take() else {
            return;
        };

        if let Ok(device) = self.context.device(device_id) {
            if self.handle != vk::Buffer::null() {
                device.driver().destroy_buffer(self.handle);
            }
        }
        if let Some(region) = self.memory.take() {
            self.context.allocator().free(region);
        }

        self.handle = vk::Buffer::null();
        self.requirements = vk::MemoryRequirements::default();
        self.address = None;
        self.initialized = false;
    }

    /// Copy `data` into the buffer at `offset`
    ///
    /// The buffer must live in host-visible memory.
    pub fn write(&self, data: &[u8], offset: vk::DeviceSize) -> GfxResult<()> {
        let region = self.bound_region()?;
        self.context.allocator().copy_to_device(region, data, offset)
    }

    /// Copy a slice of plain values into the buffer at `offset`
    pub fn write_slice<T: bytemuck::Pod>(&self, values: &[T], offset: vk::DeviceSize) -> GfxResult<()> {
        self.write(bytemuck::cast_slice(values), offset)
    }

    /// Copy buffer contents starting at `offset` into `out`
    pub fn read(&self, out: &mut [u8], offset: vk::DeviceSize) -> GfxResult<()> {
        let region = self.bound_region()?;
        self.context.allocator().copy_to_host(region, out, offset)
    }

    fn bound_region(&self) -> GfxResult<&MemoryRegion> {
        match (&self.memory, self.initialized) {
            (Some(region), true) => Ok(region),
            _ => Err(GfxError::invalid_state("buffer is not initialized")),
        }
    }

    /// Native buffer handle, null before initialization
    pub const fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Device the buffer was created on
    pub const fn device(&self) -> Option<DeviceId> {
        self.device
    }

    /// Size the driver requires for the buffer
    pub const fn size(&self) -> vk::DeviceSize {
        self.requirements.size
    }

    /// Size passed to initialization
    pub const fn requested_size(&self) -> vk::DeviceSize {
        self.requested_size
    }

    /// Memory requirements reported by the driver
    pub const fn requirements(&self) -> vk::MemoryRequirements {
        self.requirements
    }

    /// Usage flags the buffer was created with
    pub const fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Region the buffer is bound to
    pub const fn memory(&self) -> Option<&MemoryRegion> {
        self.memory.as_ref()
    }

    /// Whether host-visible memory was requested
    pub const fn is_host_local(&self) -> bool {
        self.host_local
    }

    /// Whether the buffer is bound and usable
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the backing memory was supplied by the caller
    pub fn is_externally_backed(&self) -> bool {
        self.memory.as_ref().is_some_and(MemoryRegion::is_external)
    }

    /// Device address `offset` bytes into the buffer, when the device supports
    /// buffer device addresses
    pub fn address(&self, offset: vk::DeviceSize) -> Option<vk::DeviceAddress> {
        self.address.map(|address| address + offset)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("device", &self.device)
            .field("handle", &self.handle)
            .field("size", &self.requirements.size)
            .field("usage", &self.usage)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}
