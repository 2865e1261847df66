//! Device-side seam of the crate
//!
//! Everything this crate asks of the driver goes through [`DeviceDriver`].
//! [`AshDevice`] implements it on top of an `ash` logical device; tests use an
//! in-crate mock that records every call.

mod ash_device;
mod interfaces;
#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use ash::{prelude::VkResult, vk};

use crate::error::{ErrorDomain, ErrorKind, GfxError, GfxResult};

pub use ash_device::AshDevice;
pub use interfaces::{PipelineBinding, PipelineHandles, RenderPassInfo, RenderPassTarget};

/// Extension names that provide buffer device addresses
pub const BUFFER_DEVICE_ADDRESS_EXTENSIONS: [&str; 2] =
    ["VK_KHR_buffer_device_address", "VK_EXT_buffer_device_address"];

/// Index of a device registered with a [`crate::GfxContext`]
pub type DeviceId = usize;

/// Parameters of a render pass begin
#[derive(Clone)]
pub struct RenderPassBegin<'a> {
    /// Render pass handle
    pub render_pass: vk::RenderPass,
    /// Framebuffer the pass renders into
    pub framebuffer: vk::Framebuffer,
    /// Render area
    pub render_area: vk::Rect2D,
    /// One clear value per attachment
    pub clear_values: &'a [vk::ClearValue],
}

/// Inheritance of a secondary command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inheritance {
    /// Render pass the secondary buffer executes within
    pub render_pass: vk::RenderPass,
    /// Subpass index within `render_pass`
    pub subpass: u32,
    /// Framebuffer, may be null
    pub framebuffer: vk::Framebuffer,
}

/// Parameters of a command buffer begin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandBufferBegin {
    /// Usage flags
    pub usage: vk::CommandBufferUsageFlags,
    /// Inheritance for secondary buffers
    pub inheritance: Option<Inheritance>,
}

/// Buffer range barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    /// Buffer the barrier applies to
    pub buffer: vk::Buffer,
    /// Access that must complete first
    pub src_access: vk::AccessFlags,
    /// Access that waits
    pub dst_access: vk::AccessFlags,
    /// Start of the range
    pub offset: vk::DeviceSize,
    /// Length of the range, `vk::WHOLE_SIZE` for everything
    pub size: vk::DeviceSize,
}

/// Driver operations consumed by this crate
///
/// Methods mirror the driver entry points one to one; fallible calls return
/// the raw `vk::Result` so callers can route it through the error domain.
pub trait DeviceDriver: Send + Sync {
    /// Memory heaps and types of the physical device
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties;
    /// Whether the device was created with the named extension
    fn supports_extension(&self, name: &str) -> bool;
    /// Block until the device is idle
    fn wait_idle(&self) -> VkResult<()>;

    /// Create a command pool for a queue family
    fn create_command_pool(&self, queue_family: u32, flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool>;
    /// Destroy a command pool and every buffer allocated from it
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    /// Allocate `count` command buffers at `level`
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    /// Return command buffers to their pool
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);

    /// Create a fence
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);
    /// Wait for a fence; `timeout` is in nanoseconds and `u64::MAX` never expires
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;
    /// Reset a fence to unsignaled
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    /// Create a buffer object
    fn create_buffer(&self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer>;
    /// Destroy a buffer object
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// Memory requirements of a buffer object
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    /// Bind a buffer to memory at `offset`
    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()>;
    /// Device address of a buffer created with `SHADER_DEVICE_ADDRESS`
    fn buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress;

    /// Allocate device memory
    fn allocate_memory(&self, size: vk::DeviceSize, memory_type: u32, device_address: bool) -> VkResult<vk::DeviceMemory>;
    /// Release device memory
    fn free_memory(&self, memory: vk::DeviceMemory);
    /// Copy `data` into host-visible memory at `offset`
    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> VkResult<()>;
    /// Copy host-visible memory at `offset` into `out`
    fn read_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, out: &mut [u8]) -> VkResult<()>;

    /// Begin recording
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, begin: &CommandBufferBegin) -> VkResult<()>;
    /// End recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    /// Begin a render pass
    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin<'_>, contents: vk::SubpassContents);
    /// Advance to the next subpass
    fn cmd_next_subpass(&self, command_buffer: vk::CommandBuffer, contents: vk::SubpassContents);
    /// End the current render pass
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    /// Execute secondary command buffers
    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]);
    /// Bind a pipeline
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    /// Bind descriptor sets starting at `first_set`
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    /// Upload push constant bytes
    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    /// Bind vertex buffers
    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    /// Bind an index buffer
    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );
    /// Non-indexed draw
    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    /// Indexed draw
    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    /// Set dynamic viewports
    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, first: u32, viewports: &[vk::Viewport]);
    /// Set dynamic scissors
    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, first: u32, scissors: &[vk::Rect2D]);
    /// Record a buffer memory barrier
    fn cmd_buffer_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &BufferBarrier,
    );

    /// Whether buffer device addresses are available
    fn supports_buffer_device_address(&self) -> bool {
        BUFFER_DEVICE_ADDRESS_EXTENSIONS
            .iter()
            .any(|name| self.supports_extension(name))
    }
}

/// A driver registered with a context, together with its id
#[derive(Clone)]
pub struct Device {
    id: DeviceId,
    driver: Arc<dyn DeviceDriver>,
}

impl Device {
    pub(crate) fn new(id: DeviceId, driver: Arc<dyn DeviceDriver>) -> Self {
        Self { id, driver }
    }

    /// Registration id
    pub const fn id(&self) -> DeviceId {
        self.id
    }

    /// Driver entry points
    pub fn driver(&self) -> &dyn DeviceDriver {
        self.driver.as_ref()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Devices registered with one context, indexed by [`DeviceId`]
pub(crate) struct DeviceRegistry {
    errors: Arc<ErrorDomain>,
    devices: RwLock<Vec<Device>>,
}

impl DeviceRegistry {
    pub(crate) fn new(errors: Arc<ErrorDomain>) -> Self {
        Self {
            errors,
            devices: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, driver: Arc<dyn DeviceDriver>) -> DeviceId {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let id = devices.len();
        devices.push(Device::new(id, driver));
        log::debug!("Registered device {id}");
        id
    }

    /// Look up a device, reporting [`ErrorKind::DeviceNotFound`] for unknown ids
    pub(crate) fn get(&self, id: DeviceId) -> GfxResult<Device> {
        let device = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        device.ok_or_else(|| {
            self.errors.report(ErrorKind::DeviceNotFound);
            GfxError::DeviceNotFound(id)
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A device queue
///
/// Queues are owned by the device; this is a plain descriptor used to key
/// command pools and to route submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Queue {
    device: DeviceId,
    family: u32,
    handle: vk::Queue,
}

impl Queue {
    /// Describe queue `handle` of `family` on `device`
    pub const fn new(device: DeviceId, family: u32, handle: vk::Queue) -> Self {
        Self { device, family, handle }
    }

    /// Device the queue belongs to
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// Queue family index
    pub const fn family(&self) -> u32 {
        self.family
    }

    /// Native queue handle
    pub const fn handle(&self) -> vk::Queue {
        self.handle
    }
}
