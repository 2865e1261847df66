//! [`DeviceDriver`] implementation over an `ash` logical device

use std::collections::HashSet;
use std::ffi::CStr;

use ash::{prelude::VkResult, vk};

use super::{BufferBarrier, CommandBufferBegin, DeviceDriver, RenderPassBegin};

/// Logical device created by the application
///
/// The device is borrowed, not owned: dropping an `AshDevice` does not destroy
/// the underlying `ash::Device`.
pub struct AshDevice {
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    extensions: HashSet<String>,
}

impl AshDevice {
    /// Wrap `device`, created from `physical_device` with `enabled_extensions`
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        enabled_extensions: &[&CStr],
    ) -> Self {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let extensions = enabled_extensions
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        log::debug!(
            "Wrapping logical device with {} memory types and extensions {:?}",
            memory_properties.memory_type_count,
            extensions
        );

        Self {
            device,
            memory_properties,
            extensions,
        }
    }

    /// The wrapped `ash` device
    pub const fn raw(&self) -> &ash::Device {
        &self.device
    }
}

impl DeviceDriver for AshDevice {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory_properties
    }

    fn supports_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn create_command_pool(&self, queue_family: u32, flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family);

        unsafe { self.device.create_command_pool(&pool_create_info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        unsafe { self.device.create_fence(&create_info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn create_buffer(&self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe { self.device.create_buffer(&buffer_info, None) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, offset) }
    }

    fn buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::builder().buffer(buffer);
        unsafe { self.device.get_buffer_device_address(&info) }
    }

    fn allocate_memory(&self, size: vk::DeviceSize, memory_type: u32, device_address: bool) -> VkResult<vk::DeviceMemory> {
        let mut flags_info = vk::MemoryAllocateFlagsInfo::builder().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let mut alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(memory_type);
        if device_address {
            alloc_info = alloc_info.push_next(&mut flags_info);
        }

        unsafe { self.device.allocate_memory(&alloc_info, None) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> VkResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        unsafe {
            let mapped = self
                .device
                .map_memory(memory, offset, data.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    fn read_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, out: &mut [u8]) -> VkResult<()> {
        if out.is_empty() {
            return Ok(());
        }
        unsafe {
            let mapped = self
                .device
                .map_memory(memory, offset, out.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(mapped.cast::<u8>().cast_const(), out.as_mut_ptr(), out.len());
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, begin: &CommandBufferBegin) -> VkResult<()> {
        let inheritance = begin.inheritance.map(|inheritance| {
            vk::CommandBufferInheritanceInfo::builder()
                .render_pass(inheritance.render_pass)
                .subpass(inheritance.subpass)
                .framebuffer(inheritance.framebuffer)
                .build()
        });

        let mut begin_info = vk::CommandBufferBeginInfo::builder().flags(begin.usage);
        if let Some(inheritance) = inheritance.as_ref() {
            begin_info = begin_info.inheritance_info(inheritance);
        }

        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin<'_>, contents: vk::SubpassContents) {
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(begin.render_area)
            .clear_values(begin.clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(command_buffer, &render_pass_begin, contents);
        }
    }

    fn cmd_next_subpass(&self, command_buffer: vk::CommandBuffer, contents: vk::SubpassContents) {
        unsafe { self.device.cmd_next_subpass(command_buffer, contents) }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) }
    }

    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        unsafe { self.device.cmd_execute_commands(command_buffer, secondaries) }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(command_buffer, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(command_buffer, bind_point, layout, first_set, sets, &[]);
        }
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(command_buffer, layout, stages, offset, data);
        }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, first_binding, buffers, offsets);
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(command_buffer, buffer, offset, index_type);
        }
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device
                .cmd_draw(command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, first: u32, viewports: &[vk::Viewport]) {
        unsafe { self.device.cmd_set_viewport(command_buffer, first, viewports) }
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, first: u32, scissors: &[vk::Rect2D]) {
        unsafe { self.device.cmd_set_scissor(command_buffer, first, scissors) }
    }

    fn cmd_buffer_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &BufferBarrier,
    ) {
        let buffer_barrier = vk::BufferMemoryBarrier::builder()
            .buffer(barrier.buffer)
            .offset(barrier.offset)
            .size(barrier.size)
            .src_access_mask(barrier.src_access)
            .dst_access_mask(barrier.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .build();

        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[buffer_barrier],
                &[],
            );
        }
    }
}
