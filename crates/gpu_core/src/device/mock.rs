//! Recording driver used by the unit tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use ash::{
    prelude::VkResult,
    vk::{self, Handle},
};

use super::{BufferBarrier, CommandBufferBegin, DeviceDriver, DeviceId, Inheritance, RenderPassBegin};
use crate::config::GfxConfig;
use crate::context::GfxContext;
use crate::error::{ErrorDomain, RecordingHandler};

/// Command recorded into a mock command buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Begin {
        usage: vk::CommandBufferUsageFlags,
        inheritance: Option<Inheritance>,
    },
    End,
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        clear_values: usize,
        contents: vk::SubpassContents,
    },
    NextSubpass(vk::SubpassContents),
    EndRenderPass,
    ExecuteCommands(Vec<vk::CommandBuffer>),
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        size: usize,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<vk::DeviceSize>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    SetViewport(usize),
    SetScissor(usize),
    Barrier {
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: BufferBarrier,
    },
}

/// Driver entry point that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    CreateCommandPool,
    AllocateCommandBuffers,
    CreateFence,
    WaitForFence,
    ResetFence,
    CreateBuffer,
    BindBufferMemory,
    AllocateMemory,
    BeginCommandBuffer,
    EndCommandBuffer,
}

#[derive(Debug, Default)]
struct MockFence {
    signaled: bool,
    waits: usize,
    resets: usize,
}

#[derive(Debug)]
struct MockMemory {
    bytes: Vec<u8>,
    memory_type: u32,
    device_address: bool,
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u64,
    pools_created: usize,
    pools: HashMap<u64, (u32, vk::CommandPoolCreateFlags)>,
    command_buffers: HashMap<u64, u64>,
    begun: HashSet<u64>,
    busy_families: HashMap<u32, usize>,
    family_overlaps: usize,
    fences: HashMap<u64, MockFence>,
    buffers: HashMap<u64, (vk::DeviceSize, vk::BufferUsageFlags)>,
    memory: HashMap<u64, MockMemory>,
    allocated_bytes: vk::DeviceSize,
    commands: Vec<(vk::CommandBuffer, Command)>,
    failures: HashMap<Op, vk::Result>,
}

impl MockState {
    fn next<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        H::from_raw(self.next_handle)
    }

    fn check(&self, op: Op) -> VkResult<()> {
        self.failures.get(&op).map_or(Ok(()), |result| Err(*result))
    }

    fn pool_of(&self, command_buffer: vk::CommandBuffer) -> Option<(u32, vk::CommandPoolCreateFlags)> {
        self.command_buffers
            .get(&command_buffer.as_raw())
            .and_then(|pool| self.pools.get(pool))
            .copied()
    }
}

/// In-memory [`DeviceDriver`] that records every call
pub(crate) struct MockDevice {
    memory_types: Vec<vk::MemoryPropertyFlags>,
    memory_type_bits: Option<u32>,
    extensions: Vec<String>,
    alignment: vk::DeviceSize,
    heap_budget: Option<vk::DeviceSize>,
    stalled_fences: bool,
    begin_end_delay: Option<Duration>,
    state: Mutex<MockState>,
}

impl MockDevice {
    /// Device-local type 0, host-visible coherent type 1, no extensions
    pub(crate) fn new() -> Self {
        Self {
            memory_types: vec![
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ],
            memory_type_bits: None,
            extensions: Vec::new(),
            alignment: 1,
            heap_budget: None,
            stalled_fences: false,
            begin_end_delay: None,
            state: Mutex::new(MockState::default()),
        }
    }

    pub(crate) fn with_memory_types(mut self, types: &[vk::MemoryPropertyFlags]) -> Self {
        self.memory_types = types.to_vec();
        self
    }

    /// Restrict the memory type filter reported for every buffer
    pub(crate) const fn with_memory_type_bits(mut self, bits: u32) -> Self {
        self.memory_type_bits = Some(bits);
        self
    }

    pub(crate) fn with_extensions(mut self, names: &[&str]) -> Self {
        self.extensions = names.iter().map(|name| (*name).to_owned()).collect();
        self
    }

    /// Round buffer requirements up to `alignment`
    pub(crate) const fn with_alignment(mut self, alignment: vk::DeviceSize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Fail allocations once `budget` live bytes would be exceeded
    pub(crate) const fn with_heap_budget(mut self, budget: vk::DeviceSize) -> Self {
        self.heap_budget = Some(budget);
        self
    }

    /// Bounded fence waits time out
    pub(crate) const fn with_stalled_fences(mut self) -> Self {
        self.stalled_fences = true;
        self
    }

    /// Hold every begin and end call open for `delay`, so overlapping calls
    /// on one queue family become observable
    pub(crate) const fn with_begin_end_delay(mut self, delay: Duration) -> Self {
        self.begin_end_delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, command_buffer: vk::CommandBuffer, command: Command) {
        self.state().commands.push((command_buffer, command));
    }

    pub(crate) fn fail(&self, op: Op, result: vk::Result) {
        self.state().failures.insert(op, result);
    }

    pub(crate) fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub(crate) fn pools_created(&self) -> usize {
        self.state().pools_created
    }

    pub(crate) fn pool_flags(&self, pool: vk::CommandPool) -> Option<vk::CommandPoolCreateFlags> {
        self.state().pools.get(&pool.as_raw()).map(|(_, flags)| *flags)
    }

    /// Begin or end calls that started while another one on the same queue
    /// family was still in progress
    pub(crate) fn family_overlaps(&self) -> usize {
        self.state().family_overlaps
    }

    fn enter_family(&self, command_buffer: vk::CommandBuffer) -> Option<u32> {
        let mut state = self.state();
        let (family, _) = state.pool_of(command_buffer)?;
        let busy = state.busy_families.entry(family).or_default();
        *busy += 1;
        if *busy > 1 {
            state.family_overlaps += 1;
        }
        drop(state);
        if let Some(delay) = self.begin_end_delay {
            thread::sleep(delay);
        }
        Some(family)
    }

    fn record_begin(&self, command_buffer: vk::CommandBuffer, begin: &CommandBufferBegin) -> VkResult<()> {
        let mut state = self.state();
        state.check(Op::BeginCommandBuffer)?;
        // Re-beginning needs a pool created with RESET_COMMAND_BUFFER
        let resettable = state
            .pool_of(command_buffer)
            .map_or(true, |(_, flags)| flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER));
        if !state.begun.insert(command_buffer.as_raw()) && !resettable {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        state.commands.push((
            command_buffer,
            Command::Begin {
                usage: begin.usage,
                inheritance: begin.inheritance,
            },
        ));
        Ok(())
    }

    fn leave_family(&self, family: Option<u32>) {
        if let Some(family) = family {
            if let Some(busy) = self.state().busy_families.get_mut(&family) {
                *busy -= 1;
            }
        }
    }

    pub(crate) fn live_pools(&self) -> usize {
        self.state().pools.len()
    }

    pub(crate) fn live_command_buffers(&self) -> usize {
        self.state().command_buffers.len()
    }

    pub(crate) fn live_fences(&self) -> usize {
        self.state().fences.len()
    }

    pub(crate) fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    pub(crate) fn live_memory(&self) -> usize {
        self.state().memory.len()
    }

    pub(crate) fn allocated_bytes(&self) -> vk::DeviceSize {
        self.state().allocated_bytes
    }

    pub(crate) fn fence_waits(&self, fence: vk::Fence) -> usize {
        self.state().fences.get(&fence.as_raw()).map_or(0, |f| f.waits)
    }

    pub(crate) fn fence_resets(&self, fence: vk::Fence) -> usize {
        self.state().fences.get(&fence.as_raw()).map_or(0, |f| f.resets)
    }

    pub(crate) fn buffer_usage(&self, buffer: vk::Buffer) -> Option<vk::BufferUsageFlags> {
        self.state().buffers.get(&buffer.as_raw()).map(|(_, usage)| *usage)
    }

    /// Memory type and device-address flag of a live allocation
    pub(crate) fn allocation(&self, memory: vk::DeviceMemory) -> Option<(u32, bool)> {
        self.state()
            .memory
            .get(&memory.as_raw())
            .map(|m| (m.memory_type, m.device_address))
    }

    pub(crate) fn commands(&self, command_buffer: vk::CommandBuffer) -> Vec<Command> {
        self.state()
            .commands
            .iter()
            .filter(|(cb, _)| *cb == command_buffer)
            .map(|(_, command)| command.clone())
            .collect()
    }
}

impl DeviceDriver for MockDevice {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: self.memory_types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (slot, flags) in properties.memory_types.iter_mut().zip(&self.memory_types) {
            *slot = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        properties.memory_heaps[0] = vk::MemoryHeap {
            size: self.heap_budget.unwrap_or(u64::MAX),
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        properties
    }

    fn supports_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }

    fn wait_idle(&self) -> VkResult<()> {
        Ok(())
    }

    fn create_command_pool(&self, queue_family: u32, flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool> {
        let mut state = self.state();
        state.check(Op::CreateCommandPool)?;
        let pool: vk::CommandPool = state.next();
        state.pools.insert(pool.as_raw(), (queue_family, flags));
        state.pools_created += 1;
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state();
        state.pools.remove(&pool.as_raw());
        state.command_buffers.retain(|_, owner| *owner != pool.as_raw());
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        _level: vk::CommandBufferLevel,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        state.check(Op::AllocateCommandBuffers)?;
        let buffers: Vec<vk::CommandBuffer> = (0..count).map(|_| state.next()).collect();
        for buffer in &buffers {
            state.command_buffers.insert(buffer.as_raw(), pool.as_raw());
        }
        Ok(buffers)
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state();
        for buffer in buffers {
            state.command_buffers.remove(&buffer.as_raw());
            state.begun.remove(&buffer.as_raw());
        }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state();
        state.check(Op::CreateFence)?;
        let fence: vk::Fence = state.next();
        state.fences.insert(
            fence.as_raw(),
            MockFence {
                signaled,
                ..MockFence::default()
            },
        );
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state().fences.remove(&fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        let mut state = self.state();
        state.check(Op::WaitForFence)?;
        let stalled = self.stalled_fences && timeout != u64::MAX;
        let fence = state
            .fences
            .get_mut(&fence.as_raw())
            .ok_or(vk::Result::ERROR_DEVICE_LOST)?;
        fence.waits += 1;
        if stalled {
            return Err(vk::Result::TIMEOUT);
        }
        fence.signaled = true;
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state();
        state.check(Op::ResetFence)?;
        let fence = state
            .fences
            .get_mut(&fence.as_raw())
            .ok_or(vk::Result::ERROR_DEVICE_LOST)?;
        fence.signaled = false;
        fence.resets += 1;
        Ok(())
    }

    fn create_buffer(&self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer> {
        let mut state = self.state();
        state.check(Op::CreateBuffer)?;
        let buffer: vk::Buffer = state.next();
        state.buffers.insert(buffer.as_raw(), (size, usage));
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.state().buffers.remove(&buffer.as_raw());
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.state().buffers.get(&buffer.as_raw()).map_or(0, |(size, _)| *size);
        let all_types = (1_u32 << self.memory_types.len()) - 1;
        vk::MemoryRequirements {
            size: size.div_ceil(self.alignment) * self.alignment,
            alignment: self.alignment,
            memory_type_bits: self.memory_type_bits.unwrap_or(all_types),
        }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, _offset: vk::DeviceSize) -> VkResult<()> {
        let state = self.state();
        state.check(Op::BindBufferMemory)?;
        if state.buffers.contains_key(&buffer.as_raw()) && state.memory.contains_key(&memory.as_raw()) {
            Ok(())
        } else {
            Err(vk::Result::ERROR_VALIDATION_FAILED_EXT)
        }
    }

    fn buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress {
        buffer.as_raw() << 32
    }

    fn allocate_memory(&self, size: vk::DeviceSize, memory_type: u32, device_address: bool) -> VkResult<vk::DeviceMemory> {
        let mut state = self.state();
        state.check(Op::AllocateMemory)?;
        if self
            .heap_budget
            .is_some_and(|budget| state.allocated_bytes + size > budget)
        {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let memory: vk::DeviceMemory = state.next();
        state.memory.insert(
            memory.as_raw(),
            MockMemory {
                bytes: vec![0; usize::try_from(size).map_err(|_| vk::Result::ERROR_OUT_OF_HOST_MEMORY)?],
                memory_type,
                device_address,
            },
        );
        state.allocated_bytes += size;
        Ok(memory)
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state();
        if let Some(freed) = state.memory.remove(&memory.as_raw()) {
            state.allocated_bytes -= freed.bytes.len() as vk::DeviceSize;
        }
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> VkResult<()> {
        let mut state = self.state();
        let memory = state
            .memory
            .get_mut(&memory.as_raw())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        let start = offset as usize;
        let target = memory
            .bytes
            .get_mut(start..start + data.len())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        target.copy_from_slice(data);
        Ok(())
    }

    fn read_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, out: &mut [u8]) -> VkResult<()> {
        let state = self.state();
        let memory = state
            .memory
            .get(&memory.as_raw())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        let start = offset as usize;
        let source = memory
            .bytes
            .get(start..start + out.len())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        out.copy_from_slice(source);
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, begin: &CommandBufferBegin) -> VkResult<()> {
        let family = self.enter_family(command_buffer);
        let result = self.record_begin(command_buffer, begin);
        self.leave_family(family);
        result
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let family = self.enter_family(command_buffer);
        let result = self.state().check(Op::EndCommandBuffer);
        if result.is_ok() {
            self.push(command_buffer, Command::End);
        }
        self.leave_family(family);
        result
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin<'_>, contents: vk::SubpassContents) {
        self.push(
            command_buffer,
            Command::BeginRenderPass {
                render_pass: begin.render_pass,
                framebuffer: begin.framebuffer,
                clear_values: begin.clear_values.len(),
                contents,
            },
        );
    }

    fn cmd_next_subpass(&self, command_buffer: vk::CommandBuffer, contents: vk::SubpassContents) {
        self.push(command_buffer, Command::NextSubpass(contents));
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.push(command_buffer, Command::EndRenderPass);
    }

    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        self.push(command_buffer, Command::ExecuteCommands(secondaries.to_vec()));
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.push(command_buffer, Command::BindPipeline { bind_point, pipeline });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.push(
            command_buffer,
            Command::BindDescriptorSets {
                bind_point,
                layout,
                first_set,
                sets: sets.to_vec(),
            },
        );
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.push(
            command_buffer,
            Command::PushConstants {
                layout,
                stages,
                offset,
                size: data.len(),
            },
        );
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        self.push(
            command_buffer,
            Command::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
                offsets: offsets.to_vec(),
            },
        );
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        self.push(
            command_buffer,
            Command::BindIndexBuffer {
                buffer,
                offset,
                index_type,
            },
        );
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.push(
            command_buffer,
            Command::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            },
        );
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
        self.push(
            command_buffer,
            Command::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            },
        );
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, _first: u32, viewports: &[vk::Viewport]) {
        self.push(command_buffer, Command::SetViewport(viewports.len()));
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, _first: u32, scissors: &[vk::Rect2D]) {
        self.push(command_buffer, Command::SetScissor(scissors.len()));
    }

    fn cmd_buffer_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &BufferBarrier,
    ) {
        self.push(
            command_buffer,
            Command::Barrier {
                src_stage,
                dst_stage,
                barrier: *barrier,
            },
        );
    }
}

/// Everything a test needs to drive one mock device
pub(crate) struct TestRig {
    pub(crate) context: Arc<GfxContext>,
    pub(crate) mock: Arc<MockDevice>,
    pub(crate) errors: Arc<RecordingHandler>,
    pub(crate) device: DeviceId,
}

impl TestRig {
    pub(crate) fn new(mock: MockDevice) -> Self {
        Self::with_config(mock, GfxConfig::default())
    }

    /// Rig whose error domain only records, so fatal kinds never exit
    pub(crate) fn with_config(mock: MockDevice, config: GfxConfig) -> Self {
        crate::foundation::logging::try_init();
        let errors = Arc::new(RecordingHandler::default());
        let context = GfxContext::new(config, ErrorDomain::with_handler(errors.clone()));
        let mock = Arc::new(mock);
        let device = context.add_device(mock.clone());
        Self {
            context,
            mock,
            errors,
            device,
        }
    }
}

mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn test_unlocked_begins_on_one_family_overlap() {
        let mock = Arc::new(MockDevice::new().with_begin_end_delay(Duration::from_millis(100)));
        let pool = mock.create_command_pool(0, vk::CommandPoolCreateFlags::empty()).unwrap();
        let buffers = mock
            .allocate_command_buffers(pool, vk::CommandBufferLevel::PRIMARY, 2)
            .unwrap();
        let start = Arc::new(Barrier::new(2));

        let workers: Vec<_> = buffers
            .into_iter()
            .map(|buffer| {
                let mock = Arc::clone(&mock);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    mock.begin_command_buffer(buffer, &CommandBufferBegin::default()).unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(mock.family_overlaps(), 1);
    }

    #[test]
    fn test_rebegin_needs_resettable_pool() {
        let mock = MockDevice::new();
        let pool = mock.create_command_pool(0, vk::CommandPoolCreateFlags::TRANSIENT).unwrap();
        let buffer = mock
            .allocate_command_buffers(pool, vk::CommandBufferLevel::PRIMARY, 1)
            .unwrap()[0];

        mock.begin_command_buffer(buffer, &CommandBufferBegin::default()).unwrap();
        mock.end_command_buffer(buffer).unwrap();

        assert_eq!(
            mock.begin_command_buffer(buffer, &CommandBufferBegin::default()),
            Err(vk::Result::ERROR_VALIDATION_FAILED_EXT)
        );
    }
}
