//! Multi-slot command buffers
//!
//! A [`CommandBuffer`] owns one native command buffer and one fence per slot,
//! typically one slot per frame in flight. Only the current slot is recorded
//! into; [`CommandBuffer::advance`] moves on to the next one.
//!
//! ```text
//! Idle --record--> Recording --stop--> Idle
//!                      |
//!                      +-- render pass open (primary only) until stop
//! ```
//!
//! Recording a slot whose fence is pending first waits for the fence, so a
//! slot is never re-recorded while the GPU may still be executing it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ash::vk;

use super::{CommandBufferLevel, CommandPool, SlotFence, SubpassContents};
use crate::buffer::GpuBuffer;
use crate::context::GfxContext;
use crate::device::{
    BufferBarrier, CommandBufferBegin, Device, DeviceId, Inheritance, PipelineBinding, Queue, RenderPassBegin,
    RenderPassTarget,
};
use crate::error::{GfxError, GfxResult};

/// Size of the push constant block uploaded on every push
pub const PUSH_CONSTANT_LIMIT: usize = 256;

#[derive(Debug)]
struct Slot {
    handle: vk::CommandBuffer,
    fence: SlotFence,
    render_pass_open: bool,
}

#[derive(Debug, Clone, Copy)]
struct BoundPipeline {
    layout: vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
}

/// N-slot command buffer
///
/// Recording, stopping and resetting hold the lock of the queue family, so
/// command buffers sharing a family never touch the driver concurrently.
pub struct CommandBuffer {
    context: Arc<GfxContext>,
    device: Device,
    queue: Queue,
    level: CommandBufferLevel,
    pool: CommandPool,
    family_lock: Arc<Mutex<()>>,
    slots: Vec<Slot>,
    current: usize,
    recording: bool,
    bound: Option<BoundPipeline>,
    contents: SubpassContents,
    fence_timeout: Option<Duration>,
    push_constant_warnings: bool,
}

impl CommandBuffer {
    /// Allocate `count` slots for `queue` from the calling thread's pool
    ///
    /// With `multi_pass`, a primary buffer expects its subpass contents to come
    /// from secondary buffers (see [`CommandBuffer::combine`]).
    pub fn new(
        context: &Arc<GfxContext>,
        queue: &Queue,
        count: usize,
        level: CommandBufferLevel,
        multi_pass: bool,
    ) -> GfxResult<Self> {
        if count == 0 {
            return Err(GfxError::invalid_state("a command buffer needs at least one slot"));
        }
        let slot_count = u32::try_from(count)
            .map_err(|_| GfxError::invalid_state(format!("{count} command buffer slots requested")))?;

        let device = context.device(queue.device())?;
        let pool = context
            .pools()
            .pool_for_current_thread(device.id(), queue.family())?;
        let family_lock = context.pools().family_lock(device.id(), queue.family());
        let contents = if multi_pass && level == CommandBufferLevel::Primary {
            SubpassContents::SecondaryBuffers
        } else {
            SubpassContents::Inline
        };

        let mut buffer = Self {
            context: Arc::clone(context),
            device,
            queue: *queue,
            level,
            pool,
            family_lock,
            slots: Vec::with_capacity(count),
            current: 0,
            recording: false,
            bound: None,
            contents,
            fence_timeout: context.config().fence_timeout(),
            push_constant_warnings: context.config().push_constant_warnings,
        };
        buffer.allocate(slot_count)?;

        log::debug!(
            "Allocated {count} {level:?} command buffers for family {} on device {}",
            queue.family(),
            queue.device()
        );
        Ok(buffer)
    }

    /// Secondary command buffer with the parent's queue and slot count
    pub fn new_secondary(parent: &Self) -> GfxResult<Self> {
        let mut secondary = Self::new(
            &parent.context,
            &parent.queue,
            parent.size(),
            CommandBufferLevel::Secondary,
            false,
        )?;
        secondary.contents = SubpassContents::SecondaryBuffers;
        Ok(secondary)
    }

    fn allocate(&mut self, count: u32) -> GfxResult<()> {
        let _guard = self.family_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let driver = self.device.driver();
        let errors = self.context.errors();

        let handles = errors.check(driver.allocate_command_buffers(self.pool.handle(), self.level.into(), count))?;
        self.slots = handles
            .into_iter()
            .map(|handle| Slot {
                handle,
                fence: SlotFence::new(vk::Fence::null()),
                render_pass_open: false,
            })
            .collect();

        // Fences start signaled so the first record of each slot returns at once
        for slot in &mut self.slots {
            slot.fence = SlotFence::new(errors.check(driver.create_fence(true))?);
        }
        Ok(())
    }

    /// Begin recording the current slot
    ///
    /// A secondary buffer recorded this way inherits no render pass.
    pub fn record(&mut self) -> GfxResult<()> {
        self.begin(None, 0)
    }

    /// Begin recording the current slot inside `target`
    ///
    /// A primary buffer begins the render pass; a secondary buffer continues
    /// the pass its primary has begun.
    pub fn record_render_pass(&mut self, target: &impl RenderPassTarget) -> GfxResult<()> {
        self.begin(Some(target), 0)
    }

    /// Like [`CommandBuffer::record_render_pass`], with a secondary buffer
    /// inheriting `subpass`
    pub fn record_subpass(&mut self, target: &impl RenderPassTarget, subpass: u32) -> GfxResult<()> {
        self.begin(Some(target), subpass)
    }

    fn begin(&mut self, target: Option<&dyn RenderPassTarget>, subpass: u32) -> GfxResult<()> {
        if self.recording {
            return Err(GfxError::invalid_state("command buffer is already recording"));
        }
        if self.slots.is_empty() {
            return Err(GfxError::invalid_state("command buffer has been reset"));
        }

        let lock = Arc::clone(&self.family_lock);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let driver = self.device.driver();
        let errors = self.context.errors();
        let slot = &mut self.slots[self.current];

        if slot.fence.is_pending() {
            slot.fence.wait_and_reset(driver, errors, self.fence_timeout)?;
        }

        let (usage, inheritance) = match (self.level, target) {
            (CommandBufferLevel::Secondary, Some(target)) => (
                vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE,
                Some(Inheritance {
                    render_pass: target.render_pass(),
                    subpass,
                    framebuffer: target.framebuffer(),
                }),
            ),
            // Secondary buffers always carry inheritance info
            (CommandBufferLevel::Secondary, None) => (
                vk::CommandBufferUsageFlags::empty(),
                Some(Inheritance {
                    render_pass: vk::RenderPass::null(),
                    subpass: 0,
                    framebuffer: vk::Framebuffer::null(),
                }),
            ),
            (CommandBufferLevel::Primary, _) => (vk::CommandBufferUsageFlags::empty(), None),
        };
        let begin = CommandBufferBegin { usage, inheritance };
        errors.check(driver.begin_command_buffer(slot.handle, &begin))?;

        if let (CommandBufferLevel::Primary, Some(target)) = (self.level, target) {
            let pass = RenderPassBegin {
                render_pass: target.render_pass(),
                framebuffer: target.framebuffer(),
                render_area: target.render_area(),
                clear_values: target.clear_values(),
            };
            driver.cmd_begin_render_pass(slot.handle, &pass, self.contents.into());
            slot.render_pass_open = true;

            if !target.viewports().is_empty() {
                driver.cmd_set_viewport(slot.handle, 0, target.viewports());
            }
            if !target.scissors().is_empty() {
                driver.cmd_set_scissor(slot.handle, 0, target.scissors());
            }
        }

        self.recording = true;
        self.bound = None;
        Ok(())
    }

    /// Current slot handle, provided recording is in progress
    fn active(&self, operation: &str) -> GfxResult<vk::CommandBuffer> {
        match self.slots.get(self.current) {
            Some(slot) if self.recording => Ok(slot.handle),
            _ => Err(GfxError::invalid_state(format!("{operation} outside of recording"))),
        }
    }

    fn bound_pipeline(&self, operation: &str) -> GfxResult<BoundPipeline> {
        self.bound
            .ok_or_else(|| GfxError::invalid_state(format!("{operation} needs a bound pipeline")))
    }

    /// Move to the next subpass of the open render pass
    pub fn next_subpass(&mut self) -> GfxResult<()> {
        let handle = self.active("next_subpass")?;
        if self.level != CommandBufferLevel::Primary || !self.is_render_pass_open(self.current) {
            return Err(GfxError::invalid_state("next_subpass needs an open render pass"));
        }
        self.device.driver().cmd_next_subpass(handle, self.contents.into());
        Ok(())
    }

    /// Execute the current slot of `secondary` inside the current slot
    pub fn combine(&mut self, secondary: &Self) -> GfxResult<()> {
        let handle = self.active("combine")?;
        if self.level != CommandBufferLevel::Primary || secondary.level != CommandBufferLevel::Secondary {
            return Err(GfxError::invalid_state("combine executes a secondary buffer inside a primary one"));
        }
        if self.contents != SubpassContents::SecondaryBuffers {
            return Err(GfxError::invalid_state("combine needs a multi-pass primary buffer"));
        }
        if secondary.recording || secondary.slots.is_empty() {
            return Err(GfxError::invalid_state("secondary buffer is not ready for execution"));
        }

        self.device
            .driver()
            .cmd_execute_commands(handle, &[secondary.handle()]);
        Ok(())
    }

    /// Bind a pipeline; its layout is used by later descriptor and push
    /// constant calls
    pub fn bind_pipeline(&mut self, pipeline: &impl PipelineBinding) -> GfxResult<()> {
        let handle = self.active("bind_pipeline")?;
        let bind_point = pipeline.bind_point();

        self.device
            .driver()
            .cmd_bind_pipeline(handle, bind_point, pipeline.pipeline());
        self.bound = Some(BoundPipeline {
            layout: pipeline.layout(),
            bind_point,
        });
        Ok(())
    }

    /// Bind a descriptor set at set 0; a null set is ignored
    pub fn bind_descriptor_set(&mut self, set: vk::DescriptorSet) -> GfxResult<()> {
        if set == vk::DescriptorSet::null() {
            return Ok(());
        }
        let handle = self.active("bind_descriptor_set")?;
        let bound = self.bound_pipeline("bind_descriptor_set")?;

        self.device
            .driver()
            .cmd_bind_descriptor_sets(handle, bound.bind_point, bound.layout, 0, &[set]);
        Ok(())
    }

    /// Upload push constant bytes
    ///
    /// `data` is copied into a [`PUSH_CONSTANT_LIMIT`] byte block and the
    /// block is uploaded from `offset` to its end. Payloads of
    /// `PUSH_CONSTANT_LIMIT` bytes or more, and offsets past the block, are
    /// dropped.
    pub fn push_constant_bytes(&mut self, data: &[u8], stages: vk::ShaderStageFlags, offset: u32) -> GfxResult<()> {
        let handle = self.active("push_constant")?;
        let bound = self.bound_pipeline("push_constant")?;

        let start = offset as usize;
        if data.len() >= PUSH_CONSTANT_LIMIT || start >= PUSH_CONSTANT_LIMIT {
            if self.push_constant_warnings {
                log::warn!(
                    "Dropping {} byte push constant at offset {offset}, the limit is {PUSH_CONSTANT_LIMIT} bytes",
                    data.len()
                );
            }
            return Ok(());
        }

        let mut block = [0_u8; PUSH_CONSTANT_LIMIT];
        block[..data.len()].copy_from_slice(data);
        self.device
            .driver()
            .cmd_push_constants(handle, bound.layout, stages, offset, &block[..PUSH_CONSTANT_LIMIT - start]);
        Ok(())
    }

    /// Upload a plain value as push constants
    pub fn push_constant<T: bytemuck::Pod>(&mut self, value: &T, stages: vk::ShaderStageFlags, offset: u32) -> GfxResult<()> {
        self.push_constant_bytes(bytemuck::bytes_of(value), stages, offset)
    }

    fn bind_vertices(&self, vertices: &GpuBuffer, offset: vk::DeviceSize) -> GfxResult<vk::CommandBuffer> {
        let handle = self.active("draw")?;
        if !vertices.is_initialized() {
            return Err(GfxError::invalid_state("vertex buffer is not initialized"));
        }
        self.device
            .driver()
            .cmd_bind_vertex_buffers(handle, 0, &[vertices.handle()], &[offset]);
        Ok(handle)
    }

    fn bind_indices(&self, handle: vk::CommandBuffer, indices: &GpuBuffer) -> GfxResult<()> {
        if !indices.is_initialized() {
            return Err(GfxError::invalid_state("index buffer is not initialized"));
        }
        self.device
            .driver()
            .cmd_bind_index_buffer(handle, indices.handle(), 0, vk::IndexType::UINT32);
        Ok(())
    }

    /// Draw `vertex_count` vertices, binding `vertices` at byte `offset`
    pub fn draw(&mut self, vertices: &GpuBuffer, vertex_count: u32, offset: vk::DeviceSize) -> GfxResult<()> {
        let handle = self.bind_vertices(vertices, offset)?;
        self.device.driver().cmd_draw(handle, vertex_count, 1, 0, 0);
        Ok(())
    }

    /// Draw `index_count` 32-bit indices from `indices` into `vertices`
    pub fn draw_indexed(
        &mut self,
        indices: &GpuBuffer,
        index_count: u32,
        vertices: &GpuBuffer,
        offset: vk::DeviceSize,
    ) -> GfxResult<()> {
        let handle = self.bind_vertices(vertices, offset)?;
        self.bind_indices(handle, indices)?;
        self.device.driver().cmd_draw_indexed(handle, index_count, 1, 0, 0, 0);
        Ok(())
    }

    /// Instanced [`CommandBuffer::draw`]
    ///
    /// `offset` only shifts the vertex buffer binding; the draw itself starts
    /// at vertex 0.
    pub fn draw_instanced(
        &mut self,
        vertices: &GpuBuffer,
        vertex_count: u32,
        instance_count: u32,
        offset: vk::DeviceSize,
        first_instance: u32,
    ) -> GfxResult<()> {
        let handle = self.bind_vertices(vertices, offset)?;
        self.device
            .driver()
            .cmd_draw(handle, vertex_count, instance_count, 0, first_instance);
        Ok(())
    }

    /// Instanced [`CommandBuffer::draw_indexed`]
    ///
    /// `offset` only shifts the vertex buffer binding; the draw itself starts
    /// at index 0.
    pub fn draw_indexed_instanced(
        &mut self,
        indices: &GpuBuffer,
        index_count: u32,
        vertices: &GpuBuffer,
        instance_count: u32,
        offset: vk::DeviceSize,
        first_instance: u32,
    ) -> GfxResult<()> {
        let handle = self.bind_vertices(vertices, offset)?;
        self.bind_indices(handle, indices)?;
        self.device
            .driver()
            .cmd_draw_indexed(handle, index_count, instance_count, 0, 0, first_instance);
        Ok(())
    }

    /// Make prior writes visible to later reads of `read`
    ///
    /// The barrier covers all of `read` and every pipeline stage. `write` is
    /// the producer and only has to be initialized.
    pub fn barrier(&mut self, read: &GpuBuffer, write: &GpuBuffer) -> GfxResult<()> {
        let handle = self.active("barrier")?;
        if !read.is_initialized() || !write.is_initialized() {
            return Err(GfxError::invalid_state("barrier on an uninitialized buffer"));
        }

        let barrier = BufferBarrier {
            buffer: read.handle(),
            src_access: vk::AccessFlags::MEMORY_WRITE,
            dst_access: vk::AccessFlags::MEMORY_READ,
            offset: 0,
            size: vk::WHOLE_SIZE,
        };
        self.device.driver().cmd_buffer_barrier(
            handle,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
            &barrier,
        );
        Ok(())
    }

    /// End recording, closing the render pass if one is open
    pub fn stop(&mut self) -> GfxResult<()> {
        let handle = self.active("stop")?;

        let lock = Arc::clone(&self.family_lock);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let driver = self.device.driver();

        let slot = &mut self.slots[self.current];
        if slot.render_pass_open {
            driver.cmd_end_render_pass(handle);
            slot.render_pass_open = false;
        }
        self.recording = false;
        self.context.errors().check(driver.end_command_buffer(handle))
    }

    /// Fence to signal with the submission of the current slot
    ///
    /// The fence is marked pending, so the next record of this slot waits on
    /// it. Null after [`CommandBuffer::reset`].
    pub fn fence(&mut self) -> vk::Fence {
        self.current_fence_mut().map_or_else(vk::Fence::null, |fence| {
            fence.mark_pending();
            fence.handle()
        })
    }

    /// Fence bookkeeping of the current slot
    pub fn current_fence_mut(&mut self) -> Option<&mut SlotFence> {
        self.slots.get_mut(self.current).map(|slot| &mut slot.fence)
    }

    /// Fence of slot `index`
    pub fn slot_fence(&self, index: usize) -> Option<SlotFence> {
        self.slots.get(index).map(|slot| slot.fence)
    }

    /// Move to the next slot, wrapping around after the last one
    ///
    /// Fails while the current slot is recording.
    pub fn advance(&mut self) -> GfxResult<()> {
        self.check_idle("advance")?;
        if !self.slots.is_empty() {
            self.current = (self.current + 1) % self.slots.len();
        }
        Ok(())
    }

    /// Make slot `index` current; out of range indices are ignored
    ///
    /// Fails while the current slot is recording.
    pub fn set_active(&mut self, index: usize) -> GfxResult<()> {
        self.check_idle("set_active")?;
        if index < self.slots.len() {
            self.current = index;
        }
        Ok(())
    }

    fn check_idle(&self, operation: &str) -> GfxResult<()> {
        if self.recording {
            return Err(GfxError::invalid_state(format!("{operation} while recording")));
        }
        Ok(())
    }

    /// Index of the current slot
    pub const fn current(&self) -> usize {
        self.current
    }

    /// Number of slots
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Primary or secondary
    pub const fn level(&self) -> CommandBufferLevel {
        self.level
    }

    /// Queue the slots were allocated for
    pub const fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Device of the queue
    pub const fn device_id(&self) -> DeviceId {
        self.queue.device()
    }

    /// Pool the slots were allocated from
    pub const fn pool(&self) -> CommandPool {
        self.pool
    }

    /// Handle of the current slot, null after [`CommandBuffer::reset`]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.slots
            .get(self.current)
            .map_or_else(vk::CommandBuffer::null, |slot| slot.handle)
    }

    /// Handles of every slot
    pub fn handles(&self) -> Vec<vk::CommandBuffer> {
        self.slots.iter().map(|slot| slot.handle).collect()
    }

    /// Whether the current slot is between record and stop
    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    /// Whether slot `index` has a render pass open
    pub fn is_render_pass_open(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|slot| slot.render_pass_open)
    }

    /// Whether slots are allocated
    pub fn is_initialized(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Contents mode used when beginning passes and subpasses
    pub const fn subpass_contents(&self) -> SubpassContents {
        self.contents
    }

    /// Free every slot and destroy its fence
    ///
    /// None of the slots may still be executing. Safe to call repeatedly.
    pub fn reset(&mut self) {
        if self.slots.is_empty() {
            return;
        }

        let lock = Arc::clone(&self.family_lock);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let driver = self.device.driver();

        driver.free_command_buffers(self.pool.handle(), &self.handles());
        for slot in self.slots.drain(..) {
            if slot.fence.handle() != vk::Fence::null() {
                driver.destroy_fence(slot.fence.handle());
            }
        }

        self.current = 0;
        self.recording = false;
        self.bound = None;
        log::debug!("Freed {:?} command buffers of family {}", self.level, self.queue.family());
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("queue", &self.queue)
            .field("level", &self.level)
            .field("slots", &self.slots)
            .field("current", &self.current)
            .field("recording", &self.recording)
            .field("contents", &self.contents)
            .finish_non_exhaustive()
    }
}
