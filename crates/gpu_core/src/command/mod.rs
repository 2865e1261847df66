//! Command recording
//!
//! - [`CommandPoolRegistry`]: lazily created pools, one per thread and queue family
//! - [`CommandBuffer`]: N-slot recording state machine gated by per-slot fences
//! - [`SlotFence`]: fence plus the host-side "submitted, not yet waited" flag

mod buffer;
mod fence;
mod pool;

use ash::vk;

pub use buffer::{CommandBuffer, PUSH_CONSTANT_LIMIT};
pub use fence::SlotFence;
pub use pool::{CommandPool, CommandPoolRegistry};

/// Command buffer level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferLevel {
    /// Submitted directly to a queue
    Primary,
    /// Executed from within a primary command buffer
    Secondary,
}

impl From<CommandBufferLevel> for vk::CommandBufferLevel {
    fn from(level: CommandBufferLevel) -> Self {
        match level {
            CommandBufferLevel::Primary => Self::PRIMARY,
            CommandBufferLevel::Secondary => Self::SECONDARY,
        }
    }
}

/// Where the commands of a subpass come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubpassContents {
    /// Recorded directly into the primary buffer
    Inline,
    /// Executed from secondary buffers
    SecondaryBuffers,
}

impl From<SubpassContents> for vk::SubpassContents {
    fn from(contents: SubpassContents) -> Self {
        match contents {
            SubpassContents::Inline => Self::INLINE,
            SubpassContents::SecondaryBuffers => Self::SECONDARY_COMMAND_BUFFERS,
        }
    }
}
