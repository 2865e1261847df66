//! # GPU Core
//!
//! Command recording and GPU resource synchronization layer over Vulkan.
//!
//! The crate wraps the explicit parts of the driver API that every renderer
//! ends up re-implementing:
//!
//! - **Error domain**: driver results are classified into [`ErrorKind`]s with
//!   a [`Severity`] and dispatched to a replaceable handler chain
//! - **Device memory**: fresh allocations matched to a resource's memory
//!   requirements, with host-visible and device-local variants
//! - **GPU buffers**: buffer objects bound to owned or externally supplied
//!   memory regions
//! - **Command pools**: one pool per producing thread and queue family, created
//!   lazily and serialised per family
//! - **Command buffers**: N-slot (one per in-flight frame) recording state
//!   machine with fence-gated slot reuse
//!
//! Instance/device creation, pipelines and render passes live outside this
//! crate and are consumed through [`device::PipelineBinding`] and
//! [`device::RenderPassTarget`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gpu_core::prelude::*;
//! # fn driver() -> std::sync::Arc<dyn DeviceDriver> { unimplemented!() }
//! # fn queue_handle() -> ash::vk::Queue { unimplemented!() }
//!
//! fn main() -> GfxResult<()> {
//!     let context = GfxContext::new(GfxConfig::default(), ErrorDomain::default());
//!     let device = context.add_device(driver());
//!     let queue = Queue::new(device, 0, queue_handle());
//!
//!     let mut commands = CommandBuffer::new(&context, &queue, 2, CommandBufferLevel::Primary, false)?;
//!     commands.record()?;
//!     commands.stop()?;
//!     let _fence = commands.fence();
//!     commands.advance()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod buffer;
pub mod command;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod foundation;
pub mod memory;

pub use buffer::{BufferUsage, GpuBuffer};
pub use command::{CommandBuffer, CommandBufferLevel, CommandPool, CommandPoolRegistry, SlotFence};
pub use config::{Config, ConfigError, GfxConfig};
pub use context::GfxContext;
pub use device::{Device, DeviceDriver, DeviceId, Queue};
pub use error::{ErrorDomain, ErrorHandler, ErrorKind, GfxError, GfxResult, Severity};
pub use memory::{AllocationStats, MemoryAllocator, MemoryFlags, MemoryRegion};

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        buffer::{BufferUsage, GpuBuffer},
        command::{CommandBuffer, CommandBufferLevel, SubpassContents},
        config::{Config, GfxConfig},
        context::GfxContext,
        device::{
            Device, DeviceDriver, DeviceId, PipelineBinding, PipelineHandles, Queue,
            RenderPassInfo, RenderPassTarget,
        },
        error::{ErrorDomain, ErrorHandler, ErrorKind, GfxError, GfxResult, Severity},
        memory::{MemoryAllocator, MemoryRegion},
    };
}
